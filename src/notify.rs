use crate::analysis::AnalysisResult;
use crate::email::{EmailMessage, EmailService};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Severity at or above which a blocked message is reported to the guardian.
pub const NOTIFY_SEVERITY: u8 = 3;

/// Where in the extension the message was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestContext {
    Main,
    Sidebar,
    Other,
}

impl RequestContext {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("main") => Self::Main,
            Some("sidebar") => Self::Sidebar,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDecision<'a> {
    Send { recipient: &'a str },
    /// Severe enough, but sidebar checks never email.
    SuppressedSidebar,
    Skip,
}

/// Decide whether a classified message warrants an email.
///
/// Only blocked messages with severity >= 3 qualify, and then only from the main view with a
/// guardian address on the request.
pub fn decide<'a>(
    analysis: &AnalysisResult,
    parent_email: Option<&'a str>,
    context: RequestContext,
) -> NotificationDecision<'a> {
    if !(analysis.should_block() && analysis.severity_at_least(NOTIFY_SEVERITY)) {
        return NotificationDecision::Skip;
    }

    match (context, parent_email) {
        (RequestContext::Main, Some(recipient)) => NotificationDecision::Send { recipient },
        (RequestContext::Sidebar, _) => NotificationDecision::SuppressedSidebar,
        _ => NotificationDecision::Skip,
    }
}

fn or_unspecified(v: Option<&str>) -> &str {
    v.unwrap_or("unspecified")
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn subject(analysis: &AnalysisResult) -> String {
    let severity = analysis
        .severity()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unspecified".to_string());
    format!(
        "🚨 BantAI Buddy Alert! Message Detected (Severity: {}, Category: {})",
        severity,
        or_unspecified(analysis.category())
    )
}

pub fn html_body(analysis: &AnalysisResult, message_text: &str) -> String {
    let severity = analysis
        .severity()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unspecified".to_string());
    let category = escape_html(or_unspecified(analysis.category()));
    let reason = escape_html(or_unspecified(analysis.reason()));
    let message = escape_html(message_text);

    format!(
        r##"<html>
<body style="font-family: sans-serif; line-height: 1.6;">
<div style="max-width: 600px; margin: 20px auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px;">
<h2 style="color: #d9534f;">🚨 BantAI Buddy Alert! 🚨</h2>
<p>Dear Parent/Guardian,</p>
<p>This is an urgent notification from <b>BantAI Buddy</b>. A message with a <b>threat level of {severity} and a category of {category}</b> has been detected.</p>
<h3 style="color: #333;">Message Details:</h3>
<p><strong>Reason for detection:</strong> <i>"{reason}"</i></p>
<p style="background-color: #f8d7da; border: 1px solid #f5c6cb; padding: 10px; border-radius: 4px; color: #721c24;"><strong>Original Message:</strong> "{message}"</p>
<p><b>This may not have been the first time your child has engaged with harmful texts.</b> Please consider having a conversation with your child about safe online communication. You can also review more details within the <b>BantAI Buddy</b> extension.</p>
<p>We are constantly working to make BantAI Buddy as accurate as possible, and your feedback is a vital part of that process. If you believe this message was blocked by mistake, or if you have any suggestions for improvement, please reply directly to this email. We appreciate positive stories too! Knowing what we're doing right helps us just as much.</p>
<p>Thank you for using <b>BantAI Buddy</b> to keep your children safe online.</p>
<p style="font-size: 0.9em; color: #888;">The BantAI Buddy Team</p>
</div>
</body>
</html>
"##
    )
}

/// Build the guardian notification for a severe message.
pub fn build_message(
    sender: &str,
    recipient: &str,
    analysis: &AnalysisResult,
    message_text: &str,
) -> EmailMessage {
    let html = html_body(analysis, message_text);
    let plain_text = html2text::from_read(html.as_bytes(), 80);

    EmailMessage {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        subject: subject(analysis),
        html,
        plain_text,
    }
}

/// Submit `message` on a detached task.
///
/// The outcome is only logged; nothing the email service does can reach the HTTP response.
pub fn dispatch(email: Arc<dyn EmailService>, message: EmailMessage) -> JoinHandle<()> {
    tokio::spawn(async move {
        match email.begin_send(&message).await {
            Ok(operation_id) => info!(
                recipient = %message.recipient,
                operation_id = %operation_id,
                "email send initiated"
            ),
            Err(e) => error!(recipient = %message.recipient, error = %e, "email send failed"),
        }
    })
}
