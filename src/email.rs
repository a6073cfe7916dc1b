use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, warn};
use url::Url;

pub const EMAIL_API_VERSION: &str = "2023-03-31";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("date formatting failed: {0}")]
    Date(#[from] time::error::Format),
    #[error("email service rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A single outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub html: String,
    pub plain_text: String,
}

/// A transactional email backend.
///
/// `begin_send` only submits the message; delivery continues on the service side. The returned
/// string is the service's operation id.
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn begin_send(&self, message: &EmailMessage) -> Result<String, EmailError>;
}

/// Parsed `endpoint=...;accesskey=...` connection string.
#[derive(Clone)]
pub struct ConnectionString {
    pub endpoint: Url,
    access_key: Vec<u8>,
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &"<redacted>")
            .finish()
    }
}

impl FromStr for ConnectionString {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut access_key = None;

        for part in s.split(';') {
            let Some((k, v)) = part.split_once('=') else {
                continue;
            };
            match k.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(v.trim()),
                "accesskey" => access_key = Some(v.trim()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| EmailError::InvalidConnectionString("missing endpoint".to_string()))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| EmailError::InvalidConnectionString(format!("endpoint: {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(EmailError::InvalidConnectionString(
                "endpoint has no host".to_string(),
            ));
        }

        // The key is base64 and may itself end in '=' padding, so it is taken verbatim.
        let access_key = access_key
            .ok_or_else(|| EmailError::InvalidConnectionString("missing accesskey".to_string()))?;
        let access_key = B64
            .decode(access_key)
            .map_err(|e| EmailError::InvalidConnectionString(format!("accesskey: {e}")))?;

        Ok(Self {
            endpoint,
            access_key,
        })
    }
}

/// Headers that authenticate one request with the shared access key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

pub fn content_hash(body: &[u8]) -> String {
    B64.encode(Sha256::digest(body))
}

/// HMAC-SHA256 request signature over `METHOD\npath?query\ndate;host;content-hash`.
pub fn sign_request(
    access_key: &[u8],
    method: &str,
    path_and_query: &str,
    host: &str,
    date: &str,
    body: &[u8],
) -> Result<SignedHeaders, EmailError> {
    let content_hash = content_hash(body);
    let string_to_sign = format!("{method}\n{path_and_query}\n{date};{host};{content_hash}");

    let mut mac = HmacSha256::new_from_slice(access_key)
        .map_err(|e| EmailError::InvalidConnectionString(format!("accesskey: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = B64.encode(mac.finalize().into_bytes());

    Ok(SignedHeaders {
        date: date.to_string(),
        authorization: format!(
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
        ),
        content_hash,
    })
}

/// RFC 1123 date in GMT, the format the service expects in `x-ms-date`.
pub fn http_date(at: OffsetDateTime) -> Result<String, EmailError> {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    Ok(at.to_offset(time::UtcOffset::UTC).format(&fmt)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender_address: &'a str,
    recipients: Recipients<'a>,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Recipients<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Content<'a> {
    subject: &'a str,
    html: &'a str,
    plain_text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl<'a> From<&'a EmailMessage> for SendRequest<'a> {
    fn from(m: &'a EmailMessage) -> Self {
        Self {
            sender_address: &m.sender,
            recipients: Recipients {
                to: [Address {
                    address: &m.recipient,
                }],
            },
            content: Content {
                subject: &m.subject,
                html: &m.html,
                plain_text: &m.plain_text,
            },
        }
    }
}

/// Azure Communication Services email client.
pub struct AcsEmailClient {
    client: reqwest::Client,
    url: Url,
    host: String,
    access_key: Vec<u8>,
}

impl AcsEmailClient {
    pub fn new(connection: ConnectionString) -> Result<Self, EmailError> {
        let mut url = connection.endpoint.clone();
        url.set_path("/emails:send");
        url.set_query(Some(&format!("api-version={EMAIL_API_VERSION}")));

        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(EmailError::InvalidConnectionString(
                    "endpoint has no host".to_string(),
                ))
            }
        };

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url,
            host,
            access_key: connection.access_key,
        })
    }

    fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }
}

#[async_trait]
impl EmailService for AcsEmailClient {
    async fn begin_send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        let body = serde_json::to_vec(&SendRequest::from(message))?;
        let signed = sign_request(
            &self.access_key,
            "POST",
            &self.path_and_query(),
            &self.host,
            &http_date(OffsetDateTime::now_utc())?,
            &body,
        )?;

        debug!(url = %self.url, "submitting email");
        let resp = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json")
            .header("x-ms-date", &signed.date)
            .header("x-ms-content-sha256", &signed.content_hash)
            .header("authorization", &signed.authorization)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let operation_location = resp
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "could not read email service response body");
                String::new()
            }
        };

        if !status.is_success() {
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let id = serde_json::from_str::<SendResponse>(&text)
            .ok()
            .and_then(|r| r.id)
            .or_else(|| operation_location.as_deref().and_then(operation_id_from_location))
            .unwrap_or_else(|| "unknown".to_string());
        Ok(id)
    }
}

/// Last path segment of an `Operation-Location` URL.
fn operation_id_from_location(location: &str) -> Option<String> {
    let path = location.split('?').next()?;
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
