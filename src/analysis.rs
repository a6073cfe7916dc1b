use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Reason reported when the completion service's own safety filter refused the input.
pub const CONTENT_FILTER_REASON: &str =
    "This message was blocked by BantAI Buddy's content safety filter.";

/// Body of `POST /api/analyze`.
///
/// Every field is optional at the wire level and a value of the wrong JSON type reads as absent,
/// so only `messageText` can fail a request (checked by the handler).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default, deserialize_with = "string_or_none")]
    pub message_text: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub parent_email: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub context: Option<String>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

impl AnalysisRequest {
    /// The message to classify, if present and non-empty.
    pub fn message_text(&self) -> Option<&str> {
        self.message_text.as_deref().filter(|t| !t.is_empty())
    }

    /// The guardian address, if present and non-empty. Its format is not checked.
    pub fn parent_email(&self) -> Option<&str> {
        self.parent_email.as_deref().filter(|e| !e.is_empty())
    }
}

/// Severity reported by the model.
///
/// The scale has no declared bounds. Values are kept exactly as the model sent them (integer or
/// float) and only ever compared against thresholds. Numeric strings such as `"3"` are accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Severity(Number);

impl Severity {
    pub fn new(level: u8) -> Self {
        Self(Number::from(level))
    }

    pub fn at_least(&self, threshold: u8) -> bool {
        self.0
            .as_f64()
            .map(|v| v >= f64::from(threshold))
            .unwrap_or(false)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(Number),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Self(Number::from(i)));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Self)
                    .ok_or_else(|| serde::de::Error::custom(format!("non-numeric severity: {s:?}")))
            }
        }
    }
}

/// Deserialize a field that was present in the input, keeping an explicit `null` as `Some(None)`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Classification returned by the model.
///
/// The model output is untrusted. Each known field is `None` when the model omitted it and
/// `Some(None)` when it sent `null`, so both shapes are echoed back as received. Unknown fields
/// are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub action: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Option<Severity>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub reason: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub child_risk: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Synthetic verdict used when the completion service's content filter tripped.
    pub fn content_filtered() -> Self {
        Self {
            action: Some(Some("BLOCK".to_string())),
            severity: Some(Some(Severity::new(5))),
            category: Some(Some("CONTENT_FILTER".to_string())),
            reason: Some(Some(CONTENT_FILTER_REASON.to_string())),
            child_risk: Some(Some("CRITICAL".to_string())),
            extra: Map::new(),
        }
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_ref()?.as_deref()
    }

    pub fn severity(&self) -> Option<&Severity> {
        self.severity.as_ref()?.as_ref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_ref()?.as_deref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_ref()?.as_deref()
    }

    pub fn child_risk(&self) -> Option<&str> {
        self.child_risk.as_ref()?.as_deref()
    }

    pub fn severity_at_least(&self, threshold: u8) -> bool {
        self.severity()
            .map(|s| s.at_least(threshold))
            .unwrap_or(false)
    }

    /// `action == "BLOCK"` or `severity >= 2`.
    pub fn should_block(&self) -> bool {
        self.action() == Some("BLOCK") || self.severity_at_least(2)
    }
}

/// Body of a successful `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub should_block: bool,
    pub analysis: AnalysisResult,
}

impl From<AnalysisResult> for AnalyzeResponse {
    fn from(analysis: AnalysisResult) -> Self {
        Self {
            should_block: analysis.should_block(),
            analysis,
        }
    }
}

/// Remove a markdown code fence around model output.
///
/// Handles a leading "```" optionally followed by a `json` tag (any case) and a trailing "```".
/// Either marker may appear alone. Surrounding whitespace is trimmed.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut s = raw.trim();

    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }

    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }

    s.trim()
}

/// Parse raw model output into an [`AnalysisResult`].
pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(action: &str, severity: Value) -> AnalysisResult {
        serde_json::from_value(json!({ "action": action, "severity": severity }))
            .expect("valid analysis")
    }

    #[test]
    fn strips_tagged_fence_any_case() {
        for raw in [
            "```JSON\n{\"a\":1}\n```",
            "```json {\"a\":1}```",
            "```Json\r\n{\"a\":1}\r\n```\n",
        ] {
            assert_eq!(strip_code_fence(raw), "{\"a\":1}", "input: {raw:?}");
        }
    }

    #[test]
    fn strips_untagged_and_partial_fences() {
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn parses_fenced_model_output() {
        let raw = "```JSON\n{\"action\":\"BLOCK\",\"severity\":3,\"category\":\"BULLYING\",\"reason\":\"insult\",\"child_risk\":\"HIGH\"}\n```";
        let a = parse_analysis(raw).expect("parse");
        assert_eq!(a.action(), Some("BLOCK"));
        assert_eq!(a.category(), Some("BULLYING"));
        assert_eq!(a.child_risk(), Some("HIGH"));
        assert!(a.severity_at_least(3));
        assert!(!a.severity_at_least(4));
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(parse_analysis("I think this message is fine.").is_err());
        assert!(parse_analysis("").is_err());
        assert!(parse_analysis("[1, 2, 3]").is_err());
    }

    #[test]
    fn should_block_rule() {
        assert!(result("BLOCK", json!(0)).should_block());
        assert!(result("ALLOW", json!(2)).should_block());
        assert!(result("ALLOW", json!(2.5)).should_block());
        assert!(!result("ALLOW", json!(1)).should_block());
        assert!(!result("ALLOW", json!(1.99)).should_block());
        assert!(!result("block", json!(0)).should_block());
    }

    #[test]
    fn missing_severity_never_meets_thresholds() {
        let a: AnalysisResult = serde_json::from_value(json!({ "action": "WARN" })).unwrap();
        assert!(!a.severity_at_least(0));
        assert!(!a.should_block());
    }

    #[test]
    fn severity_accepts_numeric_strings() {
        let a = result("ALLOW", json!("3"));
        assert!(a.should_block());
        assert_eq!(a.severity().unwrap().to_string(), "3");

        let bad: Result<AnalysisResult, _> =
            serde_json::from_value(json!({ "action": "ALLOW", "severity": "high" }));
        assert!(bad.is_err());
    }

    #[test]
    fn unknown_fields_round_trip_to_caller() {
        let a: AnalysisResult = serde_json::from_value(json!({
            "action": "ALLOW",
            "severity": 0,
            "confidence": 0.9
        }))
        .unwrap();
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["confidence"], json!(0.9));
        assert_eq!(v["severity"], json!(0));
        assert!(v.get("category").is_none());
    }

    #[test]
    fn content_filtered_verdict_is_maximal() {
        let resp = AnalyzeResponse::from(AnalysisResult::content_filtered());
        assert!(resp.should_block);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["shouldBlock"], json!(true));
        assert_eq!(v["analysis"]["action"], json!("BLOCK"));
        assert_eq!(v["analysis"]["category"], json!("CONTENT_FILTER"));
        assert_eq!(v["analysis"]["severity"], json!(5));
        assert_eq!(v["analysis"]["child_risk"], json!("CRITICAL"));
    }

    #[test]
    fn request_treats_empty_strings_as_absent() {
        let r: AnalysisRequest =
            serde_json::from_value(json!({ "messageText": "", "parentEmail": "" })).unwrap();
        assert_eq!(r.message_text(), None);
        assert_eq!(r.parent_email(), None);

        let r: AnalysisRequest = serde_json::from_value(json!({
            "messageText": "hi",
            "parentEmail": "p@x.com",
            "context": "main"
        }))
        .unwrap();
        assert_eq!(r.message_text(), Some("hi"));
        assert_eq!(r.parent_email(), Some("p@x.com"));
        assert_eq!(r.context.as_deref(), Some("main"));
    }

    #[test]
    fn request_fields_of_the_wrong_type_read_as_absent() {
        let r: AnalysisRequest = serde_json::from_value(json!({
            "messageText": "hello",
            "parentEmail": ["p@x.com"],
            "context": 1
        }))
        .unwrap();
        assert_eq!(r.message_text(), Some("hello"));
        assert_eq!(r.parent_email(), None);
        assert_eq!(r.context, None);

        let r: AnalysisRequest =
            serde_json::from_value(json!({ "messageText": 42, "context": null })).unwrap();
        assert_eq!(r.message_text(), None);
        assert_eq!(r.context, None);
    }

    #[test]
    fn explicit_nulls_are_echoed_and_omissions_stay_omitted() {
        let a: AnalysisResult = serde_json::from_value(json!({
            "action": "ALLOW",
            "severity": null,
            "category": null
        }))
        .unwrap();
        assert_eq!(a.category(), None);
        assert!(!a.severity_at_least(0));

        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["category"], Value::Null);
        assert_eq!(v["severity"], Value::Null);
        assert!(v.as_object().unwrap().contains_key("category"));
        assert!(!v.as_object().unwrap().contains_key("reason"));
        assert!(!v.as_object().unwrap().contains_key("child_risk"));
    }
}
