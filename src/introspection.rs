pub fn analysis_schema() -> serde_json::Value {
    // Schema for the `analysis` object returned by /api/analyze.
    // Unknown fields from the model are passed through, hence additionalProperties.
    serde_json::json!({
      "$schema": "https://json-schema.org/draft/2020-12/schema",
      "title": "AnalysisResult",
      "type": "object",
      "properties": {
        "action": {"type": "string", "examples": ["ALLOW", "WARN", "BLOCK"]},
        "severity": {"type": ["number", "string"], "description": "ordered scale; >= 2 blocks, >= 3 notifies"},
        "category": {"type": "string"},
        "reason": {"type": "string"},
        "child_risk": {"type": "string", "examples": ["LOW", "MEDIUM", "HIGH", "CRITICAL"]}
      },
      "additionalProperties": true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;

    #[test]
    fn schema_covers_every_known_field() {
        let schema = analysis_schema();
        let full = serde_json::to_value(AnalysisResult::content_filtered()).unwrap();
        for key in full.as_object().unwrap().keys() {
            assert!(schema["properties"].get(key).is_some(), "missing {key}");
        }
    }
}
