use crate::decode::DecodeError;
use crate::domain::contract::{RecommendRequest, DEFAULT_NAME};
use serde_json::Value;

pub fn parse_json_body(body: &[u8]) -> Result<RecommendRequest, DecodeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::Json(e.to_string()))?;

    let Value::Object(mut obj) = value else {
        return Err(DecodeError::Json("expected a JSON object".to_string()));
    };

    let name = match obj.remove("name") {
        None | Some(Value::Null) => DEFAULT_NAME.to_string(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };

    Ok(RecommendRequest {
        name,
        risk_score: obj.remove("risk_score"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_name_and_raw_score() {
        let req = parse_json_body(br#"{"risk_score": 42, "name": "Ada"}"#).unwrap();
        assert_eq!(req.name, "Ada");
        assert_eq!(req.risk_score, Some(json!(42)));
    }

    #[test]
    fn defaults_name_to_anonymous() {
        let req = parse_json_body(br#"{"risk_score": 10}"#).unwrap();
        assert_eq!(req.name, "Anonymous");

        let req = parse_json_body(br#"{"risk_score": 10, "name": null}"#).unwrap();
        assert_eq!(req.name, "Anonymous");
    }

    #[test]
    fn missing_score_is_left_for_validation() {
        let req = parse_json_body(br#"{"name": "Test"}"#).unwrap();
        assert_eq!(req.risk_score, None);
    }

    #[test]
    fn non_string_names_are_rendered() {
        let req = parse_json_body(br#"{"risk_score": 1, "name": 7}"#).unwrap();
        assert_eq!(req.name, "7");
    }

    #[test]
    fn rejects_malformed_and_non_object_bodies() {
        assert!(matches!(parse_json_body(b"{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(parse_json_body(b"[1, 2]"), Err(DecodeError::Json(_))));
        assert!(matches!(parse_json_body(b""), Err(DecodeError::Json(_))));
    }
}
