use crate::domain::portfolio::classify;
use crate::domain::recommendation::NewRecommendation;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAME: &str = "Anonymous";
pub const MIN_RISK_SCORE: i64 = 0;
pub const MAX_RISK_SCORE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("risk_score is required")]
    MissingRiskScore,

    #[error("risk_score must be an integer")]
    InvalidRiskScoreType,

    #[error("risk_score must be between 0 and 100")]
    RiskScoreOutOfRange(i64),
}

/// A decoded `/recommend` body, before validation. `risk_score` keeps its raw JSON shape
/// so both decoders share the same coercion rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendRequest {
    pub name: String,
    pub risk_score: Option<Value>,
}

impl RecommendRequest {
    pub fn validate_and_into_recommendation(self) -> Result<NewRecommendation, ValidationError> {
        let risk_score = coerce_risk_score(self.risk_score.as_ref())?;
        if !(MIN_RISK_SCORE..=MAX_RISK_SCORE).contains(&risk_score) {
            return Err(ValidationError::RiskScoreOutOfRange(risk_score));
        }
        // In range, so the narrowing cannot truncate.
        let risk_score = risk_score as i32;

        Ok(NewRecommendation {
            name: self.name,
            risk_score,
            portfolio_type: classify(risk_score),
        })
    }
}

/// Lenient integer conversion: integral numbers,
/// floats truncated toward zero, and numeric strings.
pub fn coerce_risk_score(raw: Option<&Value>) -> Result<i64, ValidationError> {
    match raw {
        None | Some(Value::Null) => Err(ValidationError::MissingRiskScore),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                // Saturating cast; anything that large lands out of range anyway.
                Some(f) if f.is_finite() => Ok(f.trunc() as i64),
                _ => Err(ValidationError::InvalidRiskScoreType),
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidRiskScoreType),
        Some(_) => Err(ValidationError::InvalidRiskScoreType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::PortfolioType;
    use serde_json::json;

    fn request(risk_score: Option<Value>) -> RecommendRequest {
        RecommendRequest {
            name: "Tester".to_string(),
            risk_score,
        }
    }

    #[test]
    fn accepts_boundaries() {
        let low = request(Some(json!(0))).validate_and_into_recommendation().unwrap();
        assert_eq!(low.portfolio_type, PortfolioType::Bonds);

        let mid = request(Some(json!(50))).validate_and_into_recommendation().unwrap();
        assert_eq!(mid.portfolio_type, PortfolioType::Stocks);

        let high = request(Some(json!(100))).validate_and_into_recommendation().unwrap();
        assert_eq!(high.risk_score, 100);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(
            request(Some(json!(-1))).validate_and_into_recommendation(),
            Err(ValidationError::RiskScoreOutOfRange(-1))
        );
        assert_eq!(
            request(Some(json!(101))).validate_and_into_recommendation(),
            Err(ValidationError::RiskScoreOutOfRange(101))
        );
    }

    #[test]
    fn missing_and_null_are_missing() {
        assert_eq!(coerce_risk_score(None), Err(ValidationError::MissingRiskScore));
        assert_eq!(
            coerce_risk_score(Some(&Value::Null)),
            Err(ValidationError::MissingRiskScore)
        );
    }

    #[test]
    fn coerces_strings_and_floats() {
        assert_eq!(coerce_risk_score(Some(&json!(" 42 "))), Ok(42));
        assert_eq!(coerce_risk_score(Some(&json!(49.9))), Ok(49));
        assert_eq!(coerce_risk_score(Some(&json!(-0.5))), Ok(0));
    }

    #[test]
    fn rejects_non_numeric_shapes() {
        for raw in [json!("abc"), json!(true), json!([1]), json!({"v": 1}), json!("4.5")] {
            assert_eq!(
                coerce_risk_score(Some(&raw)),
                Err(ValidationError::InvalidRiskScoreType),
                "raw={raw}"
            );
        }
    }

    #[test]
    fn huge_values_are_out_of_range_not_panics() {
        assert!(matches!(
            request(Some(json!(1e300))).validate_and_into_recommendation(),
            Err(ValidationError::RiskScoreOutOfRange(_))
        ));
    }
}
