use crate::domain::portfolio::PortfolioType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// A validated recommendation that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecommendation {
    pub name: String,
    pub risk_score: i32,
    pub portfolio_type: PortfolioType,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recommendation {
    pub id: i32,
    pub name: String,
    pub risk_score: i32,
    pub portfolio_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Body returned by `POST /recommend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub name: String,
    pub risk_score: i32,
    pub portfolio_type: PortfolioType,
    pub timestamp: DateTime<Utc>,
}

impl RecommendationResponse {
    pub fn new(rec: NewRecommendation, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: rec.name,
            risk_score: rec.risk_score,
            portfolio_type: rec.portfolio_type,
            timestamp,
        }
    }
}

/// Page request for the history listing. `limit` is caller-controlled and deliberately unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationQuery {
    pub limit: i64,
    pub offset: i64,
    pub portfolio_type: Option<String>,
}

impl Default for RecommendationQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            portfolio_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationPage {
    pub recommendations: Vec<Recommendation>,
    pub total: i64,
}
