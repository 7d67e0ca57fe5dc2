use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scores strictly below this are conservative; the threshold itself is aggressive.
pub const STOCKS_THRESHOLD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortfolioType {
    Bonds,
    Stocks,
}

impl PortfolioType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bonds => "Bonds",
            Self::Stocks => "Stocks",
        }
    }
}

impl fmt::Display for PortfolioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortfolioType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bonds" => Ok(Self::Bonds),
            "Stocks" => Ok(Self::Stocks),
            other => Err(format!("unknown portfolio type: {other}")),
        }
    }
}

pub fn classify(risk_score: i32) -> PortfolioType {
    if risk_score < STOCKS_THRESHOLD {
        PortfolioType::Bonds
    } else {
        PortfolioType::Stocks
    }
}
