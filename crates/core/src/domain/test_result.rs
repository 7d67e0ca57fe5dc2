use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_DETAILS_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Compliance,
    Security,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliance => "compliance",
            Self::Security => "security",
        }
    }

    /// Name under which runs of this suite are recorded.
    pub fn test_name(self) -> String {
        format!("{}_test", self.as_str())
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliance" => Ok(Self::Compliance),
            "security" => Ok(Self::Security),
            other => Err(format!("unknown test type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTestResult {
    pub test_name: String,
    pub test_type: TestType,
    pub status: TestStatus,
    pub details: String,
}

impl NewTestResult {
    pub fn new(test_type: TestType, status: TestStatus, output: &str) -> Self {
        Self {
            test_name: test_type.test_name(),
            test_type,
            status,
            details: truncate_details(output),
        }
    }
}

/// Summary row used by the metrics endpoint; `details` is intentionally not exposed there.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecentTestResult {
    pub test_name: String,
    pub test_type: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Keeps the first 500 characters (not bytes) of captured output.
pub fn truncate_details(output: &str) -> String {
    output.chars().take(MAX_DETAILS_CHARS).collect()
}
