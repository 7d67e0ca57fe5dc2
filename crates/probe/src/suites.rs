use anyhow::Context;
use finsecure_core::domain::portfolio::PortfolioType;
use serde_json::{json, Value};
use std::time::Duration;

/// Boundary values around the Bonds/Stocks threshold.
pub const BOUNDARY_CASES: [(i64, PortfolioType); 4] = [
    (0, PortfolioType::Bonds),
    (49, PortfolioType::Bonds),
    (50, PortfolioType::Stocks),
    (100, PortfolioType::Stocks),
];

const XXE_PAYLOAD: &str = r#"<?xml version="1.0"?>
<!DOCTYPE foo [
  <!ENTITY xxe SYSTEM "file:///etc/passwd">
]>
<request>
  <risk_score>50</risk_score>
  <name>&xxe;</name>
</request>"#;

const BILLION_LAUGHS_PAYLOAD: &str = r#"<?xml version="1.0"?>
<!DOCTYPE lolz [
  <!ENTITY lol "lol">
  <!ENTITY lol2 "&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;">
  <!ENTITY lol3 "&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;">
]>
<request>
  <risk_score>75</risk_score>
  <name>&lol3;</name>
</request>"#;

const ENTITY_INJECTION_PAYLOAD: &str = r#"<?xml version="1.0"?>
<!DOCTYPE foo [
  <!ENTITY malicious "INJECTED_CONTENT_12345">
]>
<request>
  <risk_score>60</risk_score>
  <name>&malicious;</name>
</request>"#;

const CDATA_PAYLOAD: &str = r#"<?xml version="1.0"?>
<request>
  <risk_score>45</risk_score>
  <name><![CDATA[<script>alert('XSS')</script>]]></name>
</request>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass(String),
    /// Observed something noteworthy that the case does not treat as a failure.
    Warn(String),
    Fail(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub outcome: Outcome,
}

impl CaseReport {
    fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }

    pub fn line(&self) -> String {
        match &self.outcome {
            Outcome::Pass(msg) => format!("✓ {} [PASS]: {msg}", self.name),
            Outcome::Warn(msg) => format!("⚠ {} [WARN]: {msg}", self.name),
            Outcome::Fail(msg) => format!("✗ {} [FAIL]: {msg}", self.name),
        }
    }
}

/// HTTP reply reduced to what the cases inspect.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn name(&self) -> &str {
        self.body.get("name").and_then(Value::as_str).unwrap_or_default()
    }
}

pub struct Probe {
    http: reqwest::Client,
    recommend_url: String,
}

impl Probe {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build probe http client")?;
        Ok(Self {
            http,
            recommend_url: format!("{}/recommend", base_url.trim_end_matches('/')),
        })
    }

    async fn post_json(&self, payload: &Value) -> Result<Reply, reqwest::Error> {
        let res = self.http.post(&self.recommend_url).json(payload).send().await?;
        Self::reply(res).await
    }

    async fn post_xml(&self, payload: &'static str) -> Result<Reply, reqwest::Error> {
        let res = self
            .http
            .post(&self.recommend_url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(payload)
            .send()
            .await?;
        Self::reply(res).await
    }

    async fn reply(res: reqwest::Response) -> Result<Reply, reqwest::Error> {
        let status = res.status().as_u16();
        let text = res.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(Reply { status, body })
    }
}

pub async fn run_compliance(probe: &Probe) -> Vec<CaseReport> {
    let mut reports = Vec::new();

    for (risk_score, expected) in BOUNDARY_CASES {
        let name = format!("Risk Score {risk_score:3}");
        let payload = json!({"risk_score": risk_score, "name": format!("Tester_{risk_score}")});
        let outcome = match probe.post_json(&payload).await {
            Ok(reply) => evaluate_boundary(risk_score, expected, &reply),
            Err(e) => request_failed(e),
        };
        reports.push(CaseReport::new(name, outcome));
    }

    let rejections = [
        ("Negative risk score", json!({"risk_score": -10, "name": "Test"})),
        ("Risk score above 100", json!({"risk_score": 150, "name": "Test"})),
        ("Missing risk score", json!({"name": "Test"})),
    ];
    for (name, payload) in rejections {
        let outcome = match probe.post_json(&payload).await {
            Ok(reply) => evaluate_rejection(&reply),
            Err(e) => request_failed(e),
        };
        reports.push(CaseReport::new(name, outcome));
    }

    reports
}

pub async fn run_security(probe: &Probe) -> Vec<CaseReport> {
    let mut reports = Vec::new();

    let outcome = match probe.post_xml(XXE_PAYLOAD).await {
        Ok(reply) => evaluate_xxe(&reply),
        Err(e) => request_failed(e),
    };
    reports.push(CaseReport::new("XXE File Disclosure", outcome));

    let outcome = match probe.post_xml(BILLION_LAUGHS_PAYLOAD).await {
        Ok(reply) => evaluate_billion_laughs(Some(&reply)),
        Err(e) if e.is_timeout() => evaluate_billion_laughs(None),
        Err(e) => request_failed(e),
    };
    reports.push(CaseReport::new("Billion Laughs Attack", outcome));

    let outcome = match probe.post_xml(ENTITY_INJECTION_PAYLOAD).await {
        Ok(reply) => evaluate_entity_injection(&reply),
        Err(e) => request_failed(e),
    };
    reports.push(CaseReport::new("Entity Injection", outcome));

    let outcome = match probe.post_xml(CDATA_PAYLOAD).await {
        Ok(reply) => evaluate_cdata(&reply),
        Err(e) => request_failed(e),
    };
    reports.push(CaseReport::new("CDATA Injection", outcome));

    reports
}

/// A transport failure fails the case and is reported to sentry with the request context.
fn request_failed(err: reqwest::Error) -> Outcome {
    let detail = format!("request error: {err}");
    let err = anyhow::Error::new(err).context("request to /recommend failed");
    sentry_anyhow::capture_anyhow(&err);
    tracing::warn!(error = %err, "case request failed");
    Outcome::Fail(detail)
}

pub fn evaluate_boundary(risk_score: i64, expected: PortfolioType, reply: &Reply) -> Outcome {
    if reply.status != 200 {
        return Outcome::Fail(format!(
            "expected 200, got {} for risk_score={risk_score}",
            reply.status
        ));
    }
    match reply.body.get("portfolio_type").and_then(Value::as_str) {
        None => Outcome::Fail("response missing portfolio_type field".to_string()),
        Some(actual) if actual == expected.as_str() => Outcome::Pass(format!("→ {actual}")),
        Some(actual) => Outcome::Fail(format!(
            "expected '{}', got '{actual}'",
            expected.as_str()
        )),
    }
}

pub fn evaluate_rejection(reply: &Reply) -> Outcome {
    if reply.status == 400 {
        Outcome::Pass("rejected with 400".to_string())
    } else {
        Outcome::Fail(format!("expected 400, got {}", reply.status))
    }
}

pub fn evaluate_xxe(reply: &Reply) -> Outcome {
    if reply.status == 200 && reply.name().contains("root:") {
        return Outcome::Fail(
            "CRITICAL: XXE vulnerability detected! File contents exposed.".to_string(),
        );
    }
    match reply.status {
        400 | 500 => Outcome::Pass("file disclosure attempt blocked".to_string()),
        other => Outcome::Fail(format!("expected error status, got {other}")),
    }
}

/// `None` means the request timed out, which counts as detection.
pub fn evaluate_billion_laughs(reply: Option<&Reply>) -> Outcome {
    match reply {
        None => Outcome::Pass("attack caused a timeout (detected)".to_string()),
        Some(r) if matches!(r.status, 400 | 500) => Outcome::Pass("attack blocked".to_string()),
        Some(r) => Outcome::Fail(format!(
            "entity expansion accepted with status {}",
            r.status
        )),
    }
}

pub fn evaluate_entity_injection(reply: &Reply) -> Outcome {
    if reply.status != 200 {
        return Outcome::Pass(format!("malicious entity rejected with status {}", reply.status));
    }
    if reply.name().contains("INJECTED_CONTENT") {
        Outcome::Warn("entity injection successful (vulnerability present)".to_string())
    } else {
        Outcome::Pass("entity injection sanitized".to_string())
    }
}

pub fn evaluate_cdata(reply: &Reply) -> Outcome {
    if reply.status != 200 {
        return Outcome::Pass(format!("CDATA injection rejected with status {}", reply.status));
    }
    if reply.name().contains("<script>") {
        Outcome::Warn("CDATA content not sanitized".to_string())
    } else {
        Outcome::Pass("CDATA injection sanitized".to_string())
    }
}
