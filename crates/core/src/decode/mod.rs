pub mod json;
pub mod xml;

use crate::domain::contract::RecommendRequest;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid JSON body: {0}")]
    Json(String),

    #[error("XML parsing error: {0}")]
    Xml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Xml,
}

impl BodyFormat {
    /// Anything that is not declared as XML is treated as JSON.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("application/xml") || ct.contains("text/xml") => Self::Xml,
            _ => Self::Json,
        }
    }
}

pub fn decode_body(format: BodyFormat, body: &[u8]) -> Result<RecommendRequest, DecodeError> {
    match format {
        BodyFormat::Json => json::parse_json_body(body),
        BodyFormat::Xml => {
            let text = std::str::from_utf8(body)
                .map_err(|e| DecodeError::Xml(format!("body is not valid UTF-8: {e}")))?;
            xml::parse_xml_vulnerable(text)
        }
    }
}
