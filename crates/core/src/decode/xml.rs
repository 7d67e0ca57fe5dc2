//! XML request decoding.
//!
//! SECURITY: this decoder is intentionally vulnerable. It is used as the target of the
//! security-testing exercise and must keep the following behaviour:
//!
//! * internal entities declared in the DOCTYPE are expanded recursively with no limit on
//!   depth or output size ("billion laughs"),
//! * external `SYSTEM`/`PUBLIC` entities are resolved by reading the referenced local file
//!   (XXE file disclosure).
//!
//! Do not route untrusted production traffic through this path.

use crate::decode::DecodeError;
use crate::domain::contract::RecommendRequest;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntityDecl {
    Internal(String),
    External(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    RiskScore,
    Name,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"risk_score" => Some(Self::RiskScore),
            b"name" => Some(Self::Name),
            _ => None,
        }
    }
}

/// Parses `<request><risk_score/><name/></request>` with entity expansion enabled.
pub fn parse_xml_vulnerable(xml: &str) -> Result<RecommendRequest, DecodeError> {
    // No trimming: whitespace inside a captured element is part of its value, and
    // whitespace between elements is never captured.
    let mut reader = Reader::from_str(xml);

    let mut entities: HashMap<String, String> = HashMap::new();
    let mut depth: usize = 0;
    let mut seen_root = false;
    let mut capture: Option<Field> = None;
    let mut risk_score: Option<String> = None;
    let mut name: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DecodeError::Xml(e.to_string()))?;

        match event {
            Event::DocType(doctype) => {
                let raw = std::str::from_utf8(&doctype)
                    .map_err(|e| DecodeError::Xml(format!("DOCTYPE is not valid UTF-8: {e}")))?;
                entities = expand_declarations(&parse_entity_declarations(raw)?);
            }
            Event::Start(start) => {
                depth += 1;
                seen_root = true;
                if depth == 2 {
                    let field = Field::from_tag(start.name().as_ref());
                    capture = claim(field, &mut risk_score, &mut name);
                }
            }
            Event::Empty(empty) => {
                seen_root = true;
                if depth == 1 {
                    let field = Field::from_tag(empty.name().as_ref());
                    claim(field, &mut risk_score, &mut name);
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    capture = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) if depth == 2 => {
                if let Some(field) = capture {
                    let decoded = text
                        .unescape_with(|entity| {
                            entities
                                .get(entity)
                                .map(String::as_str)
                                .or_else(|| predefined_entity(entity))
                        })
                        .map_err(|e| DecodeError::Xml(e.to_string()))?;
                    slot(field, &mut risk_score, &mut name).push_str(&decoded);
                }
            }
            Event::CData(cdata) if depth == 2 => {
                if let Some(field) = capture {
                    let raw = String::from_utf8_lossy(&cdata);
                    slot(field, &mut risk_score, &mut name).push_str(&raw);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(DecodeError::Xml("no element found".to_string()));
    }
    if depth != 0 {
        return Err(DecodeError::Xml("unclosed element at end of document".to_string()));
    }

    let risk_score =
        risk_score.ok_or_else(|| DecodeError::Xml("missing <risk_score> element".to_string()))?;
    let name = name.ok_or_else(|| DecodeError::Xml("missing <name> element".to_string()))?;

    Ok(RecommendRequest {
        name,
        risk_score: Some(Value::String(risk_score)),
    })
}

/// First occurrence of each field wins; later duplicates are not captured.
fn claim(
    field: Option<Field>,
    risk_score: &mut Option<String>,
    name: &mut Option<String>,
) -> Option<Field> {
    let field = field?;
    let target = match field {
        Field::RiskScore => risk_score,
        Field::Name => name,
    };
    if target.is_some() {
        return None;
    }
    *target = Some(String::new());
    Some(field)
}

fn slot<'a>(
    field: Field,
    risk_score: &'a mut Option<String>,
    name: &'a mut Option<String>,
) -> &'a mut String {
    match field {
        Field::RiskScore => risk_score.get_or_insert_with(String::new),
        Field::Name => name.get_or_insert_with(String::new),
    }
}

fn predefined_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Extracts general entity declarations from the DOCTYPE internal subset.
/// Parameter entities (`<!ENTITY % name ...>`) are skipped.
fn parse_entity_declarations(doctype: &str) -> Result<HashMap<String, EntityDecl>, DecodeError> {
    let mut decls = HashMap::new();
    let Some(open) = doctype.find('[') else {
        return Ok(decls);
    };

    let mut rest = &doctype[open + 1..];
    while let Some(pos) = rest.find('<') {
        let markup = &rest[pos..];
        if markup.starts_with("<!--") {
            rest = skip_past(markup, "-->", "unterminated comment in DOCTYPE")?;
            continue;
        }
        if markup.starts_with("<?") {
            rest = skip_past(markup, "?>", "unterminated processing instruction in DOCTYPE")?;
            continue;
        }
        let Some(body) = markup.strip_prefix("<!ENTITY") else {
            rest = &markup[1..];
            continue;
        };
        let body = body.trim_start();

        if let Some(after_percent) = body.strip_prefix('%') {
            rest = skip_past_decl_end(after_percent)?;
            continue;
        }

        let name_end = body
            .find(|c: char| c.is_whitespace())
            .ok_or_else(|| DecodeError::Xml("malformed ENTITY declaration".to_string()))?;
        let name = &body[..name_end];
        let body = body[name_end..].trim_start();

        let (decl, after) = if let Some(after) = body.strip_prefix("SYSTEM") {
            let (uri, after) = read_quoted(after.trim_start())?;
            (EntityDecl::External(uri.to_string()), after)
        } else if let Some(after) = body.strip_prefix("PUBLIC") {
            let (_public_id, after) = read_quoted(after.trim_start())?;
            let (uri, after) = read_quoted(after.trim_start())?;
            (EntityDecl::External(uri.to_string()), after)
        } else {
            let (value, after) = read_quoted(body)?;
            (EntityDecl::Internal(value.to_string()), after)
        };

        // The first declaration of an entity is binding.
        decls.entry(name.to_string()).or_insert(decl);
        rest = skip_past_decl_end(after)?;
    }

    Ok(decls)
}

fn read_quoted(s: &str) -> Result<(&str, &str), DecodeError> {
    let quote = s
        .chars()
        .next()
        .filter(|c| *c == '"' || *c == '\'')
        .ok_or_else(|| DecodeError::Xml("expected quoted literal in ENTITY declaration".to_string()))?;
    let inner = &s[1..];
    let end = inner
        .find(quote)
        .ok_or_else(|| DecodeError::Xml("unterminated literal in ENTITY declaration".to_string()))?;
    Ok((&inner[..end], &inner[end + 1..]))
}

fn skip_past<'a>(s: &'a str, terminator: &str, error: &str) -> Result<&'a str, DecodeError> {
    let end = s
        .find(terminator)
        .ok_or_else(|| DecodeError::Xml(error.to_string()))?;
    Ok(&s[end + terminator.len()..])
}

fn skip_past_decl_end(s: &str) -> Result<&str, DecodeError> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '>') => return Ok(&s[i + 1..]),
            _ => {}
        }
    }
    Err(DecodeError::Xml("unterminated ENTITY declaration".to_string()))
}

/// Resolves every declaration to its final text. Entities that cannot be resolved are left
/// out, so a later reference to them fails as an unrecognized entity.
fn expand_declarations(decls: &HashMap<String, EntityDecl>) -> HashMap<String, String> {
    let mut expander = Expander {
        decls,
        resolved: HashMap::new(),
        in_progress: Vec::new(),
    };
    for name in decls.keys() {
        if let Err(e) = expander.resolve(name) {
            expander.in_progress.clear();
            tracing::debug!(entity = %name, error = %e, "XML entity left unresolved");
        }
    }
    expander.resolved
}

struct Expander<'a> {
    decls: &'a HashMap<String, EntityDecl>,
    resolved: HashMap<String, String>,
    in_progress: Vec<String>,
}

impl Expander<'_> {
    fn resolve(&mut self, name: &str) -> Result<String, DecodeError> {
        if let Some(text) = self.resolved.get(name) {
            return Ok(text.clone());
        }
        if self.in_progress.iter().any(|n| n == name) {
            return Err(DecodeError::Xml(format!("recursive entity reference: &{name};")));
        }
        let decls = self.decls;
        let decl = decls
            .get(name)
            .ok_or_else(|| DecodeError::Xml(format!("undefined entity: &{name};")))?;

        self.in_progress.push(name.to_string());
        let text = match decl {
            EntityDecl::Internal(value) => {
                let substituted = self.substitute(value)?;
                unescape(&substituted)
                    .map_err(|e| DecodeError::Xml(e.to_string()))?
                    .into_owned()
            }
            EntityDecl::External(uri) => load_external(name, uri)?,
        };
        self.in_progress.pop();

        self.resolved.insert(name.to_string(), text.clone());
        Ok(text)
    }

    /// Replaces declared entity references, keeping predefined and character references
    /// encoded so the caller can decode the whole value in one pass.
    fn substitute(&mut self, raw: &str) -> Result<String, DecodeError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let semi = after
                .find(';')
                .ok_or_else(|| DecodeError::Xml("unterminated entity reference".to_string()))?;
            let reference = &after[..semi];
            if reference.starts_with('#') || predefined_entity(reference).is_some() {
                out.push('&');
                out.push_str(reference);
                out.push(';');
            } else {
                let text = self.resolve(reference)?;
                out.push_str(&escape(text.as_str()));
            }
            rest = &after[semi + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn load_external(name: &str, uri: &str) -> Result<String, DecodeError> {
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.contains("://") {
        return Err(DecodeError::Xml(format!(
            "unsupported external entity URI for &{name};: {uri}"
        )));
    }
    tracing::warn!(entity = %name, %uri, "resolving external XML entity");
    std::fs::read_to_string(path)
        .map_err(|e| DecodeError::Xml(format!("cannot load external entity {uri}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_of(req: &RecommendRequest) -> &str {
        req.risk_score.as_ref().and_then(Value::as_str).unwrap()
    }

    #[test]
    fn parses_plain_request() {
        let xml = "<request><risk_score>42</risk_score><name>Ada</name></request>";
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "Ada");
        assert_eq!(score_of(&req), "42");
    }

    #[test]
    fn risk_score_text_goes_through_shared_validation() {
        let xml = "<request><risk_score> 75 </risk_score><name>Ada</name></request>";
        let rec = parse_xml_vulnerable(xml)
            .unwrap()
            .validate_and_into_recommendation()
            .unwrap();
        assert_eq!(rec.risk_score, 75);
    }

    #[test]
    fn missing_elements_are_decode_errors() {
        let err = parse_xml_vulnerable("<request><name>Ada</name></request>").unwrap_err();
        assert_eq!(
            err.to_string(),
            "XML parsing error: missing <risk_score> element"
        );

        let err = parse_xml_vulnerable("<request><risk_score>1</risk_score></request>").unwrap_err();
        assert!(matches!(err, DecodeError::Xml(_)));
    }

    #[test]
    fn malformed_documents_are_decode_errors() {
        assert!(parse_xml_vulnerable("").is_err());
        assert!(parse_xml_vulnerable("<request><risk_score>1</name></request>").is_err());
        assert!(parse_xml_vulnerable("<request><risk_score>1</risk_score>").is_err());
    }

    #[test]
    fn only_direct_children_of_root_are_read() {
        let xml = "<request><meta><name>Nested</name></meta>\
                   <risk_score>5</risk_score><name>Top</name><name>Second</name></request>";
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "Top");
    }

    #[test]
    fn cdata_is_returned_verbatim() {
        let xml = r#"<?xml version="1.0"?>
<request>
  <risk_score>45</risk_score>
  <name><![CDATA[<script>alert('XSS')</script>]]></name>
</request>"#;
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "<script>alert('XSS')</script>");
    }

    #[test]
    fn internal_entities_are_expanded() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE foo [
  <!ENTITY malicious "INJECTED_CONTENT_12345">
]>
<request>
  <risk_score>60</risk_score>
  <name>&malicious;</name>
</request>"#;
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "INJECTED_CONTENT_12345");
    }

    #[test]
    fn nested_entities_expand_without_limit() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE lolz [
  <!ENTITY lol "lol">
  <!ENTITY lol2 "&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;">
  <!ENTITY lol3 "&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;">
  <!ENTITY lol4 "&lol3;&lol3;&lol3;&lol3;&lol3;&lol3;&lol3;&lol3;&lol3;&lol3;">
]>
<request>
  <risk_score>75</risk_score>
  <name>&lol4;</name>
</request>"#;
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name.len(), 3 * 1000);
        assert_eq!(req.name, "lol".repeat(1000));
    }

    // Documents the XXE defect: the external entity is resolved and its file content
    // lands in the decoded name.
    #[test]
    fn external_entities_disclose_local_files() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let xml = format!(
            r#"<?xml version="1.0"?>
<!DOCTYPE foo [
  <!ENTITY xxe SYSTEM "file://{path}">
]>
<request>
  <risk_score>50</risk_score>
  <name>&xxe;</name>
</request>"#
        );
        let req = parse_xml_vulnerable(&xml).unwrap();
        assert!(req.name.contains("name = \"finsecure_core\""));
    }

    #[test]
    fn predefined_and_char_refs_inside_entities_are_decoded() {
        let xml = r#"<!DOCTYPE r [ <!ENTITY both "a &amp; b &#65;"> ]>
<request><risk_score>1</risk_score><name>&both; &lt;x&gt;</name></request>"#;
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "a & b A <x>");
    }

    #[test]
    fn undefined_and_recursive_entities_are_rejected() {
        let undefined = "<request><risk_score>1</risk_score><name>&nope;</name></request>";
        assert!(parse_xml_vulnerable(undefined).is_err());

        let recursive = r#"<!DOCTYPE r [
  <!ENTITY a "&b;">
  <!ENTITY b "&a;">
]>
<request><risk_score>1</risk_score><name>&a;</name></request>"#;
        assert!(parse_xml_vulnerable(recursive).is_err());
    }

    #[test]
    fn missing_external_file_fails_only_when_referenced() {
        let unused = r#"<!DOCTYPE r [ <!ENTITY gone SYSTEM "file:///definitely/not/here"> ]>
<request><risk_score>1</risk_score><name>ok</name></request>"#;
        assert_eq!(parse_xml_vulnerable(unused).unwrap().name, "ok");

        let used = unused.replace("<name>ok</name>", "<name>&gone;</name>");
        assert!(parse_xml_vulnerable(&used).is_err());
    }

    #[test]
    fn parses_declarations_with_quotes_and_parameter_entities() {
        let decls = parse_entity_declarations(
            r#"foo [ <!ENTITY % p "ignored"> <!ENTITY a 'x > y'> <!ENTITY b PUBLIC "-//X" "file:///tmp/b"> ]"#,
        )
        .unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls.get("a"), Some(&EntityDecl::Internal("x > y".to_string())));
        assert_eq!(
            decls.get("b"),
            Some(&EntityDecl::External("file:///tmp/b".to_string()))
        );
    }

    #[test]
    fn commented_out_declarations_are_ignored() {
        let decls = parse_entity_declarations(
            r#"r [ <!-- <!ENTITY a "evil"> --> <?pi <!ENTITY b "pi"> ?> <!ENTITY a "good"> ]"#,
        )
        .unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls.get("a"), Some(&EntityDecl::Internal("good".to_string())));

        let xml = r#"<!DOCTYPE r [ <!-- <!ENTITY a "evil"> --> <!ENTITY a "good"> ]>
<request><risk_score>1</risk_score><name>&a;</name></request>"#;
        assert_eq!(parse_xml_vulnerable(xml).unwrap().name, "good");
    }

    #[test]
    fn name_keeps_surrounding_whitespace() {
        let xml = "<request>\n  <risk_score> 7 </risk_score>\n  <name>  Ada  </name>\n</request>";
        let req = parse_xml_vulnerable(xml).unwrap();
        assert_eq!(req.name, "  Ada  ");
        assert_eq!(score_of(&req), " 7 ");
    }
}
