//! Recovery of structured values from free-text model output.
//!
//! Models wrap JSON in prose, markdown fences, or both. Rather than have every
//! agent slice strings on its own, this module scans for the first balanced
//! top-level `{...}` span (string literals and escapes respected) or the first
//! fenced code block, and hands back a typed result.

use serde::de::DeserializeOwned;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("unbalanced JSON object in model output")]
    Unbalanced,
    #[error("no fenced code block found in model output")]
    NoFencedBlock,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Returns the first balanced top-level JSON object in `text`.
pub fn find_json_object(text: &str) -> Result<&str, ExtractionError> {
    let start = text.find('{').ok_or(ExtractionError::NoJsonObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    Err(ExtractionError::Unbalanced)
}

/// Deserializes the first JSON object found in `text`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, ExtractionError> {
    let span = find_json_object(text)?;
    serde_json::from_str(span).map_err(|e| ExtractionError::Malformed(e.to_string()))
}

/// Returns the body of the first fenced code block.
///
/// When `language` is given, a block tagged with that language is preferred;
/// an untagged block is accepted as a fallback.
pub fn find_fenced_block<'a>(
    text: &'a str,
    language: Option<&str>,
) -> Result<&'a str, ExtractionError> {
    let mut untagged = None;
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_ticks = &rest[open + 3..];
        let line_end = after_ticks.find('\n').ok_or(ExtractionError::NoFencedBlock)?;
        let tag = after_ticks[..line_end].trim();
        let body_start = &after_ticks[line_end + 1..];
        let close = body_start
            .find("```")
            .ok_or(ExtractionError::NoFencedBlock)?;
        let body = body_start[..close].trim();

        match language {
            Some(lang) if tag.eq_ignore_ascii_case(lang) => return Ok(body),
            Some(_) if tag.is_empty() && untagged.is_none() => untagged = Some(body),
            None => return Ok(body),
            _ => {}
        }
        rest = &body_start[close + 3..];
    }
    untagged.ok_or(ExtractionError::NoFencedBlock)
}

/// Fails with [`ExtractionError::MissingField`] when `value` is blank.
pub fn require_text(value: &str, field: &'static str) -> Result<(), ExtractionError> {
    if value.trim().is_empty() {
        Err(ExtractionError::MissingField(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_finds_object_inside_prose() {
        let text = "Sure! Here you go:\n```json\n{\"name\": \"x\", \"nested\": {\"a\": 1}}\n```\nEnjoy.";
        assert_eq!(
            find_json_object(text).unwrap(),
            "{\"name\": \"x\", \"nested\": {\"a\": 1}}"
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"name": "curly } brace \" and {"} trailing {"#;
        let named: Named = parse_json_object(text).unwrap();
        assert_eq!(named.name, "curly } brace \" and {");
    }

    #[test]
    fn test_first_object_wins() {
        let text = r#"{"name": "first"} {"name": "second"}"#;
        let named: Named = parse_json_object(text).unwrap();
        assert_eq!(named.name, "first");
    }

    #[test]
    fn test_missing_and_unbalanced() {
        assert_eq!(
            find_json_object("no json here"),
            Err(ExtractionError::NoJsonObject)
        );
        assert_eq!(
            find_json_object("{\"name\": \"x\""),
            Err(ExtractionError::Unbalanced)
        );
    }

    #[test]
    fn test_schema_mismatch_is_malformed() {
        let err = parse_json_object::<Named>(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn test_fenced_block_prefers_language() {
        let text = "```\nplain\n```\n```mermaid\ngraph TD\nA-->B\n```";
        assert_eq!(
            find_fenced_block(text, Some("mermaid")).unwrap(),
            "graph TD\nA-->B"
        );
        assert_eq!(find_fenced_block(text, None).unwrap(), "plain");
    }

    #[test]
    fn test_fenced_block_falls_back_to_untagged() {
        let text = "```\ngraph LR\nX-->Y\n```";
        assert_eq!(
            find_fenced_block(text, Some("mermaid")).unwrap(),
            "graph LR\nX-->Y"
        );
        assert_eq!(
            find_fenced_block("```python\nprint()\n```", Some("mermaid")),
            Err(ExtractionError::NoFencedBlock)
        );
    }
}
