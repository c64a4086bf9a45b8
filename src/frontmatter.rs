//! Front-matter splitting.
//!
//! A document may start with a YAML header delimited by `---` lines:
//!
//! ```text
//! ---
//! title: Getting Started
//! slug: start
//! ---
//! Body text...
//! ```
//!
//! A file without a header (or with an unterminated one) is all body.

use crate::models::Metadata;

/// A document split into its metadata and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
    pub metadata: Metadata,
    pub body: String,
}

/// Split `raw` into front matter and body.
///
/// Returns an error message when a header is present but is not a YAML
/// mapping.
pub fn split(raw: &str) -> Result<Parsed, String> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let Some(rest) = strip_delimiter_line(text) else {
        return Ok(Parsed {
            metadata: Metadata::new(),
            body: text.to_string(),
        });
    };

    let Some((header, body)) = find_closing(rest) else {
        return Ok(Parsed {
            metadata: Metadata::new(),
            body: text.to_string(),
        });
    };

    Ok(Parsed {
        metadata: parse_header(header)?,
        body: body.to_string(),
    })
}

/// If `text` begins with a `---` line, return what follows it.
fn strip_delimiter_line(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("---")?;
    let (line_rest, after) = match rest.find('\n') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };
    line_rest.trim().is_empty().then_some(after)
}

/// Find the closing `---` line. Returns `(header, body)`; a single newline
/// directly after the closing delimiter is not part of the body.
fn find_closing(rest: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.trim_end() == "---" {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((header, body));
        }
        offset += line.len();
    }
    None
}

fn parse_header(header: &str) -> Result<Metadata, String> {
    if header.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value: serde_json::Value = serde_yaml::from_str(header).map_err(|e| e.to_string())?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Metadata::new()),
        other => Err(format!("front matter must be a mapping, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header_is_all_body() {
        let parsed = split("# Title\n\nBody").unwrap();
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.body, "# Title\n\nBody");
    }

    #[test]
    fn test_header_and_body() {
        let parsed = split("---\ntitle: Hello\nslug: custom\n---\nBody here\n").unwrap();
        assert_eq!(parsed.metadata["title"], "Hello");
        assert_eq!(parsed.metadata["slug"], "custom");
        assert_eq!(parsed.body, "Body here\n");
    }

    #[test]
    fn test_structured_values_preserved() {
        let parsed = split("---\ntags: [a, b]\norder: 3\n---\n").unwrap();
        assert_eq!(parsed.metadata["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(parsed.metadata["order"], 3);
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_crlf_header() {
        let parsed = split("---\r\ntitle: Win\r\n---\r\nBody").unwrap();
        assert_eq!(parsed.metadata["title"], "Win");
        assert_eq!(parsed.body, "Body");
    }

    #[test]
    fn test_empty_header() {
        let parsed = split("---\n---\nBody").unwrap();
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.body, "Body");
    }

    #[test]
    fn test_unterminated_header_is_body() {
        let raw = "---\ntitle: Oops\nno closing line";
        let parsed = split(raw).unwrap();
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.body, raw);
    }

    #[test]
    fn test_horizontal_rule_later_in_body_is_not_a_header() {
        let raw = "Intro\n---\nMore";
        let parsed = split(raw).unwrap();
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.body, raw);
    }

    #[test]
    fn test_scalar_header_is_rejected() {
        let err = split("---\njust a string\n---\nBody").unwrap_err();
        assert!(err.contains("mapping"));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(split("---\ntitle: [unclosed\n---\nBody").is_err());
    }
}
