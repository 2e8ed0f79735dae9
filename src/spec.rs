//! Field spec parsing
//!
//! A field spec names one numeric value to pull out of every document.
//!
//! # Format
//!
//! ```text
//! [<option>[,<option>...]:]path
//! ```
//!
//! Options:
//! - `counter`: emit the difference with the previous reading instead of the reading itself
//! - `marker`: a non-zero value asks the viewer to draw a marker
//!
//! The path is a JSON field path such as `cpu.user`. The field id is the path.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Errors detected while parsing field specs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("empty path in field spec '{0}'")]
    EmptyPath(String),
    #[error("unknown option '{option}' in field spec '{spec}'")]
    UnknownOption { spec: String, option: String },
    #[error("duplicate field id '{id}' in field spec '{spec}'")]
    DuplicateId { spec: String, id: String },
}

/// One declared signal to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(skip)]
    pub path: String,
    pub is_counter: bool,
    pub marker: bool,
}

/// An ordered group of fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Spec {
    pub fields: Vec<Field>,
}

/// Parse field spec strings into a single implicit spec
pub fn parse_specs<S: AsRef<str>>(args: &[S]) -> Result<Vec<Spec>, SpecError> {
    let mut seen = HashSet::new();
    let mut spec = Spec::default();

    for arg in args {
        let field = parse_field(arg.as_ref())?;
        if !seen.insert(field.id.clone()) {
            return Err(SpecError::DuplicateId {
                spec: arg.as_ref().to_string(),
                id: field.id,
            });
        }
        spec.fields.push(field);
    }

    Ok(vec![spec])
}

/// Parse a single `[options:]path` string
pub fn parse_field(raw: &str) -> Result<Field, SpecError> {
    let (options, path) = match raw.split_once(':') {
        Some((options, path)) => (Some(options), path),
        None => (None, raw),
    };

    if path.is_empty() {
        return Err(SpecError::EmptyPath(raw.to_string()));
    }

    let mut field = Field {
        id: path.to_string(),
        path: path.to_string(),
        is_counter: false,
        marker: false,
    };

    for option in options.into_iter().flat_map(|o| o.split(',')) {
        match option {
            "counter" => field.is_counter = true,
            "marker" => field.marker = true,
            other => {
                return Err(SpecError::UnknownOption {
                    spec: raw.to_string(),
                    option: other.to_string(),
                });
            }
        }
    }

    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path() {
        let field = parse_field("mem.heap").unwrap();
        assert_eq!(field.id, "mem.heap");
        assert_eq!(field.path, "mem.heap");
        assert!(!field.is_counter);
        assert!(!field.marker);
    }

    #[test]
    fn test_parse_counter() {
        let field = parse_field("counter:cpu.user").unwrap();
        assert_eq!(field.path, "cpu.user");
        assert_eq!(field.id, "cpu.user");
        assert!(field.is_counter);
        assert!(!field.marker);
    }

    #[test]
    fn test_parse_multiple_options() {
        let field = parse_field("marker,counter:gc.count").unwrap();
        assert!(field.is_counter);
        assert!(field.marker);
        assert_eq!(field.path, "gc.count");
    }

    #[test]
    fn test_unknown_option() {
        let err = parse_field("bogus:cpu.user").unwrap_err();
        assert_eq!(
            err,
            SpecError::UnknownOption {
                spec: "bogus:cpu.user".to_string(),
                option: "bogus".to_string(),
            }
        );
    }

    #[test]
    fn test_options_are_case_sensitive() {
        assert!(parse_field("Counter:cpu.user").is_err());
    }

    #[test]
    fn test_empty_path() {
        assert!(matches!(parse_field("counter:"), Err(SpecError::EmptyPath(_))));
        assert!(matches!(parse_field(""), Err(SpecError::EmptyPath(_))));
    }

    #[test]
    fn test_empty_option_rejected() {
        assert!(matches!(
            parse_field(":cpu.user"),
            Err(SpecError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_parse_specs_keeps_order() {
        let specs = parse_specs(&["a", "counter:b", "marker:c"]).unwrap();
        assert_eq!(specs.len(), 1);
        let ids: Vec<_> = specs[0].fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_id() {
        let err = parse_specs(&["cpu.user", "counter:cpu.user"]).unwrap_err();
        assert!(matches!(err, SpecError::DuplicateId { ref id, .. } if id == "cpu.user"));
    }

    #[test]
    fn test_error_names_offending_spec() {
        let err = parse_specs(&["ok", "nope:x"]).unwrap_err();
        assert!(err.to_string().contains("nope:x"));
    }
}
