use serde_json::Value;
use thiserror::Error;

use crate::parsed::{ParsedResponse, ResponseFormat};
use crate::parser::scan_xml_document;
use crate::schema::ResponseSchema;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing field `{path}`")]
    MissingField { path: String },

    #[error("type mismatch at `{path}`: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("xml response is not well-formed: {0}")]
    XmlSyntax(String),

    #[error("root tag mismatch: expected `{expected}`, got `{actual}`")]
    RootTagMismatch { expected: String, actual: String },
}

/// Shape-check a parsed response against a schema example.
///
/// Returns `None` when there is nothing to check: the schema format does not
/// match the parsed variant's validation intent, the example is blank, or
/// the example itself fails to parse (a malformed schema is not the caller's
/// fault and must never block the response).
pub fn validate(parsed: &ParsedResponse, schema: &ResponseSchema) -> Option<ValidationError> {
    if schema.is_blank() {
        return None;
    }

    match (schema.format, parsed) {
        (ResponseFormat::Json, ParsedResponse::Json { value, .. }) => {
            let template = match serde_json::from_str::<Value>(&schema.definition) {
                Ok(template) => template,
                Err(error) => {
                    log::debug!("skipping validation, schema example is not valid json: {}", error);
                    return None;
                }
            };
            check_json_template(&template, value, "$")
        }
        (ResponseFormat::Xml, ParsedResponse::Xml { root_tag, .. }) => {
            let expected_root = match scan_xml_document(&schema.definition) {
                Ok(root) => root,
                Err(error) => {
                    log::debug!("skipping validation, schema example is not valid xml: {}", error);
                    return None;
                }
            };
            if &expected_root != root_tag {
                return Some(ValidationError::RootTagMismatch {
                    expected: expected_root,
                    actual: root_tag.clone(),
                });
            }
            None
        }
        // An XML schema requires the document to at least parse.
        (
            ResponseFormat::Xml,
            ParsedResponse::ParseError {
                expected: ResponseFormat::Xml,
                detail,
                ..
            },
        ) => Some(ValidationError::XmlSyntax(detail.clone())),
        _ => None,
    }
}

/// Depth-first walk of the schema example. Every key in a template object
/// must exist at the same path in the actual value; matching primitive
/// leaves must agree on type class. Arrays and heterogeneous nesting stay
/// unchecked — the policy is to under-validate rather than reject ambiguous
/// shapes.
fn check_json_template(template: &Value, actual: &Value, path: &str) -> Option<ValidationError> {
    match template {
        Value::Object(expected_fields) => {
            let actual_fields = match actual.as_object() {
                Some(fields) => fields,
                None => {
                    return Some(ValidationError::TypeMismatch {
                        path: path.to_string(),
                        expected: "object".to_string(),
                        actual: type_class(actual).to_string(),
                    })
                }
            };

            for (key, expected_value) in expected_fields {
                let child_path = format!("{}.{}", path, key);
                match actual_fields.get(key) {
                    None => {
                        return Some(ValidationError::MissingField { path: child_path });
                    }
                    Some(actual_value) => {
                        if let Some(error) =
                            check_json_template(expected_value, actual_value, &child_path)
                        {
                            return Some(error);
                        }
                    }
                }
            }
            None
        }
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            let expected = type_class(template);
            let found = type_class(actual);
            if expected != found {
                return Some(ValidationError::TypeMismatch {
                    path: path.to_string(),
                    expected: expected.to_string(),
                    actual: found.to_string(),
                });
            }
            None
        }
        Value::Array(_) | Value::Null => None,
    }
}

fn type_class(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    use super::*;

    fn parse_json(raw: &str) -> ParsedResponse {
        parse(raw, ResponseFormat::Json)
    }

    #[test]
    fn blank_schema_never_errors() {
        let parsed = parse_json(r#"{"anything": true}"#);
        let schema = ResponseSchema::new(ResponseFormat::Json, "   ");

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn format_mismatch_skips_validation() {
        let parsed = parse("free text", ResponseFormat::Text);
        let schema = ResponseSchema::new(ResponseFormat::Json, r#"{"a": "x"}"#);

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn type_mismatch_names_path_and_classes() {
        let parsed = parse_json(r#"{"a": 1}"#);
        let schema = ResponseSchema::new(ResponseFormat::Json, r#"{"a": "x"}"#);

        assert_eq!(
            validate(&parsed, &schema),
            Some(ValidationError::TypeMismatch {
                path: "$.a".to_string(),
                expected: "string".to_string(),
                actual: "number".to_string(),
            })
        );
    }

    #[test]
    fn missing_field_names_full_path() {
        let parsed = parse_json(r#"{"a": "z"}"#);
        let schema = ResponseSchema::new(ResponseFormat::Json, r#"{"a": "x", "b": "y"}"#);

        assert_eq!(
            validate(&parsed, &schema),
            Some(ValidationError::MissingField {
                path: "$.b".to_string()
            })
        );
    }

    #[test]
    fn nested_missing_field_uses_dotted_path() {
        let parsed = parse_json(r#"{"outer": {"present": 1}}"#);
        let schema = ResponseSchema::new(
            ResponseFormat::Json,
            r#"{"outer": {"present": 1, "absent": "x"}}"#,
        );

        assert_eq!(
            validate(&parsed, &schema),
            Some(ValidationError::MissingField {
                path: "$.outer.absent".to_string()
            })
        );
    }

    #[test]
    fn arrays_are_not_descended_into() {
        let parsed = parse_json(r#"{"items": [1, "mixed", {"x": true}]}"#);
        let schema = ResponseSchema::new(ResponseFormat::Json, r#"{"items": [{"y": "str"}]}"#);

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn matching_shape_passes() {
        let parsed = parse_json(r#"{"severity": "high", "count": 4, "confirmed": true}"#);
        let schema = ResponseSchema::new(
            ResponseFormat::Json,
            r#"{"severity": "low", "count": 0, "confirmed": false}"#,
        );

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn malformed_schema_example_is_skipped() {
        let parsed = parse_json(r#"{"a": 1}"#);
        let schema = ResponseSchema::new(ResponseFormat::Json, "{not valid json");

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn xml_root_tag_mismatch() {
        let parsed = parse("<response><a>hi</a></response>", ResponseFormat::Xml);
        let schema = ResponseSchema::new(ResponseFormat::Xml, "<other/>");

        assert_eq!(
            validate(&parsed, &schema),
            Some(ValidationError::RootTagMismatch {
                expected: "other".to_string(),
                actual: "response".to_string(),
            })
        );
    }

    #[test]
    fn xml_matching_root_passes() {
        let parsed = parse("<report><finding/></report>", ResponseFormat::Xml);
        let schema = ResponseSchema::new(ResponseFormat::Xml, "<report><finding/></report>");

        assert_eq!(validate(&parsed, &schema), None);
    }

    #[test]
    fn unparseable_xml_response_is_a_syntax_error() {
        let parsed = parse("<broken>", ResponseFormat::Xml);
        let schema = ResponseSchema::new(ResponseFormat::Xml, "<broken/>");

        assert!(matches!(
            validate(&parsed, &schema),
            Some(ValidationError::XmlSyntax(_))
        ));
    }

    #[test]
    fn malformed_xml_schema_is_skipped() {
        let parsed = parse("<response/>", ResponseFormat::Xml);
        let schema = ResponseSchema::new(ResponseFormat::Xml, "<not closed");

        assert_eq!(validate(&parsed, &schema), None);
    }
}
