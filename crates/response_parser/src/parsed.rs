use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Formats a capability response can be declared to arrive in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Xml,
    Text,
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseFormat::Json => write!(f, "json"),
            ResponseFormat::Xml => write!(f, "xml"),
            ResponseFormat::Text => write!(f, "text"),
        }
    }
}

/// The typed outcome of interpreting raw free-text output.
///
/// Every variant keeps the original raw text. `ParseError` is an outcome,
/// not a failure of the parser call itself — `parse` never errors toward the
/// caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Json {
        raw: String,
        value: Value,
    },
    Xml {
        raw: String,
        /// The extracted document text that was parsed.
        document: String,
        root_tag: String,
    },
    Text {
        raw: String,
    },
    ParseError {
        raw: String,
        /// The format the raw text failed to satisfy.
        expected: ResponseFormat,
        detail: String,
    },
}

impl ParsedResponse {
    /// The format this variant represents; for `ParseError` this is the
    /// format the text was expected to satisfy.
    pub fn format(&self) -> ResponseFormat {
        match self {
            ParsedResponse::Json { .. } => ResponseFormat::Json,
            ParsedResponse::Xml { .. } => ResponseFormat::Xml,
            ParsedResponse::Text { .. } => ResponseFormat::Text,
            ParsedResponse::ParseError { expected, .. } => *expected,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            ParsedResponse::Json { raw, .. }
            | ParsedResponse::Xml { raw, .. }
            | ParsedResponse::Text { raw }
            | ParsedResponse::ParseError { raw, .. } => raw,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, ParsedResponse::ParseError { .. })
    }

    /// The structured JSON value, when this is a `Json` variant.
    pub fn json_value(&self) -> Option<&Value> {
        match self {
            ParsedResponse::Json { value, .. } => Some(value),
            _ => None,
        }
    }
}
