use serde::{Deserialize, Serialize};

use crate::parsed::ResponseFormat;

/// Declares the shape a capability response is expected to have.
///
/// `definition` is an example instance of the expected structure — not a
/// formal schema language. It drives structural shape-checking only: key
/// presence and primitive type classes for JSON, the root tag for XML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseSchema {
    pub format: ResponseFormat,
    pub definition: String,
}

impl ResponseSchema {
    pub fn new(format: ResponseFormat, definition: impl Into<String>) -> Self {
        Self {
            format,
            definition: definition.into(),
        }
    }

    /// A blank definition means there is nothing to check against.
    pub fn is_blank(&self) -> bool {
        self.definition.trim().is_empty()
    }
}
