//! Payload filtering by caller-supplied JSON Schema.

use crate::{Error, Result};

/// A compiled payload filter.
///
/// The predicate is caller-supplied and not indexable, so filtering runs
/// in process after a page is assembled; it never narrows candidate
/// selection.
pub struct SchemaFilter {
    validator: jsonschema::Validator,
}

impl SchemaFilter {
    /// Compile a JSON Schema into a filter.
    ///
    /// # Errors
    ///
    /// Returns `BadSchema` if the schema does not compile.
    pub fn compile(schema: &serde_json::Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| Error::BadSchema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Whether a payload satisfies the schema.
    #[must_use]
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        self.validator.is_valid(payload)
    }
}
