//! JSON Schema validation of evidence content.

use serde_json::Value;

use super::error::{AppError, Result};

/// A compiled provider schema
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a JSON Schema document.
    ///
    /// Fails with [`AppError::Validation`] if the document is not a valid schema.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| AppError::Validation(format!("invalid JSON Schema: {}", e)))?;

        Ok(Self { validator })
    }

    /// Validate content, collecting every violation into one error message
    pub fn validate(&self, content: &Value) -> Result<()> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(content)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn succeed_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "succeed": { "type": "boolean" }
            },
            "required": ["succeed"]
        })
    }

    #[test]
    fn test_valid_content_passes() {
        let validator = SchemaValidator::compile(&succeed_schema()).unwrap();
        assert!(validator.validate(&json!({"succeed": true})).is_ok());
    }

    #[test]
    fn test_wrong_type_fails() {
        let validator = SchemaValidator::compile(&succeed_schema()).unwrap();
        let result = validator.validate(&json!({"succeed": "done"}));

        match result {
            Err(AppError::Validation(message)) => assert!(message.contains("boolean")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_fails() {
        let validator = SchemaValidator::compile(&succeed_schema()).unwrap();
        assert!(validator.validate(&json!({})).is_err());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let result = SchemaValidator::compile(&json!({"type": 12}));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
