/**
 * Declarative Payload Schemas
 *
 * This module validates request payloads against per-operation field
 * schemas declared as static data: which fields exist, whether they are
 * required, their primitive type, string length and numeric bounds, and
 * interdependencies ("new_password requires old_password").
 *
 * # Completeness
 *
 * Validation never stops at the first problem; every violated field
 * contributes its own message to the resulting error list, so a client can
 * show all form errors at once.
 */
use serde_json::Value;

use crate::shared::envelope::FieldError;

/// Primitive type a field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON string
    Text,
    /// JSON integer
    Integer,
    /// JSON boolean
    Boolean,
}

/// Declarative description of one payload field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name in the payload object
    pub name: &'static str,
    /// Expected primitive type
    pub kind: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Minimum string length
    pub min_len: Option<usize>,
    /// Maximum string length
    pub max_len: Option<usize>,
    /// Minimum numeric value
    pub min: Option<i64>,
    /// Maximum numeric value
    pub max: Option<i64>,
    /// Another field that must be present whenever this one is
    pub requires: Option<&'static str>,
}

impl FieldSpec {
    /// A required field of the given type
    pub const fn required(name: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            kind,
            required: true,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
            requires: None,
        }
    }

    /// An optional field of the given type
    pub const fn optional(name: &'static str, kind: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Constrain string length
    pub const fn length(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = Some(min_len);
        self.max_len = Some(max_len);
        self
    }

    /// Constrain maximum string length only
    pub const fn max_length(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Constrain numeric range
    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Constrain minimum numeric value only
    pub const fn at_least(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    /// Declare a dependency on another field
    pub const fn requires(mut self, other: &'static str) -> Self {
        self.requires = Some(other);
        self
    }
}

/// A complete payload schema for one operation
#[derive(Debug, Clone, Copy)]
pub struct MessageSchema {
    /// The known fields; anything else in the payload is rejected
    pub fields: &'static [FieldSpec],
}

impl MessageSchema {
    /// Build a schema over a static field list
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    /// Validate a payload, collecting every violation
    pub fn validate(&self, data: &Value) -> Result<(), ErrorList> {
        let mut errors = ErrorList::new();

        let map = match data.as_object() {
            Some(map) => map,
            None => {
                errors.add_general("Payload must be an object");
                return Err(errors);
            }
        };

        for spec in self.fields {
            let value = map.get(spec.name).filter(|v| !v.is_null());
            match value {
                None => {
                    if spec.required {
                        errors.add(spec.name, "Required field");
                    }
                }
                Some(value) => {
                    self.check_value(spec, value, &mut errors);
                    if let Some(other) = spec.requires {
                        if map.get(other).filter(|v| !v.is_null()).is_none() {
                            errors.add(spec.name, format!("Requires field '{}'", other));
                        }
                    }
                }
            }
        }

        // Unknown fields are rejected rather than silently dropped
        for name in map.keys() {
            if !self.fields.iter().any(|spec| spec.name == name) {
                errors.add(name.clone(), "Unknown field");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_value(&self, spec: &FieldSpec, value: &Value, errors: &mut ErrorList) {
        match spec.kind {
            FieldType::Text => match value.as_str() {
                None => errors.add(spec.name, "Must be a string"),
                Some(text) => {
                    let length = text.chars().count();
                    match (spec.min_len, spec.max_len) {
                        (Some(min), Some(max)) if length < min || length > max => errors.add(
                            spec.name,
                            format!("Must be between {} and {} characters long", min, max),
                        ),
                        (Some(min), None) if length < min => errors.add(
                            spec.name,
                            format!("Must be at least {} characters long", min),
                        ),
                        (None, Some(max)) if length > max => errors.add(
                            spec.name,
                            format!("Must be at maximum {} characters long", max),
                        ),
                        _ => {}
                    }
                }
            },
            FieldType::Integer => match value.as_i64() {
                None => errors.add(spec.name, "Must be an integer"),
                Some(number) => {
                    if let Some(min) = spec.min {
                        if number < min {
                            errors.add(spec.name, format!("Must be at least {}", min));
                        }
                    }
                    if let Some(max) = spec.max {
                        if number > max {
                            errors.add(spec.name, format!("Must be at most {}", max));
                        }
                    }
                }
            },
            FieldType::Boolean => {
                if value.as_bool().is_none() {
                    errors.add(spec.name, "Must be a boolean");
                }
            }
        }
    }
}

/// Accumulator for field validation messages
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    errors: Vec<FieldError>,
}

impl ErrorList {
    /// An empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field-tagged message
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::field(field, message));
    }

    /// Add a message not tied to any field
    pub fn add_general(&mut self, message: impl Into<String>) {
        self.errors.push(FieldError::general(message));
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the list into its messages
    pub fn into_messages(self) -> Vec<FieldError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LOGIN: MessageSchema = MessageSchema::new(&[
        FieldSpec::required("username", FieldType::Text),
        FieldSpec::required("password", FieldType::Text),
    ]);

    const PROFILE: MessageSchema = MessageSchema::new(&[
        FieldSpec::required("nickname", FieldType::Text).length(2, 32),
        FieldSpec::optional("old_password", FieldType::Text),
        FieldSpec::optional("new_password", FieldType::Text).requires("old_password"),
    ]);

    const PAGING: MessageSchema = MessageSchema::new(&[
        FieldSpec::required("board", FieldType::Integer).at_least(1),
        FieldSpec::optional("start", FieldType::Integer).at_least(0),
        FieldSpec::optional("count", FieldType::Integer).range(1, 100),
    ]);

    #[test]
    fn test_valid_payload_passes() {
        let data = json!({"username": "erika", "password": "hunter22"});
        assert!(LOGIN.validate(&data).is_ok());
    }

    #[test]
    fn test_two_missing_fields_yield_two_messages() {
        let errors = LOGIN.validate(&json!({})).unwrap_err().into_messages();
        assert_eq!(errors.len(), 2);
        let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
        assert!(fields.contains(&"username"));
        assert!(fields.contains(&"password"));
        assert!(errors.iter().all(|e| e.message == "Required field"));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let errors = LOGIN
            .validate(&json!({"username": 5, "password": "x"}))
            .unwrap_err()
            .into_messages();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("username"));
        assert_eq!(errors[0].message, "Must be a string");
    }

    #[test]
    fn test_dependency_is_enforced() {
        let errors = PROFILE
            .validate(&json!({"nickname": "Erika", "new_password": "secret123"}))
            .unwrap_err()
            .into_messages();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("new_password"));
        assert_eq!(errors[0].message, "Requires field 'old_password'");
    }

    #[test]
    fn test_dependency_satisfied_passes() {
        let data = json!({
            "nickname": "Erika",
            "old_password": "hunter22",
            "new_password": "secret123"
        });
        assert!(PROFILE.validate(&data).is_ok());
    }

    #[test]
    fn test_string_length_bounds() {
        let errors = PROFILE
            .validate(&json!({"nickname": "E"}))
            .unwrap_err()
            .into_messages();
        assert_eq!(
            errors[0].message,
            "Must be between 2 and 32 characters long"
        );
    }

    #[test]
    fn test_numeric_bounds() {
        let errors = PAGING
            .validate(&json!({"board": 0, "count": 500}))
            .unwrap_err()
            .into_messages();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("board") && e.message == "Must be at least 1"));
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("count") && e.message == "Must be at most 100"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let errors = LOGIN
            .validate(&json!({"username": "e", "password": "p", "extra": 1}))
            .unwrap_err()
            .into_messages();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("extra"));
        assert_eq!(errors[0].message, "Unknown field");
    }

    #[test]
    fn test_null_counts_as_absent() {
        let data = json!({"username": "erika", "password": null});
        let errors = LOGIN.validate(&data).unwrap_err().into_messages();
        assert_eq!(errors[0].field.as_deref(), Some("password"));
        assert_eq!(errors[0].message, "Required field");
    }

    #[test]
    fn test_non_object_payload() {
        let errors = LOGIN.validate(&json!([1, 2])).unwrap_err().into_messages();
        assert_eq!(errors[0].field, None);
    }
}
