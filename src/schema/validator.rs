//! Pluggable per-property value validators.
//!
//! A validator advertises which value types it can check (`can_validate`)
//! and rejects values with a [`ValidationError`] carrying the
//! human-readable constraint. Validators are attached to a
//! [`PropertySchema`](super::PropertySchema) at build time; the builder
//! verifies `can_validate` against the property's declared type so a
//! mismatched validator is a construction-time error.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{SchemaError, ValidationError};
use crate::value::{Value, ValueType};

pub trait Validator: Send + Sync {
    /// Whether this validator understands values of the given type.
    fn can_validate(&self, ty: &ValueType) -> bool;

    /// Validate one value of the named property.
    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError>;

    /// Human-readable constraint description, used in diagnostics.
    fn describe(&self) -> String;
}

impl fmt::Debug for dyn Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({})", self.describe())
    }
}

/// The default validator: accepts every value of every type.
pub struct AnyValue;

impl Validator for AnyValue {
    fn can_validate(&self, _ty: &ValueType) -> bool {
        true
    }

    fn validate(&self, _property: &str, _value: &Value) -> Result<(), ValidationError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "any value".to_string()
    }
}

/// Inclusive integer range.
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl IntRange {
    pub fn new(min: i64, max: i64) -> Self {
        IntRange { min, max }
    }
}

impl Validator for IntRange {
    fn can_validate(&self, ty: &ValueType) -> bool {
        *ty == ValueType::Int
    }

    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError> {
        let v = value.as_int().ok_or_else(|| ValidationError::TypeMismatch {
            property: property.to_string(),
            expected: "int".to_string(),
            found: value.value_type().to_string(),
        })?;
        if v < self.min || v > self.max {
            return Err(ValidationError::OutOfRange {
                property: property.to_string(),
                value: v,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("integer in [{}, {}]", self.min, self.max)
    }
}

/// Inclusive float range.
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    pub fn new(min: f64, max: f64) -> Self {
        FloatRange { min, max }
    }
}

impl Validator for FloatRange {
    fn can_validate(&self, ty: &ValueType) -> bool {
        *ty == ValueType::Float
    }

    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError> {
        let v = value
            .as_float()
            .ok_or_else(|| ValidationError::TypeMismatch {
                property: property.to_string(),
                expected: "float".to_string(),
                found: value.value_type().to_string(),
            })?;
        if v < self.min || v > self.max {
            return Err(ValidationError::FloatOutOfRange {
                property: property.to_string(),
                value: v,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("float in [{}, {}]", self.min, self.max)
    }
}

/// String length constraint. `max == None` means unbounded above.
pub struct TextLength {
    pub min: usize,
    pub max: Option<usize>,
}

impl TextLength {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        TextLength { min, max }
    }

    pub fn non_empty() -> Self {
        TextLength { min: 1, max: None }
    }

    fn constraint(&self) -> String {
        match self.max {
            Some(max) => format!("[{}, {}]", self.min, max),
            None => format!("[{}, ∞)", self.min),
        }
    }
}

impl Validator for TextLength {
    fn can_validate(&self, ty: &ValueType) -> bool {
        *ty == ValueType::Text
    }

    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError> {
        let s = value.as_text().ok_or_else(|| ValidationError::TypeMismatch {
            property: property.to_string(),
            expected: "text".to_string(),
            found: value.value_type().to_string(),
        })?;
        let len = s.chars().count();
        if len < self.min || self.max.is_some_and(|max| len > max) {
            return Err(ValidationError::Length {
                property: property.to_string(),
                len,
                constraint: self.constraint(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("string length in {}", self.constraint())
    }
}

/// Regular-expression constraint on text values.
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, SchemaError> {
        let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Pattern { regex })
    }
}

impl Validator for Pattern {
    fn can_validate(&self, ty: &ValueType) -> bool {
        *ty == ValueType::Text
    }

    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError> {
        let s = value.as_text().ok_or_else(|| ValidationError::TypeMismatch {
            property: property.to_string(),
            expected: "text".to_string(),
            found: value.value_type().to_string(),
        })?;
        if !self.regex.is_match(s) {
            return Err(ValidationError::Pattern {
                property: property.to_string(),
                value: s.to_string(),
                pattern: self.regex.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("matches /{}/", self.regex.as_str())
    }
}

/// Arbitrary caller-supplied validation callback.
pub struct Callback {
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
    description: String,
}

impl Callback {
    pub fn new(
        description: impl Into<String>,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Callback {
            check: Arc::new(check),
            description: description.into(),
        }
    }
}

impl Validator for Callback {
    fn can_validate(&self, _ty: &ValueType) -> bool {
        true
    }

    fn validate(&self, property: &str, value: &Value) -> Result<(), ValidationError> {
        (self.check)(value).map_err(|message| ValidationError::Callback {
            property: property.to_string(),
            message,
        })
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
