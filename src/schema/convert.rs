//! String⇄value converters.
//!
//! XML attributes are strings; converters turn them into typed [`Value`]s
//! and back. Every scalar [`ValueType`] has a default converter; a property
//! may override it with a custom one (e.g. to accept "on"/"off" booleans).

use std::sync::Arc;

use crate::error::ConfigError;
use crate::value::{Value, ValueType};

pub trait Converter: Send + Sync {
    /// Parse the raw attribute text into a value.
    fn parse(&self, raw: &str) -> Result<Value, ConfigError>;

    /// Format a value as attribute text. The inverse of `parse` for every
    /// value the converter produces.
    fn format(&self, value: &Value) -> String;
}

struct BoolConverter;

impl Converter for BoolConverter {
    fn parse(&self, raw: &str) -> Result<Value, ConfigError> {
        match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ConfigError::Convert {
                raw: raw.to_string(),
                expected: "bool".to_string(),
            }),
        }
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

struct IntConverter;

impl Converter for IntConverter {
    fn parse(&self, raw: &str) -> Result<Value, ConfigError> {
        raw.trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ConfigError::Convert {
                raw: raw.to_string(),
                expected: "int".to_string(),
            })
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

struct FloatConverter;

impl Converter for FloatConverter {
    fn parse(&self, raw: &str) -> Result<Value, ConfigError> {
        raw.trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ConfigError::Convert {
                raw: raw.to_string(),
                expected: "float".to_string(),
            })
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

struct TextConverter;

impl Converter for TextConverter {
    fn parse(&self, raw: &str) -> Result<Value, ConfigError> {
        Ok(Value::Text(raw.to_string()))
    }

    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

/// The default converter for a scalar value type.
///
/// Element-typed properties are serialized structurally and never go
/// through a converter; asking for one is a caller bug, so this returns the
/// text converter which will fail the type check downstream.
pub fn converter_for(ty: &ValueType) -> Arc<dyn Converter> {
    match ty {
        ValueType::Bool => Arc::new(BoolConverter),
        ValueType::Int => Arc::new(IntConverter),
        ValueType::Float => Arc::new(FloatConverter),
        ValueType::Text | ValueType::Element(_) => Arc::new(TextConverter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_strict() {
        let c = converter_for(&ValueType::Bool);
        assert_eq!(c.parse("true").unwrap(), Value::Bool(true));
        assert_eq!(c.parse("false").unwrap(), Value::Bool(false));
        assert!(c.parse("True").is_err());
        assert!(c.parse("1").is_err());
    }

    #[test]
    fn int_trims_whitespace() {
        let c = converter_for(&ValueType::Int);
        assert_eq!(c.parse(" 42 ").unwrap(), Value::Int(42));
        assert!(c.parse("forty-two").is_err());
    }

    #[test]
    fn round_trips_through_format() {
        let c = converter_for(&ValueType::Int);
        let v = c.parse("1234").unwrap();
        assert_eq!(c.parse(&c.format(&v)).unwrap(), v);
    }
}
