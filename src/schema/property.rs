//! Property schema declaration.
//!
//! A [`PropertySchema`] describes one named, typed property of an element:
//! its default value, required/key flags, validator, and string conversion.
//! Schemas are built through [`PropertySchemaBuilder`], which performs all
//! consistency checks at construction time: an unassignable default or a
//! mismatched validator never survives into a running store.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, SchemaError};
use crate::schema::convert::{converter_for, Converter};
use crate::schema::validator::{AnyValue, Validator};
use crate::value::{Value, ValueType};

pub struct PropertySchema {
    name: String,
    value_type: ValueType,
    default: Option<Value>,
    is_key: bool,
    is_required: bool,
    is_default_collection: bool,
    validator: Arc<dyn Validator>,
    converter: Arc<dyn Converter>,
}

impl fmt::Debug for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySchema")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("default", &self.default)
            .field("is_key", &self.is_key)
            .field("is_required", &self.is_required)
            .finish()
    }
}

impl PropertySchema {
    /// Start declaring a property of an explicit type.
    pub fn builder(name: impl Into<String>, value_type: ValueType) -> PropertySchemaBuilder {
        PropertySchemaBuilder {
            name: name.into(),
            value_type,
            default: None,
            is_key: false,
            is_required: false,
            is_default_collection: false,
            validator: None,
            converter: None,
        }
    }

    pub fn text(name: impl Into<String>) -> PropertySchemaBuilder {
        Self::builder(name, ValueType::Text)
    }

    pub fn int(name: impl Into<String>) -> PropertySchemaBuilder {
        Self::builder(name, ValueType::Int)
    }

    pub fn bool(name: impl Into<String>) -> PropertySchemaBuilder {
        Self::builder(name, ValueType::Bool)
    }

    pub fn float(name: impl Into<String>) -> PropertySchemaBuilder {
        Self::builder(name, ValueType::Float)
    }

    /// An element-typed property holding a child element of the named
    /// registered element type.
    pub fn element(name: impl Into<String>, element_type: impl Into<String>) -> PropertySchemaBuilder {
        Self::builder(name, ValueType::Element(element_type.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// The registered element type name of a child element property.
    pub fn element_type(&self) -> Option<&str> {
        match &self.value_type {
            ValueType::Element(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        !self.value_type.is_scalar()
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    pub fn is_default_collection(&self) -> bool {
        self.is_default_collection
    }

    pub fn validator(&self) -> &Arc<dyn Validator> {
        &self.validator
    }

    /// The default value read when the property is absent from an element's
    /// value table. Scalar properties always have one.
    pub fn default_value(&self) -> Value {
        match &self.default {
            Some(v) => v.clone(),
            None => match &self.value_type {
                ValueType::Bool => Value::Bool(false),
                ValueType::Int => Value::Int(0),
                ValueType::Float => Value::Float(0.0),
                ValueType::Text => Value::Text(String::new()),
                // Child elements are materialized by the owning element,
                // never read out of the schema.
                ValueType::Element(_) => Value::Text(String::new()),
            },
        }
    }

    /// Parse and validate one attribute value.
    pub(crate) fn parse(&self, raw: &str) -> Result<Value, ConfigError> {
        let value = self.converter.parse(raw)?;
        if !value.matches(&self.value_type) {
            return Err(ConfigError::Convert {
                raw: raw.to_string(),
                expected: self.value_type.to_string(),
            });
        }
        self.validator.validate(&self.name, &value)?;
        Ok(value)
    }

    /// Format a value for serialization as an attribute.
    pub(crate) fn format(&self, value: &Value) -> String {
        self.converter.format(value)
    }

    /// Check a programmatic assignment: type, then validator.
    pub(crate) fn check_assignment(&self, value: &Value) -> Result<(), ConfigError> {
        if !value.matches(&self.value_type) {
            return Err(crate::error::ValidationError::TypeMismatch {
                property: self.name.clone(),
                expected: self.value_type.to_string(),
                found: value.value_type().to_string(),
            }
            .into());
        }
        self.validator.validate(&self.name, value)?;
        Ok(())
    }
}

pub struct PropertySchemaBuilder {
    name: String,
    value_type: ValueType,
    default: Option<Value>,
    is_key: bool,
    is_required: bool,
    is_default_collection: bool,
    validator: Option<Arc<dyn Validator>>,
    converter: Option<Arc<dyn Converter>>,
}

impl PropertySchemaBuilder {
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Mark the property as part of its element's collection key.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Mark an element-typed property as the element's default collection:
    /// unrecognized child elements are routed into it.
    pub fn default_collection(mut self) -> Self {
        self.is_default_collection = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Finish the declaration, running every construction-time check.
    pub fn build(self) -> Result<PropertySchema, SchemaError> {
        let validator: Arc<dyn Validator> = self.validator.unwrap_or_else(|| Arc::new(AnyValue));
        let converter = self.converter.unwrap_or_else(|| converter_for(&self.value_type));

        if self.is_key && !self.value_type.is_scalar() {
            return Err(SchemaError::ElementKeyProperty {
                property: self.name,
            });
        }
        if !validator.can_validate(&self.value_type) {
            return Err(SchemaError::ValidatorMismatch {
                property: self.name,
                value_type: self.value_type.to_string(),
            });
        }

        // An explicit default must be assignable to the declared type;
        // text defaults for non-text types are converted here, once.
        let default = match self.default {
            Some(v) if v.matches(&self.value_type) => Some(v),
            Some(Value::Text(raw)) => {
                let converted = converter.parse(&raw).map_err(|_| {
                    SchemaError::DefaultTypeMismatch {
                        property: self.name.clone(),
                        expected: self.value_type.to_string(),
                        found: "text".to_string(),
                    }
                })?;
                if !converted.matches(&self.value_type) {
                    return Err(SchemaError::DefaultTypeMismatch {
                        property: self.name,
                        expected: self.value_type.to_string(),
                        found: converted.value_type().to_string(),
                    });
                }
                Some(converted)
            }
            Some(v) => {
                return Err(SchemaError::DefaultTypeMismatch {
                    property: self.name,
                    expected: self.value_type.to_string(),
                    found: v.value_type().to_string(),
                });
            }
            None => None,
        };

        if let Some(ref v) = default {
            validator
                .validate(&self.name, v)
                .map_err(|e| SchemaError::DefaultRejected {
                    property: self.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(PropertySchema {
            name: self.name,
            value_type: self.value_type,
            default,
            is_key: self.is_key,
            is_required: self.is_required,
            is_default_collection: self.is_default_collection,
            validator,
            converter,
        })
    }
}
