//! Error types for the layered configuration store.

use std::fmt;
use thiserror::Error;

/// Position of a construct inside a configuration stream.
///
/// Attached to every parse-time error so that misconfiguration is
/// diagnosable without a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    /// Stream identity (usually a file path).
    pub stream: String,
    /// 1-based line number.
    pub line: usize,
}

impl SourcePos {
    pub fn new(stream: impl Into<String>, line: usize) -> Self {
        SourcePos {
            stream: stream.into(),
            line,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stream, self.line)
    }
}

/// Schema construction errors.
///
/// These are raised while declaring property schemas and element types,
/// before any configuration file is touched. A failure here is a
/// programming error in the embedding application, not a configuration
/// problem.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("property '{property}': default value of type {found} is not assignable to {expected}")]
    DefaultTypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    #[error("property '{property}': default value rejected by validator: {reason}")]
    DefaultRejected { property: String, reason: String },

    #[error("property '{property}': validator cannot validate values of type {value_type}")]
    ValidatorMismatch {
        property: String,
        value_type: String,
    },

    #[error("property '{property}': key properties must be scalar")]
    ElementKeyProperty { property: String },

    #[error("element type '{type_name}': duplicate property '{property}'")]
    DuplicateProperty {
        type_name: String,
        property: String,
    },

    #[error("element type '{type_name}': more than one default-collection property")]
    MultipleDefaultCollections { type_name: String },

    #[error("element type '{type_name}': collection items of type '{item_type}' have no key properties and duplicates are not allowed")]
    KeylessCollection {
        type_name: String,
        item_type: String,
    },

    #[error("invalid validation pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Property value validation errors.
///
/// Raised at the point of assignment (or while deserializing) when a value
/// violates its property's validator. The message always carries the
/// human-readable constraint.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("property '{property}': value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        property: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("property '{property}': value {value} is out of range [{min}, {max}]")]
    FloatOutOfRange {
        property: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("property '{property}': string of length {len} violates length constraint {constraint}")]
    Length {
        property: String,
        len: usize,
        constraint: String,
    },

    #[error("property '{property}': value '{value}' does not match pattern '{pattern}'")]
    Pattern {
        property: String,
        value: String,
        pattern: String,
    },

    #[error("property '{property}': expected a value of type {expected}, got {found}")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    #[error("property '{property}': {message}")]
    Callback { property: String, message: String },
}

/// Errors raised while loading, mutating, or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed XML structure. Fatal for the stream being read.
    #[error("{pos}: {message}")]
    Format { message: String, pos: SourcePos },

    #[error("{pos}: unrecognized attribute '{name}'")]
    UnrecognizedAttribute { name: String, pos: SourcePos },

    #[error("{pos}: unrecognized element '{name}'")]
    UnrecognizedElement { name: String, pos: SourcePos },

    #[error("{pos}: '{name}' may only appear once")]
    DuplicateMember { name: String, pos: SourcePos },

    #[error("required property '{property}' of element '{element}' is missing")]
    RequiredPropertyMissing { property: String, element: String },

    #[error("section '{section}' cannot be defined here (allowed: {allowed})")]
    SectionPlacement { section: String, allowed: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cannot convert '{raw}' to a value of type {expected}")]
    Convert { raw: String, expected: String },

    #[error("element type '{type_name}' has no property named '{property}'")]
    UnknownProperty {
        type_name: String,
        property: String,
    },

    #[error("an item with key [{key}] already exists in the collection")]
    DuplicateKey { key: String },

    #[error("the item with key [{key}] was inherited from a parent configuration and cannot be removed")]
    InheritedItemRemoval { key: String },

    #[error("{what} is read-only")]
    ReadOnly { what: String },

    #[error("property '{property}' is locked by a parent configuration")]
    PropertyLocked { property: String },

    #[error("{pos}: element '{element}' is locked by a parent configuration")]
    ElementLocked { element: String, pos: SourcePos },

    #[error("{pos}: section '{name}' is already declared with a different type")]
    DuplicateSectionDeclaration { name: String, pos: SourcePos },

    #[error("{pos}: cannot remove undeclared section '{name}'")]
    UnknownSectionRemoval { name: String, pos: SourcePos },

    #[error("{pos}: section '{name}' is not declared")]
    UndeclaredSection { name: String, pos: SourcePos },

    #[error("section '{section}' redirects to '{config_source}' and may not carry inline content")]
    ConfigSourceConflict {
        section: String,
        config_source: String,
    },

    #[error("section '{section}' uses an unresolved type '{type_name}' and supports only raw access")]
    SectionTypeUnresolved {
        section: String,
        type_name: String,
    },

    #[error("failed to activate type '{type_name}': {message}")]
    TypeActivation { type_name: String, message: String },

    #[error("collection index {index} is out of bounds (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot serialize: {message}")]
    Serialize { message: String },

    #[error("{message}")]
    Open { message: String },

    /// A non-positioned error re-raised with the stream position where it
    /// surfaced during parsing.
    #[error("{pos}: {source}")]
    Positioned {
        pos: SourcePos,
        #[source]
        source: Box<ConfigError>,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Attach a stream position to an error that does not already carry one.
    pub fn at(self, pos: SourcePos) -> ConfigError {
        match self {
            ConfigError::Format { .. }
            | ConfigError::UnrecognizedAttribute { .. }
            | ConfigError::UnrecognizedElement { .. }
            | ConfigError::DuplicateMember { .. }
            | ConfigError::ElementLocked { .. }
            | ConfigError::DuplicateSectionDeclaration { .. }
            | ConfigError::UnknownSectionRemoval { .. }
            | ConfigError::UndeclaredSection { .. }
            | ConfigError::Positioned { .. } => self,
            other => ConfigError::Positioned {
                pos,
                source: Box::new(other),
            },
        }
    }
}
