//! Property Schema System
//!
//! Code-declared property schemas replace the original runtime attribute
//! inspection: each element type declares an ordered list of
//! [`PropertySchema`]s through a checked builder, and the resulting
//! [`ElementTypeMap`] is built once per type name and cached process-wide.

pub mod convert;
pub mod property;
pub mod type_map;
pub mod validator;

pub use convert::{converter_for, Converter};
pub use property::{PropertySchema, PropertySchemaBuilder};
pub use type_map::ElementTypeMap;
pub use validator::{AnyValue, Callback, FloatRange, IntRange, Pattern, TextLength, Validator};
