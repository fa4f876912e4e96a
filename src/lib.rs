//! Strata: Hierarchical, Override-Aware Configuration Store
//!
//! Strata loads typed configuration sections from layered XML documents
//! (machine, application, user, and path-scoped `<location>` overrides),
//! merges them under well-defined inheritance and collection-diff rules,
//! and serializes the effective or only-locally-modified configuration
//! back to XML without losing unknown or foreign content.

pub mod activation;
pub mod cli;
pub mod configuration;
pub mod declaration;
pub mod element;
pub mod error;
pub mod host;
pub mod logging;
pub mod schema;
pub mod sections;
pub mod value;
pub mod xml;

pub use activation::{CollectionShape, CollectionSpec, ElementType, TypeRegistry};
pub use configuration::Configuration;
pub use declaration::{AllowDefinition, AllowExeDefinition, ConfigLevel, SectionDecl};
pub use element::collection::CollectionKey;
pub use element::section::{Section, SectionHandle};
pub use element::{ConfigElement, SaveMode};
pub use error::{ConfigError, SchemaError, SourcePos, ValidationError};
pub use host::{ConfigHost, FileHost, LevelStream, MemoryHost};
pub use schema::PropertySchema;
pub use value::{Value, ValueType};
