//! Per-type property maps and the process-wide map cache.
//!
//! An [`ElementTypeMap`] is the ordered, name-unique property set of one
//! element type. Maps are a pure function of the type name, so they are
//! built once and shared: the cache below is the only process-wide state in
//! the crate. It is guarded by a single mutex during construction; entries
//! are immutable `Arc`s afterward and read without locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SchemaError;
use crate::schema::property::PropertySchema;

#[derive(Debug)]
pub struct ElementTypeMap {
    properties: Vec<Arc<PropertySchema>>,
    by_name: HashMap<String, usize>,
    key_indexes: Vec<usize>,
    default_collection: Option<usize>,
}

impl ElementTypeMap {
    pub(crate) fn build(
        type_name: &str,
        properties: Vec<PropertySchema>,
    ) -> Result<Arc<Self>, SchemaError> {
        let mut by_name = HashMap::with_capacity(properties.len());
        let mut key_indexes = Vec::new();
        let mut default_collection = None;
        let properties: Vec<Arc<PropertySchema>> =
            properties.into_iter().map(Arc::new).collect();

        for (idx, prop) in properties.iter().enumerate() {
            if by_name.insert(prop.name().to_string(), idx).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    type_name: type_name.to_string(),
                    property: prop.name().to_string(),
                });
            }
            if prop.is_key() {
                key_indexes.push(idx);
            }
            if prop.is_default_collection() {
                if default_collection.is_some() {
                    return Err(SchemaError::MultipleDefaultCollections {
                        type_name: type_name.to_string(),
                    });
                }
                default_collection = Some(idx);
            }
        }

        Ok(Arc::new(ElementTypeMap {
            properties,
            by_name,
            key_indexes,
            default_collection,
        }))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<PropertySchema>)> {
        self.properties.iter().enumerate()
    }

    pub fn get(&self, name: &str) -> Option<(usize, &Arc<PropertySchema>)> {
        self.by_name
            .get(name)
            .map(|&idx| (idx, &self.properties[idx]))
    }

    pub fn by_index(&self, idx: usize) -> &Arc<PropertySchema> {
        &self.properties[idx]
    }

    pub fn key_indexes(&self) -> &[usize] {
        &self.key_indexes
    }

    pub fn default_collection(&self) -> Option<usize> {
        self.default_collection
    }
}

static TYPE_MAP_CACHE: Mutex<BTreeMap<String, Arc<ElementTypeMap>>> =
    Mutex::new(BTreeMap::new());

/// Fetch the shared map for `type_name`, building it on first use.
///
/// The builder closure runs at most once per type name for the process
/// lifetime, under the cache mutex. Schema construction can be triggered
/// concurrently from multiple configuration chains; once built, an entry is
/// immutable and shared freely.
pub(crate) fn shared_type_map(
    type_name: &str,
    build: impl FnOnce() -> Result<Vec<PropertySchema>, SchemaError>,
) -> Result<Arc<ElementTypeMap>, SchemaError> {
    let mut cache = TYPE_MAP_CACHE.lock();
    if let Some(map) = cache.get(type_name) {
        return Ok(Arc::clone(map));
    }
    let map = ElementTypeMap::build(type_name, build()?)?;
    cache.insert(type_name.to_string(), Arc::clone(&map));
    Ok(map)
}
