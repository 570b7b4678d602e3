use std::collections::BTreeMap;

use crate::catalog::records::{CatalogMapping, EntityRecord};

/// (kind, code) -> (name, definition)
pub type EntityMap = BTreeMap<(String, String), (String, Option<String>)>;
/// (namespace, source, canonical) -> relation
pub type MappingMap = BTreeMap<(String, String, String), Option<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wanted {
    pub entities: EntityMap,
    pub mappings: MappingMap,
}

pub fn wanted_from_records(entities: &[EntityRecord], mappings: &[CatalogMapping]) -> Wanted {
    let entities = entities
        .iter()
        .map(|e| {
            (
                (e.kind.clone(), e.code.clone()),
                (e.name.clone(), e.definition.clone()),
            )
        })
        .collect();
    let mappings = mappings
        .iter()
        .map(|m| {
            (
                (
                    m.source_namespace.clone(),
                    m.source_code.clone(),
                    m.canonical_code.clone(),
                ),
                m.relation.clone(),
            )
        })
        .collect();
    Wanted { entities, mappings }
}
