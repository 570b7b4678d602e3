use std::{collections::BTreeSet, fmt};

use crate::catalog::sync::{
    read::Current,
    want::{EntityMap, MappingMap, Wanted},
};

/// What needs to change to make DB == input records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// New or changed entities: (kind, code) -> (name, definition).
    pub entities_upsert: EntityMap,
    /// New or changed mappings: (namespace, source, canonical) -> relation.
    pub mappings_upsert: MappingMap,
    /// Entities to delete (prune only).
    pub entities_delete: BTreeSet<(String, String)>,
    /// Mappings to delete (prune only).
    pub mappings_delete: BTreeSet<(String, String, String)>,
}

impl CatalogDiff {
    /// True if there is nothing to upsert or delete.
    pub fn is_noop(&self) -> bool {
        self.entities_upsert.is_empty()
            && self.mappings_upsert.is_empty()
            && self.entities_delete.is_empty()
            && self.mappings_delete.is_empty()
    }
}

impl fmt::Display for CatalogDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // helper: section header with underline
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            for _ in 0..title.len() {
                write!(f, "-")?;
            }
            writeln!(f)?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        if !self.entities_upsert.is_empty() {
            section("Entities (UPSERT)", &mut |f| {
                for ((kind, code), (name, _)) in &self.entities_upsert {
                    writeln!(f, "+ {kind}/{code}  \"{name}\"")?;
                }
                Ok(())
            })?;
        }
        if !self.mappings_upsert.is_empty() {
            section("Mappings (UPSERT)", &mut |f| {
                for ((ns, source, canonical), relation) in &self.mappings_upsert {
                    match relation {
                        Some(rel) => writeln!(f, "+ {ns}:{source} → {canonical}  [{rel}]")?,
                        None => writeln!(f, "+ {ns}:{source} → {canonical}")?,
                    }
                }
                Ok(())
            })?;
        }

        if !self.mappings_delete.is_empty() {
            section("Mappings (DELETE)", &mut |f| {
                for (ns, source, canonical) in &self.mappings_delete {
                    writeln!(f, "- {ns}:{source} → {canonical}")?;
                }
                Ok(())
            })?;
        }
        if !self.entities_delete.is_empty() {
            section("Entities (DELETE)", &mut |f| {
                for (kind, code) in &self.entities_delete {
                    writeln!(f, "- {kind}/{code}")?;
                }
                Ok(())
            })?;
        }

        if !wrote_any {
            write!(f, "No changes")
        } else {
            Ok(())
        }
    }
}

pub fn make_diff(w: &Wanted, c: &Current, prune: bool) -> CatalogDiff {
    let mut d = CatalogDiff {
        entities_upsert: w
            .entities
            .iter()
            .filter(|(k, v)| c.entities.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        mappings_upsert: w
            .mappings
            .iter()
            .filter(|(k, v)| c.mappings.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        ..Default::default()
    };

    // prunes (only when requested)
    if prune {
        for k in c.entities.keys() {
            if !w.entities.contains_key(k) {
                d.entities_delete.insert(k.clone());
            }
        }
        for k in c.mappings.keys() {
            if !w.mappings.contains_key(k) {
                d.mappings_delete.insert(k.clone());
            }
        }
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn key2(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    fn key3(a: &str, b: &str, c: &str) -> (String, String, String) {
        (a.to_string(), b.to_string(), c.to_string())
    }

    fn wanted_min() -> Wanted {
        Wanted {
            entities: BTreeMap::from([
                (key2("disease", "558"), ("Marfan syndrome".to_string(), None)),
                (key2("phenotype", "0001166"), ("Arachnodactyly".to_string(), None)),
            ]),
            mappings: BTreeMap::from([
                (key3("OMIM", "154700", "558"), Some("E".to_string())),
                (key3("MONDO", "0007947", "558"), None),
            ]),
        }
    }

    fn current_empty() -> Current {
        Current {
            entities: BTreeMap::new(),
            mappings: BTreeMap::new(),
        }
    }

    #[test]
    fn display_no_changes() {
        let d = make_diff(&Wanted::default(), &current_empty(), false);
        assert_eq!(d.to_string(), "No changes");
    }

    #[test]
    fn display_upserts_expected() {
        let d = make_diff(&wanted_min(), &current_empty(), false);
        let expected = "\
Entities (UPSERT)
-----------------
+ disease/558  \"Marfan syndrome\"
+ phenotype/0001166  \"Arachnodactyly\"

Mappings (UPSERT)
-----------------
+ MONDO:0007947 → 558
+ OMIM:154700 → 558  [E]
";
        assert_eq!(d.to_string(), expected, "pretty diff did not match");
    }

    #[test]
    fn unchanged_rows_are_not_upserted() {
        let w = wanted_min();
        let mut c = Current {
            entities: w.entities.clone(),
            mappings: w.mappings.clone(),
        };
        assert!(make_diff(&w, &c, true).is_noop());

        // a renamed entity and a changed relation show up; nothing else does
        c.entities.insert(key2("disease", "558"), ("Marfan".to_string(), None));
        c.mappings.insert(key3("OMIM", "154700", "558"), None);
        let d = make_diff(&w, &c, false);
        assert_eq!(d.entities_upsert.len(), 1);
        assert_eq!(d.mappings_upsert.len(), 1);
    }

    #[test]
    fn prune_lists_extra_rows() {
        let w = wanted_min();
        let mut c = Current {
            entities: w.entities.clone(),
            mappings: w.mappings.clone(),
        };
        c.entities.insert(key2("disease", "999"), ("Gone".to_string(), None));
        c.mappings.insert(key3("OMIM", "1", "999"), None);

        assert!(make_diff(&w, &c, false).is_noop());
        let d = make_diff(&w, &c, true);
        assert_eq!(d.entities_delete, BTreeSet::from([key2("disease", "999")]));
        assert_eq!(d.mappings_delete, BTreeSet::from([key3("OMIM", "1", "999")]));
        assert!(d.to_string().contains("Mappings (DELETE)\n-----------------\n- OMIM:1 → 999\n"));
    }
}
