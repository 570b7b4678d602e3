use diesel::prelude::*;

use crate::catalog::sync::want::{EntityMap, MappingMap};

pub struct Current {
    pub entities: EntityMap,
    pub mappings: MappingMap,
}

pub fn read_current(conn: &mut SqliteConnection) -> anyhow::Result<Current> {
    use crate::schema::{entity, xref_mapping};

    let entities = entity::table
        .select((entity::kind, entity::code, entity::name, entity::definition))
        .load::<(String, String, String, Option<String>)>(conn)?
        .into_iter()
        .map(|(k, c, n, d)| ((k, c), (n, d)))
        .collect();

    let mappings = xref_mapping::table
        .select((
            xref_mapping::source_namespace,
            xref_mapping::source_code,
            xref_mapping::canonical_code,
            xref_mapping::relation,
        ))
        .load::<(String, String, String, Option<String>)>(conn)?
        .into_iter()
        .map(|(ns, s, c, r)| ((ns, s, c), r))
        .collect();

    Ok(Current { entities, mappings })
}
