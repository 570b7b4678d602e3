//! upsert / delete / read statements for the reference tables
use diesel::prelude::*;
use diesel::{ExpressionMethods, RunQueryDsl, SqliteConnection, insert_into};

use crate::models::{NewEntity, NewXrefMapping, XrefMappingRow};
use crate::resolver::MappingRecord;
use crate::schema::{entity, xref_mapping as xm};

/// upsert entity (name and definition follow the newest record)
pub fn upsert_entity(
    conn: &mut SqliteConnection,
    kind_: &str,
    code_: &str,
    name_: &str,
    definition_: Option<&str>,
) -> anyhow::Result<usize> {
    let row = NewEntity {
        kind: kind_,
        code: code_,
        name: name_,
        definition: definition_,
    };
    let n = insert_into(entity::table)
        .values(&row)
        .on_conflict((entity::kind, entity::code))
        .do_update()
        .set((entity::name.eq(name_), entity::definition.eq(definition_)))
        .execute(conn)?;
    Ok(n)
}

/// mapping upsert (the triple is the key; relation is updated in place)
pub fn upsert_mapping(
    conn: &mut SqliteConnection,
    namespace: &str,
    source: &str,
    canonical: &str,
    relation_: Option<&str>,
) -> anyhow::Result<usize> {
    let row = NewXrefMapping {
        source_namespace: namespace,
        source_code: source,
        canonical_code: canonical,
        relation: relation_,
    };
    let n = insert_into(xm::table)
        .values(&row)
        .on_conflict((xm::source_namespace, xm::source_code, xm::canonical_code))
        .do_update()
        .set(xm::relation.eq(relation_))
        .execute(conn)?;
    Ok(n)
}

/// delete one mapping
pub fn delete_mapping(
    conn: &mut SqliteConnection,
    namespace: &str,
    source: &str,
    canonical: &str,
) -> diesel::QueryResult<usize> {
    diesel::delete(
        xm::table.filter(
            xm::source_namespace
                .eq(namespace)
                .and(xm::source_code.eq(source))
                .and(xm::canonical_code.eq(canonical)),
        ),
    )
    .execute(conn)
}

/// delete one entity; fails while associations still reference it (ON DELETE RESTRICT)
pub fn delete_entity(
    conn: &mut SqliteConnection,
    kind_: &str,
    code_: &str,
) -> diesel::QueryResult<usize> {
    diesel::delete(entity::table.filter(entity::kind.eq(kind_).and(entity::code.eq(code_))))
        .execute(conn)
}

/// the whole mapping table, in insertion order
pub fn load_mapping_records(conn: &mut SqliteConnection) -> diesel::QueryResult<Vec<MappingRecord>> {
    let rows = xm::table
        .order(xm::id.asc())
        .select(XrefMappingRow::as_select())
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|r| MappingRecord {
            source_namespace: Some(r.source_namespace),
            source_code: Some(r.source_code),
            canonical_code: Some(r.canonical_code),
            relation: r.relation,
        })
        .collect())
}
