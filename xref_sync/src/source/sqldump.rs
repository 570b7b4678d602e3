//! Associations from a MySQL-style SQL dump.
//!
//! Only `INSERT` statements into the configured table are read; every other statement
//! is skipped without being parsed. Column positions come from, in order: the
//! `INSERT`'s own column list, a `CREATE TABLE` for the table earlier in the dump, or the
//! configured [`DumpColumns::table_columns`].

use std::{fs, path::Path, vec};

use sqlparser::{
    ast::{Expr, ObjectName, SetExpr, Statement, Value},
    dialect::MySqlDialect,
    keywords::Keyword,
    parser::Parser,
    tokenizer::{Token, Tokenizer},
};
use tracing::{debug, warn};

use super::{RawAssociation, SourceError, non_blank};

/// Which dump columns feed which association field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpColumns {
    /// Column holding the left identifier.
    pub left: String,
    /// Column holding the right identifier.
    pub right: String,
    /// Optional evidence column.
    pub evidence: Option<String>,
    /// Optional frequency column.
    pub frequency: Option<String>,
    /// Full column order of the table, for dumps without column lists or DDL.
    pub table_columns: Option<Vec<String>>,
}

impl DumpColumns {
    /// Left/right columns only.
    pub fn new(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            evidence: None,
            frequency: None,
            table_columns: None,
        }
    }
}

struct Positions {
    left: usize,
    right: usize,
    evidence: Option<usize>,
    frequency: Option<usize>,
}

impl Positions {
    fn locate(names: &[String], cols: &DumpColumns, table: &str) -> Result<Self, SourceError> {
        let find = |wanted: &str| names.iter().position(|n| n.eq_ignore_ascii_case(wanted));
        let required = |wanted: &str| {
            find(wanted).ok_or_else(|| {
                SourceError::SqlDump(format!("table `{table}` has no column `{wanted}`"))
            })
        };
        Ok(Self {
            left: required(&cols.left)?,
            right: required(&cols.right)?,
            evidence: cols.evidence.as_deref().and_then(find),
            frequency: cols.frequency.as_deref().and_then(find),
        })
    }

    fn extract(&self, row: &[Expr], ordinal: u64) -> RawAssociation {
        let cell = |i: usize| row.get(i).and_then(value_text);
        if row.len() <= self.left.max(self.right) {
            return RawAssociation::malformed(Some(ordinal));
        }
        RawAssociation {
            left_id: non_blank(cell(self.left)),
            right_id: non_blank(cell(self.right)),
            evidence: non_blank(self.evidence.and_then(cell)),
            frequency: non_blank(self.frequency.and_then(cell)),
            line: Some(ordinal),
        }
    }
}

fn value_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::Null) => None,
        Expr::Value(Value::SingleQuotedString(s)) | Expr::Value(Value::DoubleQuotedString(s)) => {
            Some(s.clone())
        }
        Expr::Value(Value::Number(n, _)) => Some(n.clone()),
        other => Some(other.to_string()),
    }
}

fn names_table(name: &ObjectName, table: &str) -> bool {
    name.0
        .last()
        .is_some_and(|ident| ident.value.eq_ignore_ascii_case(table))
}

fn significant(tokens: &[Token]) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(|t| !matches!(t, Token::Whitespace(_)))
}

// INSERT INTO `t` / CREATE TABLE IF NOT EXISTS `db`.`t`: the name sits in the first few words.
fn mentions_table(tokens: &[Token], table: &str) -> bool {
    significant(tokens)
        .take(10)
        .any(|t| matches!(t, Token::Word(w) if w.value.eq_ignore_ascii_case(table)))
}

/// Column names of a `CREATE TABLE` the parser rejected (vendor options, exotic types):
/// the first word of every top-level element in the column list, constraints excluded.
fn scan_create_columns(tokens: &[Token]) -> Option<Vec<String>> {
    let mut depth = 0usize;
    let mut expect_name = false;
    let mut names = Vec::new();
    for t in significant(tokens) {
        match t {
            Token::LParen => {
                depth += 1;
                expect_name = depth == 1;
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !names.is_empty() {
                    break;
                }
            }
            Token::Comma if depth == 1 => expect_name = true,
            Token::Word(w) if expect_name => {
                expect_name = false;
                let constraint = w.quote_style.is_none()
                    && matches!(
                        w.keyword,
                        Keyword::PRIMARY
                            | Keyword::KEY
                            | Keyword::UNIQUE
                            | Keyword::INDEX
                            | Keyword::CONSTRAINT
                            | Keyword::FOREIGN
                            | Keyword::FULLTEXT
                            | Keyword::SPATIAL
                            | Keyword::CHECK
                    );
                if !constraint {
                    names.push(w.value.clone());
                }
            }
            _ => expect_name = false,
        }
    }
    (!names.is_empty()).then_some(names)
}

/// All association rows of one table in a SQL dump, parsed up front.
#[derive(Debug)]
pub struct SqlDumpSource {
    rows: vec::IntoIter<RawAssociation>,
}

impl SqlDumpSource {
    /// Parse `sql` and collect the rows inserted into `table`.
    pub fn parse(sql: &str, table: &str, columns: &DumpColumns) -> Result<Self, SourceError> {
        let dialect = MySqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| SourceError::SqlDump(e.to_string()))?;

        let mut ddl_columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut statements = 0usize;

        for chunk in tokens.split(|t| matches!(t, Token::SemiColon)) {
            let keyword = match significant(chunk).next() {
                Some(Token::Word(w)) => w.keyword,
                _ => continue,
            };
            if !matches!(keyword, Keyword::INSERT | Keyword::CREATE) || !mentions_table(chunk, table)
            {
                continue;
            }

            let parsed = Parser::new(&dialect)
                .with_tokens(chunk.to_vec())
                .parse_statement();
            let stmt = match (keyword, parsed) {
                (_, Ok(stmt)) => stmt,
                (Keyword::CREATE, Err(e)) => {
                    debug!(table, error = %e, "CREATE not parsable, scanning column names");
                    ddl_columns = scan_create_columns(chunk).or(ddl_columns);
                    continue;
                }
                (_, Err(e)) => {
                    return Err(SourceError::SqlDump(format!("INSERT into `{table}`: {e}")));
                }
            };

            match stmt {
                Statement::CreateTable { name, columns: defs, .. } if names_table(&name, table) => {
                    ddl_columns = Some(defs.iter().map(|c| c.name.value.clone()).collect());
                }
                Statement::Insert {
                    table_name,
                    columns: insert_columns,
                    source,
                    ..
                } if names_table(&table_name, table) => {
                    statements += 1;
                    let names: Vec<String> = if !insert_columns.is_empty() {
                        insert_columns.iter().map(|c| c.value.clone()).collect()
                    } else if let Some(cols) = ddl_columns.as_ref().or(columns.table_columns.as_ref())
                    {
                        cols.clone()
                    } else {
                        return Err(SourceError::SqlDump(format!(
                            "INSERT into `{table}` has no column list and the column order is unknown"
                        )));
                    };
                    let positions = Positions::locate(&names, columns, table)?;

                    let SetExpr::Values(values) = source.body.as_ref() else {
                        warn!(table, "skipping INSERT ... SELECT");
                        continue;
                    };
                    for row in &values.rows {
                        let ordinal = rows.len() as u64 + 1;
                        rows.push(positions.extract(row, ordinal));
                    }
                }
                _ => {}
            }
        }

        debug!(table, statements, rows = rows.len(), "sql dump parsed");
        Ok(Self {
            rows: rows.into_iter(),
        })
    }

    /// Read and parse a dump file.
    pub fn from_path(
        path: impl AsRef<Path>,
        table: &str,
        columns: &DumpColumns,
    ) -> Result<Self, SourceError> {
        let sql = fs::read_to_string(path)?;
        Self::parse(&sql, table, columns)
    }
}

impl Iterator for SqlDumpSource {
    type Item = Result<RawAssociation, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for SqlDumpSource {}
