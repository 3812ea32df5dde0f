//! Autogenerate: comparing a resolved schema with an introspected database.

use crate::schema::ddl::{self, quote_ident};
use crate::schema::{ResolvedSchema, Table};

use super::version::VERSION_TABLE;

/// A table as found in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTable {
    pub name: String,
    /// The `CREATE TABLE` statement stored by SQLite.
    pub sql: String,
    pub columns: Vec<String>,
}

/// Statements of an autogenerated revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operations {
    pub upgrade: Vec<String>,
    pub downgrade: Vec<String>,
}

impl Operations {
    pub fn is_empty(&self) -> bool {
        self.upgrade.is_empty() && self.downgrade.is_empty()
    }

    /// Joins a statement list into a script section.
    pub fn script(statements: &[String]) -> String {
        statements
            .iter()
            .map(|s| format!("{};", s.trim_end_matches(';')))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn is_internal(name: &str) -> bool {
    name == VERSION_TABLE || name.starts_with("sqlite_")
}

fn add_column_statements(table: &Table, existing: &DatabaseTable, ops: &mut Operations) {
    let name = quote_ident(&table.name);

    for column in &table.columns {
        if existing.columns.iter().any(|c| c == &column.name) {
            continue;
        }

        // SQLite cannot add a UNIQUE column; the constraint becomes an index.
        let mut added = column.clone();
        added.unique = false;
        added.primary_key = false;
        ops.upgrade.push(format!(
            "ALTER TABLE {name} ADD COLUMN {}",
            ddl::column_definition(&added, false, true)
        ));

        if column.unique {
            let index = quote_ident(&format!("uq_{}_{}", table.name, column.name));
            ops.upgrade.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {name} ({})",
                quote_ident(&column.name)
            ));
            ops.downgrade.insert(
                0,
                format!("ALTER TABLE {name} DROP COLUMN {}", quote_ident(&column.name)),
            );
            ops.downgrade.insert(0, format!("DROP INDEX IF EXISTS {index}"));
        } else {
            ops.downgrade.insert(
                0,
                format!("ALTER TABLE {name} DROP COLUMN {}", quote_ident(&column.name)),
            );
        }
    }
}

/// Computes the statements bringing `existing` in line with `schema`.
///
/// Missing tables are created, missing columns added and tables unknown to
/// the schema dropped; each downgrade statement undoes its upgrade.
pub fn compare(schema: &ResolvedSchema, existing: &[DatabaseTable]) -> Operations {
    let mut ops = Operations::default();
    let find = |name: &str| existing.iter().find(|t| t.name == name);

    for table in ddl::creation_order(schema.tables()) {
        match find(&table.name) {
            None => {
                ops.upgrade.push(ddl::create_table(table));
                ops.downgrade.insert(0, ddl::drop_table(&table.name));
            }
            Some(current) => add_column_statements(table, current, &mut ops),
        }
    }

    for table in existing {
        if is_internal(&table.name) || schema.table(&table.name).is_some() {
            continue;
        }
        ops.upgrade.push(ddl::drop_table(&table.name));
        ops.downgrade.push(table.sql.clone());
    }

    ops
}
