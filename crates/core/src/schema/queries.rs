//! Parameterised statements for row and relationship access.
//!
//! Every builder returns SQL with numbered `?N` placeholders; the caller
//! binds values in the order the arguments list them.

use super::ddl::quote_ident;
use super::resolved::{ForeignKeyJoin, SecondaryJoin, Table};

/// Ordering of a multi-row read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order<'a> {
    /// By a column of the selected table.
    Column(&'a str),
    /// In insertion order.
    Insertion,
    Unordered,
}

fn qualified_columns(table: &Table) -> String {
    let qualifier = quote_ident(&table.name);
    table
        .columns
        .iter()
        .map(|c| format!("{qualifier}.{}", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"a" IS ?1 AND "b" IS ?2`, null-safe equality starting at `?first`.
fn conditions(qualifier: Option<&str>, columns: &[&str], first: usize) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let column = match qualifier {
                Some(table) => format!("{}.{}", quote_ident(table), quote_ident(column)),
                None => quote_ident(column),
            };
            format!("{column} IS ?{}", first + i)
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn order_clause(table: &str, order: Order<'_>) -> String {
    match order {
        Order::Column(column) => {
            format!(" ORDER BY {}.{}", quote_ident(table), quote_ident(column))
        }
        Order::Insertion => format!(" ORDER BY {}.rowid", quote_ident(table)),
        Order::Unordered => String::new(),
    }
}

/// `INSERT INTO` with the given columns, or `DEFAULT VALUES` when empty.
pub fn insert(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }

    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        params.join(", ")
    )
}

/// Selects every column of `table` filtered on `filters` (bound `?1..`).
pub fn select(table: &Table, filters: &[&str], order: Order<'_>, limit: Option<u32>) -> String {
    let mut sql = format!("SELECT {} FROM {}", qualified_columns(table), quote_ident(&table.name));
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions(Some(&table.name), filters, 1));
    }
    sql.push_str(&order_clause(&table.name, order));
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}

pub fn count(table: &str, filters: &[&str]) -> String {
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions(None, filters, 1));
    }
    sql
}

pub fn exists(table: &str, filters: &[&str]) -> String {
    let mut inner = format!("SELECT 1 FROM {}", quote_ident(table));
    if !filters.is_empty() {
        inner.push_str(" WHERE ");
        inner.push_str(&conditions(None, filters, 1));
    }
    format!("SELECT EXISTS({inner})")
}

/// Updates `columns` (bound `?1..?n`) of the row whose `key` is `?n+1`.
pub fn update(table: &str, columns: &[&str], key: &str) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(key),
        columns.len() + 1
    )
}

pub fn delete(table: &str, key: &str) -> String {
    format!("DELETE FROM {} WHERE {} = ?1", quote_ident(table), quote_ident(key))
}

/// Rows of `target` linked through a join table to the local key `?1`.
pub fn select_through(target: &Table, join: &SecondaryJoin, order: Order<'_>) -> String {
    let join_table = quote_ident(&join.table);
    let target_table = quote_ident(&target.name);
    let order = match order {
        Order::Insertion => order_clause(&join.table, Order::Insertion),
        other => order_clause(&target.name, other),
    };

    format!(
        "SELECT {} FROM {target_table} JOIN {join_table} ON {join_table}.{} = {target_table}.{} WHERE {join_table}.{} = ?1{order}",
        qualified_columns(target),
        quote_ident(&join.remote_column),
        quote_ident(&join.remote_key),
        quote_ident(&join.local_column),
    )
}

/// Adds the pair (`?1` local, `?2` remote) to a join table.
pub fn link(join: &SecondaryJoin) -> String {
    format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
        quote_ident(&join.table),
        quote_ident(&join.local_column),
        quote_ident(&join.remote_column)
    )
}

/// Removes the pair (`?1` local, `?2` remote) from a join table.
pub fn unlink(join: &SecondaryJoin) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
        quote_ident(&join.table),
        quote_ident(&join.local_column),
        quote_ident(&join.remote_column)
    )
}

/// Points the foreign key of the row keyed `?2` at `?1`.
pub fn set_foreign_key(join: &ForeignKeyJoin, key: &str) -> String {
    format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        quote_ident(&join.table),
        quote_ident(&join.column),
        quote_ident(key)
    )
}

/// Clears the foreign key of the row keyed `?1` if it points at `?2`.
pub fn clear_foreign_key(join: &ForeignKeyJoin, key: &str) -> String {
    format!(
        "UPDATE {} SET {} = NULL WHERE {} = ?1 AND {} = ?2",
        quote_ident(&join.table),
        quote_ident(&join.column),
        quote_ident(key),
        quote_ident(&join.column)
    )
}

/// Clears every foreign key pointing at `?1`.
pub fn clear_all_foreign_keys(join: &ForeignKeyJoin) -> String {
    format!(
        "UPDATE {} SET {} = NULL WHERE {} = ?1",
        quote_ident(&join.table),
        quote_ident(&join.column),
        quote_ident(&join.column)
    )
}
