//! `CREATE TABLE` / `DROP TABLE` generation for a resolved schema.
//!
//! Pure string building, no I/O: the storage layer executes the output.

use super::resolved::{Column, ResolvedSchema, Table};
use crate::entity::SqlType;

/// Quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders a column definition without table-level constraints.
///
/// With `inline_reference` the foreign key is rendered as a column
/// constraint, as `ALTER TABLE .. ADD COLUMN` requires.
pub fn column_definition(column: &Column, inline_key: bool, inline_reference: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.sql_type.sql());

    if inline_key {
        sql.push_str(" PRIMARY KEY");
        // Only INTEGER PRIMARY KEY aliases the rowid and is implicitly NOT NULL.
        if column.sql_type != SqlType::Integer {
            sql.push_str(" NOT NULL");
        }
    } else if !column.nullable || column.primary_key {
        sql.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default.to_sql_literal()));
    }
    if inline_reference {
        if let Some(reference) = &column.references {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                quote_ident(&reference.table),
                quote_ident(&reference.column)
            ));
            if let Some(action) = reference.on_delete {
                sql.push_str(&format!(" ON DELETE {}", action.sql()));
            }
        }
    }

    sql
}

/// Renders `CREATE TABLE IF NOT EXISTS` for one table.
pub fn create_table(table: &Table) -> String {
    let keys = table.primary_key();
    let single_key = keys.len() == 1;

    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|column| column_definition(column, single_key && column.primary_key, false))
        .collect();

    if keys.len() > 1 {
        let names: Vec<String> = keys.iter().map(|c| quote_ident(&c.name)).collect();
        lines.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    for column in &table.columns {
        let Some(reference) = &column.references else {
            continue;
        };
        let mut line = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&column.name),
            quote_ident(&reference.table),
            quote_ident(&reference.column)
        );
        if let Some(action) = reference.on_delete {
            line.push_str(&format!(" ON DELETE {}", action.sql()));
        }
        lines.push(line);
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(&table.name),
        lines.join(",\n    ")
    )
}

/// Renders `DROP TABLE IF EXISTS` for one table.
pub fn drop_table(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(name))
}

/// Orders tables so that referenced tables come first.
///
/// Declaration order is kept wherever references allow it. Tables caught in
/// a reference cycle are emitted in declaration order after the rest.
pub fn creation_order(tables: &[Table]) -> Vec<&Table> {
    let mut ordered: Vec<&Table> = Vec::with_capacity(tables.len());
    let mut pending: Vec<&Table> = tables.iter().collect();

    loop {
        let ready = pending.iter().position(|table| {
            table.referenced_tables().iter().all(|name| {
                ordered.iter().any(|t| t.name == *name) || !tables.iter().any(|t| t.name == *name)
            })
        });

        match ready {
            Some(index) => ordered.push(pending.remove(index)),
            None => break,
        }
    }

    ordered.extend(pending);
    ordered
}

/// Statements creating every table of `schema`, referenced tables first.
pub fn create_statements(schema: &ResolvedSchema) -> Vec<String> {
    creation_order(schema.tables())
        .into_iter()
        .map(create_table)
        .collect()
}

/// Statements dropping every table of `schema`, referencing tables first.
pub fn drop_statements(schema: &ResolvedSchema) -> Vec<String> {
    creation_order(schema.tables())
        .into_iter()
        .rev()
        .map(|table| drop_table(&table.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Field};
    use crate::schema::{ResolveOptions, SchemaBuilder};

    fn movie_schema() -> ResolvedSchema {
        SchemaBuilder::new("main")
            .entity(Entity::new("Movie").many_to_many("tags", "Tag"))
            .entity(Entity::new("Tag").many_to_many("movies", "Movie"))
            .resolve(&ResolveOptions::default())
            .unwrap()
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("parent"), "\"parent\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_with_foreign_key() {
        let schema = SchemaBuilder::new("main")
            .entity(
                Entity::new("Parent")
                    .field(Field::new("name", SqlType::Text).not_null().unique())
                    .one_to_many("children", "Child"),
            )
            .entity(Entity::new("Child").many_to_one("parent", "Parent"))
            .resolve(&ResolveOptions::default())
            .unwrap();

        let parent = create_table(schema.table("parent").unwrap());
        assert_eq!(
            parent,
            "CREATE TABLE IF NOT EXISTS \"parent\" (\n    \"id\" INTEGER PRIMARY KEY,\n    \"name\" TEXT NOT NULL UNIQUE\n)"
        );

        let child = create_table(schema.table("child").unwrap());
        assert!(child.contains("\"parent_id\" INTEGER,"));
        assert!(child.contains("FOREIGN KEY (\"parent_id\") REFERENCES \"parent\" (\"id\")"));
    }

    #[test]
    fn test_create_join_table_has_composite_key() {
        let schema = movie_schema();
        let sql = create_table(schema.join_tables().next().unwrap());

        assert!(sql.contains("\"movie_id\" INTEGER NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (\"movie_id\", \"tag_id\")"));
        assert!(sql.contains("REFERENCES \"tag\" (\"id\") ON DELETE CASCADE"));
    }

    #[test]
    fn test_text_primary_key_is_not_null() {
        let column = Column::primary_key("code", SqlType::Varchar(50));
        assert_eq!(
            column_definition(&column, true, false),
            "\"code\" VARCHAR(50) PRIMARY KEY NOT NULL"
        );
    }

    #[test]
    fn test_default_is_rendered_as_literal() {
        let column = Column::from(&Field::new("label", SqlType::Text).with_default("it's"));
        assert_eq!(
            column_definition(&column, false, false),
            "\"label\" TEXT DEFAULT 'it''s'"
        );
    }

    #[test]
    fn test_creation_order_puts_referenced_tables_first() {
        let schema = SchemaBuilder::new("main")
            .entity(Entity::new("Child").many_to_one("parent", "Parent"))
            .entity(Entity::new("Parent").one_to_many("children", "Child"))
            .resolve(&ResolveOptions::default())
            .unwrap();

        let names: Vec<&str> = creation_order(schema.tables())
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["parent", "child"]);
    }

    #[test]
    fn test_drop_statements_reverse_creation_order() {
        let schema = movie_schema();

        assert_eq!(
            drop_statements(&schema),
            vec![
                "DROP TABLE IF EXISTS \"tag_tags__movie_movies\"",
                "DROP TABLE IF EXISTS \"tag\"",
                "DROP TABLE IF EXISTS \"movie\"",
            ]
        );
        assert_eq!(create_statements(&schema).len(), 3);
    }
}
