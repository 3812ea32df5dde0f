//! Naming rules for generated columns and join tables.

/// Name of a generated foreign key column: `<prefix>_<key column>`.
///
/// The prefix is the many-to-one attribute name when one exists on the
/// referencing side, otherwise the referenced table name.
pub fn foreign_key_column(prefix: &str, key_column: &str) -> String {
    format!("{prefix}_{key_column}")
}

/// Name of a generated many-to-many join table.
///
/// Both sides of a declared pair compute the same name: when an inverse is
/// known, the two parts are ordered so that the lexically greater comes
/// first.
pub fn join_table(
    local_entity: &str,
    inverse: Option<&str>,
    target_entity: &str,
    attribute: &str,
) -> String {
    let source = match inverse {
        Some(inverse) => format!("{local_entity}_{inverse}"),
        None => local_entity.to_string(),
    }
    .to_lowercase();
    let target = format!("{target_entity}_{attribute}").to_lowercase();

    if inverse.is_some() && source < target {
        format!("{target}__{source}")
    } else {
        format!("{source}__{target}")
    }
}
