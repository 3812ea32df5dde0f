//! The version table recording the applied revision heads.

use crate::entity::Value;

pub const VERSION_TABLE: &str = "dbwire_version";

pub const CREATE_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dbwire_version (
    version_num TEXT NOT NULL PRIMARY KEY
)
"#;

pub const DROP_VERSION_TABLE: &str = "DROP TABLE IF EXISTS dbwire_version";

pub const SELECT_VERSIONS: &str = "SELECT version_num FROM dbwire_version ORDER BY version_num";

pub const INSERT_VERSION: &str = "INSERT INTO dbwire_version (version_num) VALUES (?1)";

pub const DELETE_VERSION: &str = "DELETE FROM dbwire_version WHERE version_num = ?1";

/// Literal statements moving the version table from `before` to `after`,
/// as printed in offline mode.
pub fn version_statements(before: &[String], after: &[String]) -> Vec<String> {
    let removed = before
        .iter()
        .filter(|v| !after.contains(v))
        .map(|v| DELETE_VERSION.replace("?1", &Value::from(v.as_str()).to_sql_literal()));
    let added = after
        .iter()
        .filter(|v| !before.contains(v))
        .map(|v| INSERT_VERSION.replace("?1", &Value::from(v.as_str()).to_sql_literal()));

    removed.chain(added).collect()
}
