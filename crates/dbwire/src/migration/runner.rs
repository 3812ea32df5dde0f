//! Applying revision plans to a database, or printing them in offline mode.

use std::collections::BTreeSet;

use dbwire_core::migration::version::{version_statements, CREATE_VERSION_TABLE};
use dbwire_core::migration::{Direction, Plan, Revision, RevisionGraph};

use crate::service::ServiceError;
use crate::storage::Database;

fn script_of(revision: &Revision, direction: Direction) -> &str {
    match direction {
        Direction::Upgrade => &revision.upgrade,
        Direction::Downgrade => &revision.downgrade,
    }
}

fn describe(revision: &Revision, direction: Direction) -> String {
    let parents = revision.down_revisions.join(", ");
    match direction {
        Direction::Upgrade => format!("Running upgrade {parents} -> {}", revision.id),
        Direction::Downgrade => format!("Running downgrade {} -> {parents}", revision.id),
    }
}

/// Yields each step of `plan` with the version table heads before and after it.
fn steps<'p>(
    graph: &RevisionGraph,
    plan: &'p Plan<'_>,
    current: &[String],
) -> Vec<(&'p Revision, Vec<String>, Vec<String>)> {
    let mut applied = graph.closure(current);
    let mut heads: Vec<String> = current.to_vec();
    let mut out = Vec::with_capacity(plan.steps.len());

    for revision in &plan.steps {
        match plan.direction {
            Direction::Upgrade => applied.insert(revision.id.clone()),
            Direction::Downgrade => applied.remove(&revision.id),
        };
        let after = graph.tips(&applied);
        out.push((*revision, heads, after.clone()));
        heads = after;
    }
    out
}

/// Runs every step of `plan`, each in its own transaction.
pub async fn apply(
    db: &Database,
    graph: &RevisionGraph,
    plan: &Plan<'_>,
    current: &[String],
) -> Result<(), ServiceError> {
    for (revision, before, after) in steps(graph, plan, current) {
        tracing::info!(database = db.name(), "{}", describe(revision, plan.direction));
        db.apply_revision(
            script_of(revision, plan.direction).to_string(),
            before,
            after,
        )
        .await?;
    }
    Ok(())
}

/// Renders the statements `apply` would run.
pub fn render(graph: &RevisionGraph, plan: &Plan<'_>, current: &[String]) -> String {
    let mut out = vec![
        "BEGIN;".to_string(),
        format!("{};", CREATE_VERSION_TABLE.trim()),
    ];

    for (revision, before, after) in steps(graph, plan, current) {
        out.push(format!("-- {}", describe(revision, plan.direction)));
        let script = script_of(revision, plan.direction).trim();
        if !script.is_empty() {
            out.push(script.to_string());
        }
        out.extend(
            version_statements(&before, &after)
                .into_iter()
                .map(|statement| format!("{statement};")),
        );
    }

    out.push("COMMIT;".to_string());
    out.join("\n\n")
}

/// Renders the statements moving the version table from `current` to `target`.
pub fn render_stamp(current: &[String], target: &[String]) -> String {
    let mut out = vec![format!("{};", CREATE_VERSION_TABLE.trim())];
    out.extend(
        version_statements(current, target)
            .into_iter()
            .map(|statement| format!("{statement};")),
    );
    out.join("\n\n")
}

/// Heads recorded after stamping `target` on top of `current`.
pub fn stamped_heads(graph: &RevisionGraph, current: &[String], target: &[String]) -> Vec<String> {
    if target.is_empty() {
        return Vec::new();
    }
    let ancestry = graph.closure(target);
    let mut kept: BTreeSet<String> = BTreeSet::new();
    for head in current {
        // A current head on another branch survives the stamp.
        let related = ancestry.contains(head)
            || graph.descendants(head).iter().any(|d| target.contains(d));
        if !related && !target.contains(head) {
            kept.insert(head.clone());
        }
    }
    kept.extend(target.iter().cloned());
    kept.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_core::schema::SchemaBuilder;

    fn graph() -> RevisionGraph {
        RevisionGraph::new(vec![
            Revision::new("a1", Vec::new())
                .upgrade("CREATE TABLE account (id INTEGER PRIMARY KEY);")
                .downgrade("DROP TABLE account;"),
            Revision::new("b2", vec!["a1".to_string()])
                .upgrade("ALTER TABLE account ADD COLUMN name TEXT;")
                .downgrade("ALTER TABLE account DROP COLUMN name;"),
            Revision::new("c3", vec!["a1".to_string()]),
        ])
        .unwrap()
    }

    async fn database() -> Database {
        let schema = SchemaBuilder::new("main").resolve(&Default::default()).unwrap();
        Database::open_in_memory("main", schema).await.unwrap()
    }

    #[tokio::test]
    async fn test_upgrade_then_downgrade() {
        let graph = graph();
        let db = database().await;

        let plan = graph.upgrade_plan::<String, _>(&[], &["b2"]);
        apply(&db, &graph, &plan, &[]).await.unwrap();
        assert_eq!(db.current_versions().await.unwrap(), vec!["b2".to_string()]);

        let tables = db.introspect().await.unwrap();
        let account = tables.iter().find(|t| t.name == "account").unwrap();
        assert_eq!(account.columns, vec!["id".to_string(), "name".to_string()]);

        let current = db.current_versions().await.unwrap();
        let plan = graph.downgrade_plan::<_, String>(&current, &[]);
        apply(&db, &graph, &plan, &current).await.unwrap();
        assert!(db.current_versions().await.unwrap().is_empty());
        assert!(!db.introspect().await.unwrap().iter().any(|t| t.name == "account"));
    }

    #[tokio::test]
    async fn test_upgrade_both_branches_records_both_heads() {
        let graph = graph();
        let db = database().await;

        let heads = graph.head_ids();
        let plan = graph.upgrade_plan::<String, _>(&[], &heads);
        apply(&db, &graph, &plan, &[]).await.unwrap();
        assert_eq!(
            db.current_versions().await.unwrap(),
            vec!["b2".to_string(), "c3".to_string()]
        );
    }

    #[test]
    fn test_render_offline() {
        let graph = graph();
        let plan = graph.upgrade_plan::<String, _>(&[], &["b2"]);
        let sql = render(&graph, &plan, &[]);

        assert!(sql.starts_with("BEGIN;"));
        assert!(sql.contains("-- Running upgrade  -> a1"));
        assert!(sql.contains("INSERT INTO dbwire_version (version_num) VALUES ('a1');"));
        assert!(sql.contains("DELETE FROM dbwire_version WHERE version_num = 'a1';"));
        assert!(sql.trim_end().ends_with("COMMIT;"));
    }

    #[test]
    fn test_stamped_heads() {
        let graph = graph();
        assert_eq!(
            stamped_heads(&graph, &["c3".to_string()], &["b2".to_string()]),
            vec!["b2".to_string(), "c3".to_string()]
        );
        assert_eq!(
            stamped_heads(&graph, &["a1".to_string()], &["b2".to_string()]),
            vec!["b2".to_string()]
        );
        assert!(stamped_heads(&graph, &["a1".to_string()], &[]).is_empty());
    }
}
