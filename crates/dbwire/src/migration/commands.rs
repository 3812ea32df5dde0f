//! The revision commands of one database.
//!
//! Every command returns the text to print; an empty string prints nothing.

use std::collections::HashMap;
use std::path::PathBuf;

use dbwire_core::migration::{
    compare, new_revision_id, MigrationError, Operations, Revision, RevisionGraph,
};

use super::runner;
use super::ScriptDirectory;
use crate::service::{DatabaseService, ServiceError};
use crate::storage::Database;

const CREATE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Options of the `revision` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionOptions {
    pub message: Option<String>,
    pub autogenerate: bool,
    /// Revision the new one is based on: `head`, `<label>@head` or an id.
    pub head: String,
    /// Allow a non-head revision as base, starting a new branch.
    pub splice: bool,
    pub branch_label: Option<String>,
    pub rev_id: Option<String>,
    pub depends_on: Vec<String>,
}

impl Default for RevisionOptions {
    fn default() -> Self {
        Self {
            message: None,
            autogenerate: false,
            head: "head".to_string(),
            splice: false,
            branch_label: None,
            rev_id: None,
            depends_on: Vec::new(),
        }
    }
}

/// Creates the revision directory of every selected database.
pub async fn init(service: &DatabaseService, db: Option<&str>) -> Result<String, ServiceError> {
    let mut out = Vec::new();
    for name in service.select(db)? {
        let scripts = service.scripts(&name);
        if scripts.init().await? {
            out.push(format!("Creating directory '{}' ... done", scripts.root().display()));
        } else {
            out.push(format!("*** '{}' already exists", scripts.root().display()));
        }
    }
    Ok(out.join("\n"))
}

struct Catalog {
    graph: RevisionGraph,
    paths: HashMap<String, PathBuf>,
}

/// Commands bound to a single database.
pub struct Migrator<'a> {
    db: &'a Database,
    scripts: ScriptDirectory,
    service: &'a DatabaseService,
}

impl<'a> Migrator<'a> {
    /// Selects the database; `None` works only with a single database.
    pub fn new(service: &'a DatabaseService, db: Option<&str>) -> Result<Self, ServiceError> {
        let name = service.single(db)?;
        Ok(Self {
            db: service.database(&name)?,
            scripts: service.scripts(&name),
            service,
        })
    }

    async fn catalog(&self) -> Result<Catalog, ServiceError> {
        if !self.scripts.exists().await {
            return Err(ServiceError::NotInitialized(self.scripts.root().to_path_buf()));
        }

        let mut paths = HashMap::new();
        let mut revisions = Vec::new();
        for (path, revision) in self.scripts.load().await? {
            paths.insert(revision.id.clone(), path);
            revisions.push(revision);
        }

        Ok(Catalog {
            graph: RevisionGraph::new(revisions)?,
            paths,
        })
    }

    fn format(&self, catalog: &Catalog, revision: &Revision, verbose: bool) -> String {
        let children = catalog.graph.children(&revision.id);
        let mut markers = String::new();
        if children.is_empty() {
            markers.push_str(" (head)");
        }
        if children.len() > 1 {
            markers.push_str(" (branchpoint)");
        }
        if revision.is_merge() {
            markers.push_str(" (mergepoint)");
        }

        if !verbose {
            let parents = if revision.is_base() {
                "<base>".to_string()
            } else {
                revision.down_revisions.join(", ")
            };
            let labels = if revision.branch_labels.is_empty() {
                String::new()
            } else {
                format!(" ({})", revision.branch_labels.join(", "))
            };
            return format!("{parents} -> {}{labels}{markers}, {}", revision.id, revision.message);
        }

        let mut lines = vec![format!("Rev: {}{markers}", revision.id)];
        if !revision.down_revisions.is_empty() {
            let label = if revision.is_merge() { "Merges" } else { "Parent" };
            lines.push(format!("{label}: {}", revision.down_revisions.join(", ")));
        }
        if !revision.branch_labels.is_empty() {
            lines.push(format!("Branch names: {}", revision.branch_labels.join(", ")));
        }
        if !revision.depends_on.is_empty() {
            lines.push(format!("Also depends on: {}", revision.depends_on.join(", ")));
        }
        if !children.is_empty() {
            let ids: Vec<&str> = children.iter().map(|r| r.id.as_str()).collect();
            lines.push(format!("Branches into: {}", ids.join(", ")));
        }
        if let Some(path) = catalog.paths.get(&revision.id) {
            lines.push(format!("Path: {}", path.display()));
        }
        lines.push(String::new());
        lines.push(format!("    {}", revision.message));
        lines.push(String::new());
        lines.push(format!("    Revision ID: {}", revision.id));
        lines.push(format!("    Revises: {}", revision.down_revisions.join(", ")));
        if let Some(date) = &revision.create_date {
            lines.push(format!("    Create Date: {date}"));
        }
        lines.join("\n")
    }

    /// Creates a new revision script.
    pub async fn revision(&self, options: RevisionOptions) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let graph = &catalog.graph;
        let current = self.db.current_versions().await?;

        let down_revisions = graph.resolve(&options.head, &current)?;
        if !options.splice {
            let heads = graph.head_ids();
            if let Some(base) = down_revisions.iter().find(|id| !heads.contains(*id)) {
                return Err(MigrationError::NotAHead(base.clone()).into());
            }
        }

        let mut depends_on = Vec::with_capacity(options.depends_on.len());
        for symbol in &options.depends_on {
            depends_on.push(graph.lookup(symbol)?.id.clone());
        }

        let message = options.message.unwrap_or_default();
        let id = options.rev_id.unwrap_or_else(new_revision_id);
        let now = self.service.config().upgrade.timezone.now();

        let mut revision = Revision::new(id, down_revisions).message(message.clone());
        revision.depends_on = depends_on;
        revision.branch_labels = options.branch_label.into_iter().collect();
        revision.create_date = Some(now.format(CREATE_DATE_FORMAT).to_string());

        if options.autogenerate {
            let mut heads = graph.head_ids();
            let mut applied = current.clone();
            heads.sort();
            applied.sort();
            if heads != applied {
                return Err(ServiceError::NotUpToDate(self.db.name().to_string()));
            }

            let ops = compare(self.db.schema(), &self.db.introspect().await?);
            if ops.is_empty() {
                tracing::info!(database = self.db.name(), "no changes in schema detected");
            }
            revision.upgrade = Operations::script(&ops.upgrade);
            revision.downgrade = Operations::script(&ops.downgrade);
        }

        self.write(graph, revision, &message, &now).await
    }

    async fn write(
        &self,
        graph: &RevisionGraph,
        revision: Revision,
        message: &str,
        now: &chrono::DateTime<chrono::FixedOffset>,
    ) -> Result<String, ServiceError> {
        // Validates ids, labels and references against the existing scripts.
        let mut revisions = graph.revisions().to_vec();
        revisions.push(revision.clone());
        RevisionGraph::new(revisions)?;

        let file_name = self.service.config().file_template().render(&revision.id, message, now);
        let path = self.scripts.write(&file_name, &revision).await?;
        tracing::info!(database = self.db.name(), revision = %revision.id, "created revision");
        Ok(format!("Generating {} ... done", path.display()))
    }

    /// Creates a revision merging `revisions` (ids or `heads`).
    pub async fn merge(
        &self,
        revisions: &[String],
        message: Option<String>,
        branch_label: Option<String>,
        rev_id: Option<String>,
    ) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let graph = &catalog.graph;
        let current = self.db.current_versions().await?;

        let mut parents: Vec<String> = Vec::new();
        for symbol in revisions {
            for id in graph.resolve(symbol, &current)? {
                if !parents.contains(&id) {
                    parents.push(id);
                }
            }
        }

        let message = message.unwrap_or_default();
        let now = self.service.config().upgrade.timezone.now();
        let mut revision = Revision::new(rev_id.unwrap_or_else(new_revision_id), parents)
            .message(message.clone());
        revision.branch_labels = branch_label.into_iter().collect();
        revision.create_date = Some(now.format(CREATE_DATE_FORMAT).to_string());

        self.write(graph, revision, &message, &now).await
    }

    /// Upgrades to `target`; with `sql`, prints the statements instead.
    ///
    /// Offline, `target` may be a `start:end` range; the start defaults to
    /// base.
    pub async fn upgrade(&self, target: &str, sql: bool) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let graph = &catalog.graph;

        if sql {
            let (start, end) = match target.split_once(':') {
                Some((start, end)) => (graph.resolve(start, &[] as &[String])?, end),
                None => (Vec::new(), target),
            };
            let wanted = graph.resolve(end, &start)?;
            let plan = graph.upgrade_plan(&start, &wanted);
            return Ok(runner::render(graph, &plan, &start));
        }

        let current = self.db.current_versions().await?;
        let wanted = graph.resolve(target, &current)?;
        let plan = graph.upgrade_plan(&current, &wanted);
        runner::apply(self.db, graph, &plan, &current).await?;
        Ok(String::new())
    }

    /// Downgrades to `target`; with `sql`, `target` must be a `start:end`
    /// range and the statements are printed instead.
    pub async fn downgrade(&self, target: &str, sql: bool) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let graph = &catalog.graph;

        if sql {
            let Some((start, end)) = target.split_once(':') else {
                return Err(ServiceError::OfflineRange("downgrade"));
            };
            let start = graph.resolve(start, &[] as &[String])?;
            let wanted = graph.resolve(end, &start)?;
            let plan = graph.downgrade_plan(&start, &wanted);
            return Ok(runner::render(graph, &plan, &start));
        }

        let current = self.db.current_versions().await?;
        let wanted = graph.resolve(target, &current)?;
        let plan = graph.downgrade_plan(&current, &wanted);
        runner::apply(self.db, graph, &plan, &current).await?;
        Ok(String::new())
    }

    /// Records `target` in the version table without running any script.
    pub async fn stamp(&self, target: &str, sql: bool) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let graph = &catalog.graph;

        if sql {
            let (start, end) = match target.split_once(':') {
                Some((start, end)) => (graph.resolve(start, &[] as &[String])?, end),
                None => (Vec::new(), target),
            };
            let wanted = graph.resolve(end, &start)?;
            let heads = runner::stamped_heads(graph, &start, &wanted);
            return Ok(runner::render_stamp(&start, &heads));
        }

        let current = self.db.current_versions().await?;
        let wanted = graph.resolve(target, &current)?;
        let heads = runner::stamped_heads(graph, &current, &wanted);
        tracing::info!(database = self.db.name(), heads = ?heads, "stamping");
        self.db.set_versions(heads).await?;
        Ok(String::new())
    }

    /// The revisions recorded in the version table.
    pub async fn current(&self, verbose: bool) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let mut out = Vec::new();
        if verbose {
            out.push(format!("Current revision(s) for {}:", self.db.name()));
        }
        for id in self.db.current_versions().await? {
            match catalog.graph.get(&id) {
                Some(revision) if verbose => out.push(self.format(&catalog, revision, true)),
                Some(revision) => {
                    let head = if catalog.graph.children(&revision.id).is_empty() {
                        " (head)"
                    } else {
                        ""
                    };
                    out.push(format!("{}{head}", revision.id));
                }
                None => return Err(MigrationError::UnknownRevision(id).into()),
            }
        }
        Ok(out.join("\n"))
    }

    /// Revisions of `range` (`[start]:[end]`), newest first.
    pub async fn history(
        &self,
        range: Option<&str>,
        verbose: bool,
    ) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let current = self.db.current_versions().await?;

        let lines: Vec<String> = catalog
            .graph
            .history(range, &current)?
            .into_iter()
            .map(|revision| self.format(&catalog, revision, verbose))
            .collect();
        Ok(lines.join(if verbose { "\n\n" } else { "\n" }))
    }

    /// Revisions with more than one child.
    pub async fn branches(&self, verbose: bool) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let mut out = Vec::new();
        for point in catalog.graph.branch_points() {
            out.push(self.format(&catalog, point, verbose));
            for child in catalog.graph.children(&point.id) {
                out.push(format!("    -> {}", child.summary()));
            }
        }
        Ok(out.join("\n"))
    }

    pub async fn heads(
        &self,
        verbose: bool,
        resolve_dependencies: bool,
    ) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let lines: Vec<String> = catalog
            .graph
            .heads(resolve_dependencies)
            .into_iter()
            .map(|revision| self.format(&catalog, revision, verbose))
            .collect();
        Ok(lines.join("\n"))
    }

    /// The revisions denoted by `symbol`.
    pub async fn show(&self, symbol: &str) -> Result<String, ServiceError> {
        let catalog = self.catalog().await?;
        let current = self.db.current_versions().await?;

        let mut out = Vec::new();
        for id in catalog.graph.resolve(symbol, &current)? {
            if let Some(revision) = catalog.graph.get(&id) {
                out.push(self.format(&catalog, revision, true));
            }
        }
        Ok(out.join("\n\n"))
    }
}
