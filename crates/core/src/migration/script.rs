//! The revision script format.
//!
//! A revision script is a SQL file with a header of `-- key: value` lines
//! followed by an `-- upgrade` section and an optional `-- downgrade`
//! section:
//!
//! ```sql
//! -- revision: 1975ea83b712
//! -- down_revision: ae1027a6acf
//! -- branch_labels:
//! -- depends_on:
//! -- message: create account table
//! -- create_date: 2026-10-17 09:12:44
//!
//! -- upgrade
//! CREATE TABLE "account" ("id" INTEGER PRIMARY KEY);
//!
//! -- downgrade
//! DROP TABLE "account";
//! ```

use serde::Serialize;

use super::error::{MigrationError, Result};

const UPGRADE_MARKER: &str = "-- upgrade";
const DOWNGRADE_MARKER: &str = "-- downgrade";

/// One revision script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Revision {
    pub id: String,
    /// Parents of this revision. Empty for a base, several for a merge.
    pub down_revisions: Vec<String>,
    pub branch_labels: Vec<String>,
    /// Revisions that must be applied first without being parents.
    pub depends_on: Vec<String>,
    pub message: String,
    pub create_date: Option<String>,
    pub upgrade: String,
    pub downgrade: String,
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None")
        .map(String::from)
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Upgrade,
    Downgrade,
}

impl Revision {
    pub fn new(id: impl Into<String>, down_revisions: Vec<String>) -> Self {
        Self {
            id: id.into(),
            down_revisions,
            ..Self::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn branch_label(mut self, label: impl Into<String>) -> Self {
        self.branch_labels.push(label.into());
        self
    }

    pub fn depends_on(mut self, revision: impl Into<String>) -> Self {
        self.depends_on.push(revision.into());
        self
    }

    pub fn upgrade(mut self, sql: impl Into<String>) -> Self {
        self.upgrade = sql.into();
        self
    }

    pub fn downgrade(mut self, sql: impl Into<String>) -> Self {
        self.downgrade = sql.into();
        self
    }

    pub fn is_base(&self) -> bool {
        self.down_revisions.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.down_revisions.len() > 1
    }

    /// Parses a revision script.
    pub fn parse(source: &str) -> Result<Self> {
        let mut revision = Revision::default();
        let mut has_id = false;
        let mut section = Section::Header;
        let mut upgrade = Vec::new();
        let mut downgrade = Vec::new();

        for (number, line) in source.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.eq_ignore_ascii_case(UPGRADE_MARKER) {
                section = Section::Upgrade;
                continue;
            }
            if trimmed.eq_ignore_ascii_case(DOWNGRADE_MARKER) {
                section = Section::Downgrade;
                continue;
            }

            match section {
                Section::Upgrade => upgrade.push(line),
                Section::Downgrade => downgrade.push(line),
                Section::Header => {
                    let Some(comment) = trimmed.strip_prefix("--") else {
                        continue;
                    };
                    let Some((key, value)) = comment.split_once(':') else {
                        continue;
                    };
                    let value = value.trim();

                    match key.trim() {
                        "revision" => {
                            revision.id = value.to_string();
                            has_id = !value.is_empty();
                        }
                        "down_revision" => revision.down_revisions = parse_list(value),
                        "branch_labels" => revision.branch_labels = parse_list(value),
                        "depends_on" => revision.depends_on = parse_list(value),
                        "message" => revision.message = value.to_string(),
                        "create_date" => {
                            revision.create_date = (!value.is_empty()).then(|| value.to_string())
                        }
                        other => {
                            return Err(MigrationError::UnknownHeader {
                                key: other.to_string(),
                                line: number + 1,
                            })
                        }
                    }
                }
            }
        }

        if !has_id {
            return Err(MigrationError::MissingHeader("revision"));
        }
        if section == Section::Header {
            return Err(MigrationError::MissingSection("upgrade"));
        }

        revision.upgrade = upgrade.join("\n").trim().to_string();
        revision.downgrade = downgrade.join("\n").trim().to_string();
        Ok(revision)
    }

    /// Renders the script back to its file form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- revision: {}\n", self.id));
        out.push_str(&format!("-- down_revision: {}\n", self.down_revisions.join(", ")));
        out.push_str(&format!("-- branch_labels: {}\n", self.branch_labels.join(", ")));
        out.push_str(&format!("-- depends_on: {}\n", self.depends_on.join(", ")));
        out.push_str(&format!("-- message: {}\n", self.message));
        if let Some(date) = &self.create_date {
            out.push_str(&format!("-- create_date: {date}\n"));
        }
        out.push('\n');
        out.push_str(UPGRADE_MARKER);
        out.push('\n');
        if !self.upgrade.is_empty() {
            out.push_str(&self.upgrade);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(DOWNGRADE_MARKER);
        out.push('\n');
        if !self.downgrade.is_empty() {
            out.push_str(&self.downgrade);
            out.push('\n');
        }
        out
    }

    /// One-line summary: `<parents> -> <id> (labels), <message>`.
    pub fn summary(&self) -> String {
        let parents = if self.down_revisions.is_empty() {
            "<base>".to_string()
        } else {
            self.down_revisions.join(", ")
        };
        let labels = if self.branch_labels.is_empty() {
            String::new()
        } else {
            format!(" ({})", self.branch_labels.join(", "))
        };
        format!("{parents} -> {}{labels}, {}", self.id, self.message)
    }
}
