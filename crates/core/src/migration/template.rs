//! Revision ids and revision file names.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use uuid::Uuid;

pub const DEFAULT_FILE_TEMPLATE: &str = "{year}{month}{day}_{rev}_{slug}";
pub const DEFAULT_TRUNCATE_SLUG_LENGTH: usize = 40;

/// Generates a new 12 hex digit revision id.
pub fn new_revision_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Turns a message into a file name slug.
///
/// Words are lowercased and joined with `_`. A slug longer than
/// `max_length` is cut back to its last complete word and ends with `_`.
pub fn slugify(message: &str, max_length: usize) -> String {
    let slug = message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    if slug.chars().count() <= max_length {
        return slug;
    }

    let truncated: String = slug.chars().take(max_length).collect();
    match truncated.rsplit_once('_') {
        Some((head, _)) => format!("{head}_"),
        None => format!("{truncated}_"),
    }
}

/// Renders revision file names from a template.
///
/// Placeholders: `{rev}`, `{slug}`, `{epoch}`, `{year}`, `{month}`,
/// `{day}`, `{hour}`, `{minute}`, `{second}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTemplate {
    template: String,
    truncate_slug_length: usize,
}

impl Default for FileTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_TEMPLATE, DEFAULT_TRUNCATE_SLUG_LENGTH)
    }
}

impl FileTemplate {
    pub fn new(template: impl Into<String>, truncate_slug_length: usize) -> Self {
        Self {
            template: template.into(),
            truncate_slug_length,
        }
    }

    /// Returns the file name, `.sql` extension included.
    pub fn render<Tz: TimeZone>(&self, rev: &str, message: &str, date: &DateTime<Tz>) -> String {
        let name = self
            .template
            .replace("{rev}", rev)
            .replace("{slug}", &slugify(message, self.truncate_slug_length))
            .replace("{epoch}", &date.timestamp().to_string())
            .replace("{year}", &format!("{:04}", date.year()))
            .replace("{month}", &format!("{:02}", date.month()))
            .replace("{day}", &format!("{:02}", date.day()))
            .replace("{hour}", &format!("{:02}", date.hour()))
            .replace("{minute}", &format!("{:02}", date.minute()))
            .replace("{second}", &format!("{:02}", date.second()));

        format!("{}.sql", name.trim_end_matches('_'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_new_revision_id() {
        let id = new_revision_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_revision_id());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create account table", 40), "create_account_table");
        assert_eq!(slugify("  add: user's e-mail!", 40), "add_user_s_e_mail");
        assert_eq!(slugify("", 40), "");
    }

    #[test]
    fn test_slugify_truncates_on_word_boundary() {
        assert_eq!(slugify("create account table", 10), "create_");
        assert_eq!(slugify("abcdefghijkl", 5), "abcde_");
    }

    #[test]
    fn test_render_default_template() {
        let date = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        let name = FileTemplate::default().render("1975ea83b712", "Create account table", &date);
        assert_eq!(name, "20260307_1975ea83b712_create_account_table.sql");
    }

    #[test]
    fn test_render_custom_template_without_message() {
        let date = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        let template = FileTemplate::new("{hour}{minute}{second}_{rev}_{slug}", 40);
        assert_eq!(template.render("abc", "", &date), "090501_abc.sql");
    }
}
