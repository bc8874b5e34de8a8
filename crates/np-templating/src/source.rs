//! Where template and note text comes from.
//!
//! The pipeline never reads files or talks to a host application itself.
//! It asks a [`TemplateSource`] for the raw text of a named template and a
//! [`NoteSource`] for the text of notes and calendar notes. A miss is
//! `None`; the caller decides what to put in the output instead.
//!
//! Two implementations are provided:
//!
//! - [`InMemorySource`]: maps filled through a builder, for tests and for
//!   embedders that already hold their templates in memory.
//! - [`DirectorySource`]: files under a root directory.
//!
//! # Directory Layout
//!
//! ```text
//! root/
//! ├── Daily.md                 template "Daily"
//! ├── parts/header.txt         template "parts/header"
//! ├── Notes/Projects/Plan.md   note "Projects/Plan" or "Plan"
//! └── Calendar/20240105.md     calendar note "20240105" or "2024-01-05"
//! ```
//!
//! Names resolve with or without one of [`TEMPLATE_EXTENSIONS`], the first
//! extension in the list winning when several files share a base name.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// Recognized template and note file extensions in priority order.
pub const TEMPLATE_EXTENSIONS: &[&str] = &[".md", ".txt"];

static CALENDAR_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{8}|\d{4}-\d{2}-\d{2})$").expect("calendar date pattern is valid")
});

/// Provides the raw text of named templates.
pub trait TemplateSource: Send + Sync {
    /// Returns the template's text, or `None` if there is no such template.
    ///
    /// `silent` asks the source not to warn about a miss.
    fn template_text(&self, name: &str, silent: bool) -> Option<String>;
}

/// Provides the raw text of notes and calendar notes.
pub trait NoteSource: Send + Sync {
    /// Calendar note for a `YYYYMMDD` or `YYYY-MM-DD` key.
    fn calendar_note_text(&self, date_key: &str) -> Option<String>;

    /// Note addressed by relative path or by title.
    fn note_text(&self, path_or_title: &str) -> Option<String>;
}

/// True iff `name` is an 8-digit or hyphenated ISO date.
pub fn is_calendar_date(name: &str) -> bool {
    CALENDAR_DATE.is_match(name.trim())
}

/// Canonical `YYYYMMDD` form of a calendar key.
pub fn normalize_date_key(key: &str) -> String {
    let key = key.trim();
    if is_calendar_date(key) {
        key.replace('-', "")
    } else {
        key.to_string()
    }
}

fn report_miss(kind: &str, name: &str, silent: bool) {
    if !silent {
        tracing::warn!(kind, name, "not found");
    }
}

/// Sources backed by in-memory maps.
///
/// # Example
///
/// ```rust
/// use np_templating::{InMemorySource, NoteSource, TemplateSource};
///
/// let source = InMemorySource::new()
///     .with_template("header", "# <%= title %>")
///     .with_calendar_note("20240105", "- [ ] call Ada");
///
/// assert_eq!(source.template_text("header", true).as_deref(), Some("# <%= title %>"));
/// assert!(source.calendar_note_text("2024-01-05").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    templates: HashMap<String, String>,
    notes: HashMap<String, String>,
    calendar_notes: HashMap<String, String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.add_template(name, text);
        self
    }

    pub fn with_note(mut self, path_or_title: impl Into<String>, text: impl Into<String>) -> Self {
        self.notes.insert(path_or_title.into(), text.into());
        self
    }

    pub fn with_calendar_note(mut self, date_key: &str, text: impl Into<String>) -> Self {
        self.calendar_notes
            .insert(normalize_date_key(date_key), text.into());
        self
    }

    /// Adds or replaces a template.
    pub fn add_template(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateSource for InMemorySource {
    fn template_text(&self, name: &str, silent: bool) -> Option<String> {
        let text = self.templates.get(name).cloned();
        if text.is_none() {
            report_miss("template", name, silent);
        }
        text
    }
}

impl NoteSource for InMemorySource {
    fn calendar_note_text(&self, date_key: &str) -> Option<String> {
        let text = self.calendar_notes.get(&normalize_date_key(date_key)).cloned();
        if text.is_none() {
            report_miss("calendar note", date_key, false);
        }
        text
    }

    fn note_text(&self, path_or_title: &str) -> Option<String> {
        let text = self.notes.get(path_or_title).cloned();
        if text.is_none() {
            report_miss("note", path_or_title, false);
        }
        text
    }
}

/// Sources backed by files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    templates_dir: PathBuf,
    notes_dir: PathBuf,
    calendar_dir: PathBuf,
}

/// Rejects names that would escape the directory they are looked up in.
fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Reads `dir/name` as given, then with each recognized extension.
fn read_with_extensions(dir: &Path, name: &str) -> Option<String> {
    if !is_relative_name(name) {
        return None;
    }

    let exact = dir.join(name);
    let has_extension = TEMPLATE_EXTENSIONS.iter().any(|ext| name.ends_with(ext));
    if has_extension && exact.is_file() {
        return fs::read_to_string(&exact).ok();
    }

    TEMPLATE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}{}", name, ext)))
        .find(|path| path.is_file())
        .and_then(|path| fs::read_to_string(path).ok())
}

/// Finds a note file anywhere under `dir` whose file stem is `title`.
fn find_by_stem(dir: &Path, title: &str) -> Option<PathBuf> {
    let mut pending = vec![dir.to_path_buf()];
    let mut found: Vec<PathBuf> = Vec::new();

    while let Some(current) = pending.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_stem().and_then(|s| s.to_str()) == Some(title)
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&format!(".{}", e).as_str()))
            {
                found.push(path);
            }
        }
    }

    // Directory iteration order is unspecified.
    found.sort();
    found.into_iter().next()
}

impl DirectorySource {
    /// Templates at the root, notes under `Notes/`, calendar notes under
    /// `Calendar/`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            templates_dir: root.to_path_buf(),
            notes_dir: root.join("Notes"),
            calendar_dir: root.join("Calendar"),
        }
    }
}

impl TemplateSource for DirectorySource {
    fn template_text(&self, name: &str, silent: bool) -> Option<String> {
        let text = read_with_extensions(&self.templates_dir, name.trim());
        if text.is_none() {
            report_miss("template", name, silent);
        }
        text
    }
}

impl NoteSource for DirectorySource {
    fn calendar_note_text(&self, date_key: &str) -> Option<String> {
        let text = read_with_extensions(&self.calendar_dir, &normalize_date_key(date_key));
        if text.is_none() {
            report_miss("calendar note", date_key, false);
        }
        text
    }

    fn note_text(&self, path_or_title: &str) -> Option<String> {
        let name = path_or_title.trim();
        let text = read_with_extensions(&self.notes_dir, name).or_else(|| {
            if !is_relative_name(name) || name.contains('/') {
                return None;
            }
            find_by_stem(&self.notes_dir, name).and_then(|path| fs::read_to_string(path).ok())
        });
        if text.is_none() {
            report_miss("note", path_or_title, false);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Date keys
    // =========================================================================

    #[test]
    fn calendar_date_patterns() {
        assert!(is_calendar_date("20240105"));
        assert!(is_calendar_date("2024-01-05"));
        assert!(!is_calendar_date("2024015"));
        assert!(!is_calendar_date("Daily"));
        assert_eq!(normalize_date_key("2024-01-05"), "20240105");
        assert_eq!(normalize_date_key("Daily-Note"), "Daily-Note");
    }

    // =========================================================================
    // InMemorySource
    // =========================================================================

    #[test]
    fn in_memory_lookup() {
        let source = InMemorySource::new()
            .with_template("a", "A")
            .with_note("Projects/Plan", "plan")
            .with_calendar_note("2024-01-05", "day");

        assert_eq!(source.len(), 1);
        assert_eq!(source.template_text("a", false).as_deref(), Some("A"));
        assert_eq!(source.template_text("b", true), None);
        assert_eq!(source.note_text("Projects/Plan").as_deref(), Some("plan"));
        assert_eq!(source.calendar_note_text("20240105").as_deref(), Some("day"));
    }

    #[test]
    fn in_memory_overwrites() {
        let mut source = InMemorySource::new().with_template("a", "first");
        source.add_template("a", "second");
        assert_eq!(source.template_text("a", true).as_deref(), Some("second"));
    }

    // =========================================================================
    // DirectorySource
    // =========================================================================

    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("parts")).unwrap();
        fs::create_dir_all(root.join("Notes/Projects")).unwrap();
        fs::create_dir_all(root.join("Calendar")).unwrap();

        fs::write(root.join("Daily.md"), "daily md").unwrap();
        fs::write(root.join("Daily.txt"), "daily txt").unwrap();
        fs::write(root.join("parts/header.txt"), "header").unwrap();
        fs::write(root.join("Notes/Projects/Plan.md"), "plan").unwrap();
        fs::write(root.join("Calendar/20240105.md"), "day").unwrap();
        dir
    }

    #[test]
    fn directory_templates_with_and_without_extension() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.template_text("Daily", true).as_deref(), Some("daily md"));
        assert_eq!(source.template_text("Daily.txt", true).as_deref(), Some("daily txt"));
        assert_eq!(source.template_text("parts/header", true).as_deref(), Some("header"));
        assert_eq!(source.template_text("missing", true), None);
    }

    #[test]
    fn directory_rejects_escaping_names() {
        let dir = layout();
        let source = DirectorySource::new(dir.path().join("parts"));
        assert_eq!(source.template_text("../Daily", true), None);
        assert_eq!(source.template_text("/etc/passwd", true), None);
    }

    #[test]
    fn directory_notes_by_path_and_title() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.note_text("Projects/Plan").as_deref(), Some("plan"));
        assert_eq!(source.note_text("Plan").as_deref(), Some("plan"));
        assert_eq!(source.note_text("Nope"), None);
    }

    #[test]
    fn directory_calendar_notes() {
        let dir = layout();
        let source = DirectorySource::new(dir.path());
        assert_eq!(source.calendar_note_text("20240105").as_deref(), Some("day"));
        assert_eq!(source.calendar_note_text("2024-01-05").as_deref(), Some("day"));
        assert_eq!(source.calendar_note_text("20240106"), None);
    }
}
