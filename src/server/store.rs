//! Filesystem store for markdown documents.
//!
//! Layout under the root directory:
//! - `<name>.md` — the documents themselves
//! - `.meta/<name>.md.json` — category/tag/timestamp sidecars
//! - `.versions/<name>.md/<timestamp>.md` — pre-edit snapshots
//!
//! Documents are addressed as `markdown://<file-name>` by callers.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const URI_SCHEME: &str = "markdown://";

const META_DIR: &str = ".meta";
const VERSION_DIR: &str = ".versions";

#[derive(Debug)]
pub enum StoreError {
    /// Caller passed something unusable.
    InvalidParams(String),
    /// The addressed document does not exist.
    NotFound(String),
    /// Filesystem trouble.
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidParams(message) => write!(f, "{message}"),
            StoreError::NotFound(message) => write!(f, "{message}"),
            StoreError::Io(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Sidecar metadata. Serialized as camelCase JSON next to the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentMeta {
    fn fresh() -> Self {
        let now = now_iso();
        DocumentMeta {
            categories: None,
            tags: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub file_name: String,
    pub size: u64,
    pub meta: DocumentMeta,
}

/// One document matched by a search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub file_name: String,
    /// Up to ten matching lines, each prefixed with `> `.
    pub matches: Vec<String>,
    pub meta: DocumentMeta,
}

pub struct MarkdownStore {
    root: PathBuf,
}

impl MarkdownStore {
    /// Opens the store, creating the root and its sidecar directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(META_DIR))?;
        fs::create_dir_all(root.join(VERSION_DIR))?;
        Ok(MarkdownStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new document. The file name is derived from the title and
    /// stamped with the current time so repeated titles do not collide.
    pub fn create(
        &self,
        title: &str,
        content: &str,
        categories: Option<Vec<String>>,
        tags: Option<Vec<String>>,
    ) -> Result<(String, DocumentMeta), StoreError> {
        if title.trim().is_empty() || content.is_empty() {
            return Err(StoreError::InvalidParams(
                "title and content must not be empty".to_string(),
            ));
        }

        let file_name = format!(
            "{}-{}.md",
            slugify_title(title),
            Utc::now().timestamp_millis()
        );
        fs::write(self.root.join(&file_name), content)?;

        let mut meta = DocumentMeta::fresh();
        meta.categories = categories;
        meta.tags = tags;
        self.save_meta(&file_name, &meta)?;
        Ok((file_name, meta))
    }

    pub fn read(&self, file_name: &str) -> Result<(String, DocumentMeta), StoreError> {
        let path = self.document_path(file_name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "document {file_name} not found"
            )));
        }
        let content = fs::read_to_string(path)?;
        Ok((content, self.read_meta(file_name)))
    }

    /// Replaces a document's content, snapshotting the previous revision
    /// under `.versions/` first.
    pub fn update(&self, file_name: &str, content: &str) -> Result<DocumentMeta, StoreError> {
        let path = self.document_path(file_name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "document {file_name} not found"
            )));
        }
        let previous = fs::read_to_string(&path)?;
        self.save_version(file_name, &previous)?;
        fs::write(&path, content)?;

        let mut meta = self.read_meta(file_name);
        meta.updated_at = now_iso();
        self.save_meta(file_name, &meta)?;
        Ok(meta)
    }

    /// Removes a document and its metadata sidecar. Version snapshots are
    /// kept.
    pub fn delete(&self, file_name: &str) -> Result<(), StoreError> {
        let path = self.document_path(file_name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "document {file_name} not found"
            )));
        }
        fs::remove_file(path)?;
        let meta_path = self.meta_path(file_name);
        if meta_path.exists() {
            fs::remove_file(meta_path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<DocumentEntry>, StoreError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".md") || !entry.file_type()?.is_file() {
                continue;
            }
            let size = entry.metadata()?.len();
            entries.push(DocumentEntry {
                meta: self.read_meta(&name),
                file_name: name,
                size,
            });
        }
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    /// Fuzzy full-text search: case, whitespace, and common punctuation are
    /// ignored on both sides of the match.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        if query.trim().is_empty() {
            return Err(StoreError::InvalidParams(
                "search query must not be empty".to_string(),
            ));
        }
        let needle = normalize_for_search(query);
        let mut hits = Vec::new();
        for entry in self.list()? {
            let content = fs::read_to_string(self.root.join(&entry.file_name))?;
            if !normalize_for_search(&content).contains(&needle) {
                continue;
            }
            let matches: Vec<String> = content
                .lines()
                .filter(|line| normalize_for_search(line).contains(&needle))
                .take(10)
                .map(|line| format!("> {line}"))
                .collect();
            hits.push(SearchHit {
                file_name: entry.file_name,
                matches,
                meta: entry.meta,
            });
        }
        Ok(hits)
    }

    pub fn update_meta(
        &self,
        file_name: &str,
        categories: Option<Vec<String>>,
        tags: Option<Vec<String>>,
    ) -> Result<DocumentMeta, StoreError> {
        self.document_path(file_name)?;
        let mut meta = self.read_meta(file_name);
        if categories.is_some() {
            meta.categories = categories;
        }
        if tags.is_some() {
            meta.tags = tags;
        }
        meta.updated_at = now_iso();
        self.save_meta(file_name, &meta)?;
        Ok(meta)
    }

    /// Snapshot file names for a document, newest first. Empty when the
    /// document was never edited.
    pub fn versions(&self, file_name: &str) -> Result<Vec<String>, StoreError> {
        self.document_path(file_name)?;
        let dir = self.root.join(VERSION_DIR).join(file_name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        // Timestamped names sort lexicographically in time order.
        versions.sort();
        versions.reverse();
        Ok(versions)
    }

    pub fn read_meta(&self, file_name: &str) -> DocumentMeta {
        let path = self.meta_path(file_name);
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(DocumentMeta::fresh)
    }

    fn save_meta(&self, file_name: &str, meta: &DocumentMeta) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(meta)
            .map_err(|err| StoreError::Io(err.to_string()))?;
        fs::write(self.meta_path(file_name), raw)?;
        Ok(())
    }

    fn save_version(&self, file_name: &str, content: &str) -> Result<(), StoreError> {
        let dir = self.root.join(VERSION_DIR).join(file_name);
        fs::create_dir_all(&dir)?;
        let timestamp = now_iso().replace([':', '.'], "-");
        fs::write(dir.join(format!("{timestamp}.md")), content)?;
        Ok(())
    }

    fn meta_path(&self, file_name: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{file_name}.json"))
    }

    /// Validates a file name and resolves it under the root. Names with
    /// path separators or parent references are rejected.
    fn document_path(&self, file_name: &str) -> Result<PathBuf, StoreError> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(StoreError::InvalidParams(format!(
                "invalid document name: {file_name}"
            )));
        }
        Ok(self.root.join(file_name))
    }
}

/// Strips a `markdown://` URI down to the underlying file name.
pub fn file_name_from_uri(uri: &str) -> Result<String, StoreError> {
    match uri.strip_prefix(URI_SCHEME) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(StoreError::InvalidParams(format!(
            "expected a markdown:// URI, got {uri}"
        ))),
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Keeps alphanumerics, hyphen, underscore, space, and CJK ideographs;
/// collapses whitespace to hyphens and lowercases the result.
fn slugify_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '-' | '_' | ' ')
                || ('\u{4e00}'..='\u{9fa5}').contains(c)
        })
        .collect();
    cleaned
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Lowercases and strips whitespace plus common ASCII and CJK punctuation.
fn normalize_for_search(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| {
            !c.is_whitespace()
                && !matches!(
                    c,
                    '，' | '。' | '！' | '？' | '、' | '；' | '：' | '“' | '”' | '"' | '\''
                        | '.' | ',' | ';' | ':'
                )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, MarkdownStore) {
        let dir = tempdir().unwrap();
        let store = MarkdownStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_writes_document_and_sidecar() {
        let (_dir, store) = store();
        let (file_name, meta) = store
            .create(
                "Project Notes",
                "# Notes\n",
                Some(vec!["work".to_string()]),
                None,
            )
            .unwrap();
        assert!(file_name.starts_with("project-notes-"));
        assert!(file_name.ends_with(".md"));
        assert_eq!(meta.categories.as_deref(), Some(&["work".to_string()][..]));

        let (content, read_back) = store.read(&file_name).unwrap();
        assert_eq!(content, "# Notes\n");
        assert_eq!(read_back.categories, meta.categories);
    }

    #[test]
    fn create_rejects_empty_title_or_content() {
        let (_dir, store) = store();
        assert!(matches!(
            store.create("  ", "content", None, None),
            Err(StoreError::InvalidParams(_))
        ));
        assert!(matches!(
            store.create("title", "", None, None),
            Err(StoreError::InvalidParams(_))
        ));
    }

    #[test]
    fn slug_strips_punctuation_and_keeps_cjk() {
        assert_eq!(slugify_title("Hello, World!"), "hello-world");
        assert_eq!(slugify_title("会议记录 Q3"), "会议记录-q3");
        assert_eq!(slugify_title("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn update_snapshots_previous_revision() {
        let (_dir, store) = store();
        let (file_name, _) = store.create("draft", "first", None, None).unwrap();
        assert!(store.versions(&file_name).unwrap().is_empty());

        store.update(&file_name, "second").unwrap();
        let (content, _) = store.read(&file_name).unwrap();
        assert_eq!(content, "second");

        let versions = store.versions(&file_name).unwrap();
        assert_eq!(versions.len(), 1);
        let snapshot = store
            .root()
            .join(VERSION_DIR)
            .join(&file_name)
            .join(&versions[0]);
        assert_eq!(fs::read_to_string(snapshot).unwrap(), "first");
    }

    #[test]
    fn update_missing_document_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.update("missing.md", "content"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_document_and_sidecar() {
        let (_dir, store) = store();
        let (file_name, _) = store.create("gone", "soon", None, None).unwrap();
        store.delete(&file_name).unwrap();
        assert!(matches!(
            store.read(&file_name),
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.meta_path(&file_name).exists());
    }

    #[test]
    fn list_skips_sidecar_directories() {
        let (_dir, store) = store();
        store.create("one", "alpha", None, None).unwrap();
        store.create("two", "beta", None, None).unwrap();
        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.file_name.ends_with(".md")));
    }

    #[test]
    fn search_ignores_case_whitespace_and_punctuation() {
        let (_dir, store) = store();
        store
            .create("minutes", "Action Items:\n- review the budget, today\n", None, None)
            .unwrap();
        let hits = store.search("REVIEW the Budget").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matches.len(), 1);
        assert!(hits[0].matches[0].starts_with("> "));

        assert!(store.search("nothing like this").unwrap().is_empty());
    }

    #[test]
    fn search_caps_matched_lines_at_ten() {
        let (_dir, store) = store();
        let body = "needle\n".repeat(25);
        store.create("haystack", &body, None, None).unwrap();
        let hits = store.search("needle").unwrap();
        assert_eq!(hits[0].matches.len(), 10);
    }

    #[test]
    fn update_meta_merges_fields() {
        let (_dir, store) = store();
        let (file_name, _) = store
            .create("tagged", "body", Some(vec!["work".to_string()]), None)
            .unwrap();
        let meta = store
            .update_meta(&file_name, None, Some(vec!["urgent".to_string()]))
            .unwrap();
        assert_eq!(meta.categories.as_deref(), Some(&["work".to_string()][..]));
        assert_eq!(meta.tags.as_deref(), Some(&["urgent".to_string()][..]));
    }

    #[test]
    fn uri_parsing_requires_the_scheme() {
        assert_eq!(
            file_name_from_uri("markdown://notes.md").unwrap(),
            "notes.md"
        );
        assert!(file_name_from_uri("file://notes.md").is_err());
        assert!(file_name_from_uri("markdown://").is_err());
    }

    #[test]
    fn traversal_names_are_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read("../escape.md"),
            Err(StoreError::InvalidParams(_))
        ));
    }
}
