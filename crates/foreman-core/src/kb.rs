//! Knowledge-base mining: turning a project's documentation into documents.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::markdown::relative_name;

/// Root files that are documentation by convention.
pub const KB_FILES: &[&str] = &[
    "README.md",
    "CONTRIBUTING.md",
    "ARCHITECTURE.md",
    "API.md",
    "SETUP.md",
    "DEPLOYMENT.md",
    "TROUBLESHOOTING.md",
    "FAQ.md",
    "GUIDE.md",
    "TUTORIAL.md",
];

pub const KB_DIRS: &[&str] = &["docs", "documentation", "wiki"];

pub const MAX_DEPTH: usize = 3;

/// Trimmed content shorter than this is not worth a document.
pub const MIN_CONTENT_CHARS: usize = 50;

const CODE_LANGUAGES: &[&str] = &[
    "javascript",
    "typescript",
    "python",
    "go",
    "rust",
    "java",
    "ruby",
    "php",
    "c",
    "cpp",
    "csharp",
];

/// Filename fragment → tag.
const FILENAME_TAGS: &[(&str, &str)] = &[
    ("readme", "getting-started"),
    ("api", "api"),
    ("guide", "guide"),
    ("tutorial", "tutorial"),
    ("setup", "setup"),
    ("deploy", "deployment"),
    ("troubleshoot", "troubleshooting"),
    ("faq", "faq"),
    ("contributing", "contributing"),
    ("changelog", "changelog"),
    ("architecture", "architecture"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Path relative to the project root.
    pub source: String,
    pub filename: String,
}

fn h1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid regex"))
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(\w+)").expect("valid regex"))
}

/// First H1 heading, else the filename without `.md` and with `-`/`_` as
/// spaces.
pub fn extract_title(content: &str, filename: &str) -> String {
    if let Some(caps) = h1_re().captures(content) {
        let title = caps[1].trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }
    let stem = if filename.to_ascii_lowercase().ends_with(".md") {
        &filename[..filename.len() - 3]
    } else {
        filename
    };
    stem.replace(['-', '_'], " ")
}

/// Tags from the top-level directory, filename keywords and fenced code
/// languages, in first-seen order without repeats.
pub fn extract_tags(content: &str, filename: &str, relative_path: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut add = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    if let Some((dir, _)) = relative_path.split_once('/') {
        if !dir.is_empty() && dir != "." {
            add(dir);
        }
    }

    let lower = filename.to_lowercase();
    for (needle, tag) in FILENAME_TAGS {
        if lower.contains(needle) {
            add(tag);
        }
    }

    for caps in code_fence_re().captures_iter(content) {
        let lang = caps[1].to_lowercase();
        if CODE_LANGUAGES.contains(&lang.as_str()) {
            add(&lang);
        }
    }

    tags
}

/// Lowercase, collapse runs of anything but `a-z0-9` into `-`, trim dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// First non-heading line longer than 20 characters, capped at 200, else
/// `"Documentation"`.
pub fn fallback_summary(content: &str) -> String {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .find(|l| !l.starts_with('#') && l.chars().count() > 20)
        .map(|l| l.chars().take(200).collect())
        .unwrap_or_else(|| "Documentation".to_string())
}

/// Markdown files under `dir`, at most [`MAX_DEPTH`] levels, skipping
/// hidden entries. Sorted for stable output.
async fn find_markdown_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), 0usize)];
    while let Some((current, depth)) = pending.pop() {
        if depth >= MAX_DEPTH {
            continue;
        }
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %current.display(), "skipping unreadable directory: {e}");
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                pending.push((entry.path(), depth + 1));
            } else if file_type.is_file() && name.ends_with(".md") {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    found
}

pub async fn find_kb_files(project_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for name in KB_FILES {
        let path = project_root.join(name);
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            files.push(path);
        }
    }
    for dir in KB_DIRS {
        let path = project_root.join(dir);
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            files.extend(find_markdown_recursive(&path).await);
        }
    }
    files
}

/// One document per qualifying file. Unreadable files are skipped.
pub async fn extract_documents(project_root: &Path) -> Vec<ExtractedDocument> {
    let mut documents = Vec::new();
    for path in find_kb_files(project_root).await {
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable document: {e}");
                continue;
            }
        };
        if content.trim().chars().count() < MIN_CONTENT_CHARS {
            continue;
        }
        let source = relative_name(project_root, &path);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.clone());
        documents.push(ExtractedDocument {
            title: extract_title(&content, &filename),
            tags: extract_tags(&content, &filename, &source),
            content,
            source,
            filename,
        });
    }
    documents
}
