//! Mining actionable tasks out of a project's markdown files.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::types::Priority;

/// Files checked at fixed locations before the root `*.md` sweep.
pub const TASK_FILES: &[&str] = &[
    "README.md",
    "TODO.md",
    "TASKS.md",
    "CONTRIBUTING.md",
    "ROADMAP.md",
    "CHANGELOG.md",
    ".github/ISSUE_TEMPLATE.md",
    "docs/TODO.md",
    "docs/ROADMAP.md",
];

const HIGH_KEYWORDS: &[&str] = &[
    "urgent", "critical", "important", "asap", "priority", "!!!", "bug", "fix",
];

const LOW_KEYWORDS: &[&str] = &["nice to have", "maybe", "consider", "optional", "minor"];

const VALUABLE_KEYWORDS: &[&str] = &[
    "implement",
    "create",
    "build",
    "develop",
    "design",
    "integrate",
    "migrate",
    "deploy",
    "setup",
    "configure",
    "optimize",
    "refactor",
    "api",
    "endpoint",
    "database",
    "authentication",
    "security",
    "performance",
    "bug",
    "fix",
    "issue",
    "feature",
    "functionality",
];

const MIN_TASK_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    /// Path of the file the task came from, relative to the project root.
    pub source: String,
    pub is_completed: bool,
}

/// Tasks mined from a project plus the text of every file they came from.
#[derive(Debug, Clone, Default)]
pub struct MarkdownScan {
    pub tasks: Vec<ExtractedTask>,
    pub files: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn unchecked_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[\s-]*\[ \]\s+(.+)$").expect("valid regex"))
}

fn checked_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^[\s-]*\[x\]\s+(.+)$").expect("valid regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)(TODO|FIXME|NOTE|HACK):\s*(.+)$").expect("valid regex"))
}

fn fluff_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)^(add|update|improve|fix|enhance)\s*(more|some|the|a)?\s*$",
            r"(?i)^(tbd|tba|placeholder|example)$",
            r"^[A-Za-z0-9_\s]{1,5}$",
            r"(?i)^(test|testing)$",
            r"\?\?\?",
            r"^\s*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

fn concrete_detail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(file|function|component|module|class|method)\b").expect("valid regex")
    })
}

fn technology_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(react|node|python|typescript|docker|kubernetes|redis|postgres)\b")
            .expect("valid regex")
    })
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// A candidate survives when it is not fluff, has at least ten characters,
/// and mentions something concrete.
pub fn is_valuable_task(text: &str) -> bool {
    let trimmed = text.trim();
    if fluff_res().iter().any(|re| re.is_match(trimmed)) {
        return false;
    }
    if trimmed.chars().count() < MIN_TASK_CHARS {
        return false;
    }
    let lower = trimmed.to_lowercase();
    VALUABLE_KEYWORDS.iter().any(|k| lower.contains(k))
        || concrete_detail_re().is_match(trimmed)
        || technology_re().is_match(trimmed)
        || HIGH_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn infer_priority(text: &str) -> Priority {
    let lower = text.to_lowercase();
    if HIGH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Priority::High
    } else if LOW_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Priority::Low
    } else {
        Priority::Medium
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Mine one file: unchecked items, checked items, then TODO-style comments.
pub fn extract_tasks(content: &str, source: &str) -> Vec<ExtractedTask> {
    let mut tasks = Vec::new();

    for (re, is_completed) in [(unchecked_re(), false), (checked_re(), true)] {
        for caps in re.captures_iter(content) {
            let text = caps[1].trim();
            if is_valuable_task(text) {
                tasks.push(ExtractedTask {
                    title: text.to_string(),
                    description: None,
                    priority: infer_priority(text),
                    source: source.to_string(),
                    is_completed,
                });
            }
        }
    }

    for caps in comment_re().captures_iter(content) {
        let keyword = caps[1].to_uppercase();
        let text = caps[2].trim();
        if !is_valuable_task(text) {
            continue;
        }
        let priority = if keyword == "FIXME" {
            Priority::High
        } else {
            Priority::Medium
        };
        tasks.push(ExtractedTask {
            title: text.to_string(),
            description: Some(format!("From {keyword} in {source}")),
            priority,
            source: source.to_string(),
            is_completed: false,
        });
    }

    tasks
}

/// Well-known task files that exist, then any other non-hidden root `*.md`.
pub async fn find_markdown_files(project_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for name in TASK_FILES {
        let path = project_root.join(name);
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            files.push(path);
        }
    }

    match tokio::fs::read_dir(project_root).await {
        Ok(mut entries) => loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %project_root.display(), "stopped listing markdown files: {e}");
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_file && name.ends_with(".md") && !name.starts_with('.') {
                let path = entry.path();
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        },
        Err(e) => warn!(path = %project_root.display(), "cannot list project root: {e}"),
    }

    files
}

/// Mine every markdown file of a project. Unreadable files are skipped.
pub async fn extract_tasks_from_project(project_root: &Path) -> MarkdownScan {
    let mut scan = MarkdownScan::default();
    for path in find_markdown_files(project_root).await {
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable markdown file: {e}");
                continue;
            }
        };
        let source = relative_name(project_root, &path);
        let tasks = extract_tasks(&content, &source);
        debug!(source, found = tasks.len(), "mined markdown tasks");
        scan.tasks.extend(tasks);
        scan.files.insert(source, content);
    }
    scan
}

pub(crate) fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
