//! The context bundle every persona prompt is built from.
//!
//! Each piece (README, manifest, directory listing, GitHub data) is fetched
//! independently; a missing or failing piece leaves its field empty and
//! never aborts the build.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;
use crate::github::{parse_repo_url, Issue, PullRequest, RepoHost};
use crate::io::read_optional;
use crate::model::Project;
use crate::store::Store;

/// Manifests tried in order; the first readable one wins.
const MANIFEST_FILES: &[&str] = &["package.json", "Cargo.toml", "pyproject.toml", "go.mod"];

/// Directories never listed in the code structure.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "vendor",
    "__pycache__",
    "venv",
    "dist",
    "build",
];

const MAX_SUBDIR_ENTRIES: usize = 10;

pub const UNREADABLE_STRUCTURE: &str = "Unable to read project structure";

/// Dependency manifest found at the project root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Manifest {
    PackageJson { value: serde_json::Value },
    Text { file: String, content: String },
}

impl Manifest {
    /// Text embedded in prompts: pretty JSON for `package.json`, the raw
    /// file otherwise.
    pub fn render(&self) -> String {
        match self {
            Manifest::PackageJson { value } => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Manifest::Text { file, content } => format!("# {file}\n{content}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub name: String,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub readme: Option<String>,
    pub tech_stack: Vec<String>,
    pub code_structure: Option<String>,
    pub manifest: Option<Manifest>,
    pub open_prs: Vec<PullRequest>,
    pub open_issues: Vec<Issue>,
}

impl ProjectContext {
    /// Name and description only, for follow-up generation runs.
    pub fn minimal(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            description: project.description.clone(),
            ..Default::default()
        }
    }
}

/// First `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Filesystem pieces
// ---------------------------------------------------------------------------

async fn read_manifest(root: &Path) -> Option<Manifest> {
    for file in MANIFEST_FILES {
        let content = match read_optional(&root.join(file)).await {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(e) => {
                warn!(file, "manifest unreadable: {e}");
                continue;
            }
        };
        if *file == "package.json" {
            match serde_json::from_str(&content) {
                Ok(value) => return Some(Manifest::PackageJson { value }),
                Err(e) => {
                    warn!("package.json is not valid JSON: {e}");
                    continue;
                }
            }
        }
        return Some(Manifest::Text {
            file: file.to_string(),
            content,
        });
    }
    None
}

fn is_listed(name: &str) -> bool {
    !name.starts_with('.')
}

async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        out.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    out.sort();
    Ok(out)
}

/// Two-level listing: root entries, and up to ten entries under each root
/// directory. Hidden entries and dependency caches are left out.
pub async fn code_structure(root: &Path) -> std::io::Result<String> {
    let mut lines = Vec::new();
    for (name, is_dir) in sorted_entries(root).await? {
        if !is_listed(&name) {
            continue;
        }
        if !is_dir {
            lines.push(format!("📄 {name}"));
            continue;
        }
        if SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }
        lines.push(format!("📁 {name}/"));
        match sorted_entries(&root.join(&name)).await {
            Ok(children) => {
                for (child, child_is_dir) in children
                    .into_iter()
                    .filter(|(n, _)| is_listed(n))
                    .take(MAX_SUBDIR_ENTRIES)
                {
                    let icon = if child_is_dir { "📁" } else { "📄" };
                    lines.push(format!("  {icon} {child}"));
                }
            }
            Err(e) => debug!(dir = %name, "skipping unreadable subdirectory: {e}"),
        }
    }
    Ok(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assemble the context bundle for `project`.
///
/// When the project's repository URL names a GitHub repo, its owner/repo are
/// recorded on the project before GitHub is queried. Only that store write
/// can fail the build.
pub async fn build_project_context(
    store: &Store,
    host: &dyn RepoHost,
    project: &Project,
) -> Result<ProjectContext> {
    let root = Path::new(&project.path);
    let mut context = ProjectContext::minimal(project);
    context.repo_url = project.repo_url.clone();

    context.readme = match read_optional(&root.join("README.md")).await {
        Ok(readme) => readme,
        Err(e) => {
            warn!(project = %project.name, "README unreadable: {e}");
            None
        }
    };
    context.manifest = read_manifest(root).await;
    context.code_structure = Some(match code_structure(root).await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(project = %project.name, "cannot list project: {e}");
            UNREADABLE_STRUCTURE.to_string()
        }
    });

    let Some(slug) = project.repo_url.as_deref().and_then(parse_repo_url) else {
        return Ok(context);
    };
    store.set_github_ids(&project.id, &slug.owner, &slug.repo)?;

    let (prs, issues, info) = tokio::join!(
        host.open_pull_requests(&slug),
        host.open_issues(&slug),
        host.repo_info(&slug),
    );
    match prs {
        Ok(prs) => context.open_prs = prs,
        Err(e) => warn!(repo = %slug.repo, "open pull requests unavailable: {e}"),
    }
    match issues {
        Ok(issues) => context.open_issues = issues,
        Err(e) => warn!(repo = %slug.repo, "open issues unavailable: {e}"),
    }
    match info {
        Ok(info) => {
            if context.description.is_none() {
                context.description = info.description.filter(|d| !d.trim().is_empty());
            }
            if !info.topics.is_empty() {
                context.tech_stack = info.topics;
            }
        }
        Err(e) => warn!(repo = %slug.repo, "repository info unavailable: {e}"),
    }
    debug!(
        project = %project.name,
        prs = context.open_prs.len(),
        issues = context.open_issues.len(),
        "GitHub context gathered"
    );
    Ok(context)
}
