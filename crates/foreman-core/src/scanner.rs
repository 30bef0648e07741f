//! Discovering git repositories on disk and importing them as projects.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{NewProject, Project};
use crate::projects::create_project;
use crate::store::Store;

const README_NAMES: &[&str] = &["README.md", "readme.md", "README.MD", "README", "readme"];

const DESCRIPTION_SCAN_LINES: usize = 20;
const DESCRIPTION_MAX_CHARS: usize = 200;

/// Name fragments marking one repo of a multi-repo product.
const CHILD_REPO_INDICATORS: &[&str] = &[
    "web",
    "frontend",
    "client",
    "ui",
    "app",
    "api",
    "backend",
    "server",
    "services",
    "mobile",
    "ios",
    "android",
    "docs",
    "documentation",
    "infra",
    "infrastructure",
    "terraform",
    "k8s",
    "deployment",
    "shared",
    "common",
    "lib",
    "packages",
    "admin",
    "dashboard",
];

/// Parent directory names that say nothing about the product.
const GENERIC_PARENTS: &[&str] = &["projects", "code", "repos", "git", "workspace", "dev", "work"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedProject {
    pub name: String,
    pub path: PathBuf,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    #[serde(skip)]
    pub readme: Option<String>,
    pub suggested_parent: Option<String>,
    pub is_likely_child: bool,
}

// ---------------------------------------------------------------------------
// Git metadata
// ---------------------------------------------------------------------------

fn ssh_remote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^git@([^:]+):").expect("valid regex"))
}

/// `git@host:o/r.git` → `https://host/o/r`; any `.git` suffix is dropped.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    let https = ssh_remote_re().replace(url, "https://$1/");
    https.trim_end_matches(".git").to_string()
}

/// The `origin` URL from a git config file's text.
pub fn origin_url(git_config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in git_config.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == r#"[remote "origin"]"#;
            continue;
        }
        if !in_origin {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "url" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

async fn has_git(dir: &Path) -> bool {
    tokio::fs::metadata(dir.join(".git")).await.is_ok()
}

async fn remote_url(dir: &Path) -> Option<String> {
    let config = tokio::fs::read_to_string(dir.join(".git").join("config"))
        .await
        .ok()?;
    origin_url(&config).map(|url| normalize_remote_url(&url))
}

// ---------------------------------------------------------------------------
// README
// ---------------------------------------------------------------------------

async fn read_readme(dir: &Path) -> Option<String> {
    for name in README_NAMES {
        if let Ok(content) = tokio::fs::read_to_string(dir.join(name)).await {
            return Some(content);
        }
    }
    None
}

/// First line in the opening twenty that is neither a heading nor an image,
/// capped at 200 characters.
pub fn readme_description(readme: &str) -> Option<String> {
    readme
        .lines()
        .take(DESCRIPTION_SCAN_LINES)
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(|l| l.chars().take(DESCRIPTION_MAX_CHARS).collect())
}

// ---------------------------------------------------------------------------
// Multi-repo detection
// ---------------------------------------------------------------------------

fn repo_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)github\.com[:/]([^/]+)/([^/.]+)").expect("valid regex"))
}

/// `(suggested parent, looks like a child repo)`.
///
/// A hosted repo named `<product>-<indicator>` suggests `<product>`;
/// otherwise a non-generic parent directory is the suggestion.
pub fn detect_multi_repo(
    name: &str,
    parent_dir: &str,
    repo_url: Option<&str>,
) -> (Option<String>, bool) {
    let lower = name.to_lowercase();
    let is_child_name = CHILD_REPO_INDICATORS.iter().any(|ind| {
        lower == *ind || lower.contains(&format!("-{ind}")) || lower.contains(&format!("_{ind}"))
    });

    let from_url = repo_url
        .and_then(|url| repo_name_re().captures(url))
        .and_then(|caps| {
            let repo = caps[2].to_string();
            CHILD_REPO_INDICATORS.iter().find_map(|ind| {
                repo.strip_suffix(&format!("-{ind}"))
                    .filter(|prefix| !prefix.is_empty())
                    .map(str::to_string)
            })
        });

    let parent_is_generic =
        parent_dir.is_empty() || GENERIC_PARENTS.contains(&parent_dir.to_lowercase().as_str());
    let likely_child = is_child_name || from_url.is_some();
    let suggested = from_url.or_else(|| (!parent_is_generic).then(|| parent_dir.to_string()));
    (suggested, likely_child)
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

async fn describe(dir: &Path, name: &str) -> ScannedProject {
    let readme = read_readme(dir).await;
    let repo_url = remote_url(dir).await;
    let parent_dir = dir
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (suggested_parent, is_likely_child) =
        detect_multi_repo(name, &parent_dir, repo_url.as_deref());
    ScannedProject {
        name: name.to_string(),
        path: dir.to_path_buf(),
        description: readme.as_deref().and_then(readme_description),
        repo_url,
        readme,
        suggested_parent,
        is_likely_child,
    }
}

/// `dir` itself when it is a git repository, otherwise each non-hidden
/// child directory that is one.
pub async fn scan_directory(dir: &Path) -> Result<Vec<ScannedProject>> {
    if has_git(dir).await {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.to_string_lossy().into_owned());
        return Ok(vec![describe(dir, &name).await]);
    }

    let mut children = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            continue;
        }
        children.push((name, entry.path()));
    }
    children.sort();

    let mut found = Vec::new();
    for (name, path) in children {
        if has_git(&path).await {
            found.push(describe(&path, &name).await);
        } else {
            debug!(path = %path.display(), "not a git repository");
        }
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanImport {
    pub scanned: usize,
    pub created: Vec<Project>,
    pub skipped: Vec<Project>,
    /// Parent projects created for multi-repo groups.
    pub parents: Vec<Project>,
    /// Ids of newly created projects (children and parents) to analyze.
    #[serde(skip)]
    pub to_analyze: Vec<String>,
}

/// Scan `dir` and record every new repository as a project.
///
/// Repositories sharing a suggested parent (two or more of them) are
/// grouped under a parent project, reusing a top-level project of that
/// name when one exists. Known paths are skipped.
pub async fn import_scan(store: &Store, dir: &Path) -> Result<ScanImport> {
    let scanned = scan_directory(dir).await?;
    let mut import = ScanImport {
        scanned: scanned.len(),
        ..Default::default()
    };

    let mut order: Vec<Option<String>> = Vec::new();
    let mut groups: HashMap<Option<String>, Vec<ScannedProject>> = HashMap::new();
    for project in scanned {
        let key = project.suggested_parent.clone();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(project);
    }

    for key in order {
        let Some(members) = groups.remove(&key) else {
            continue;
        };
        let parent = match &key {
            Some(parent_name) if members.len() > 1 => {
                Some(ensure_parent(store, parent_name, &members, &mut import)?)
            }
            _ => None,
        };

        for member in members {
            let path = member.path.to_string_lossy().into_owned();
            if let Some(existing) = store.get_project_by_path(&path)? {
                debug!(path, "already imported");
                import.skipped.push(existing);
                continue;
            }
            let project = create_project(
                store,
                &NewProject {
                    name: member.name,
                    path,
                    description: member.description,
                    repo_url: member.repo_url,
                    parent_project_id: parent.as_ref().map(|p| p.id.clone()),
                },
            )?;
            import.to_analyze.push(project.id.clone());
            import.created.push(project);
        }
    }

    info!(
        dir = %dir.display(),
        scanned = import.scanned,
        created = import.created.len(),
        skipped = import.skipped.len(),
        "scan imported"
    );
    Ok(import)
}

fn ensure_parent(
    store: &Store,
    name: &str,
    members: &[ScannedProject],
    import: &mut ScanImport,
) -> Result<Project> {
    if let Some(existing) = store.find_top_level_by_name(name)? {
        return Ok(existing);
    }
    let path = members[0]
        .path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(existing) = store.get_project_by_path(&path)? {
        warn!(path, "parent directory already tracked as a project, reusing it");
        return Ok(existing);
    }
    let parent = create_project(
        store,
        &NewProject {
            name: name.to_string(),
            path,
            description: Some(format!(
                "Multi-repo project with {} repositories",
                members.len()
            )),
            ..Default::default()
        },
    )?;
    import.to_analyze.push(parent.id.clone());
    import.parents.push(parent.clone());
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_repo(root: &Path, name: &str, origin: Option<&str>, readme: Option<&str>) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        if let Some(url) = origin {
            std::fs::write(
                dir.join(".git/config"),
                format!(
                    "[core]\n\tbare = false\n[remote \"upstream\"]\n\turl = https://x/y\n\
                     [remote \"origin\"]\n\turl = {url}\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n"
                ),
            )
            .unwrap();
        }
        if let Some(text) = readme {
            std::fs::write(dir.join("README.md"), text).unwrap();
        }
        dir
    }

    #[test]
    fn remote_urls_are_normalised() {
        assert_eq!(
            normalize_remote_url("git@github.com:acme/shop-web.git"),
            "https://github.com/acme/shop-web"
        );
        assert_eq!(
            normalize_remote_url("https://github.com/acme/shop.git"),
            "https://github.com/acme/shop"
        );
        assert_eq!(
            origin_url("[remote \"origin\"]\n  url = git@h:o/r.git\n").as_deref(),
            Some("git@h:o/r.git")
        );
        assert_eq!(origin_url("[core]\n  url = nope\n"), None);
    }

    #[test]
    fn description_skips_headings_and_badges() {
        let readme = "# Shop\n\n![build](badge.svg)\n\nAn online shop for widgets.\n";
        assert_eq!(
            readme_description(readme).as_deref(),
            Some("An online shop for widgets.")
        );
        assert_eq!(readme_description("# Only a title\n"), None);
        assert_eq!(
            readme_description(&"x".repeat(300)).unwrap().chars().count(),
            200
        );
    }

    #[test]
    fn multi_repo_detection() {
        assert_eq!(
            detect_multi_repo("shop-web", "projects", Some("https://github.com/acme/shop-web")),
            (Some("shop".to_string()), true)
        );
        assert_eq!(
            detect_multi_repo("billing", "acme", None),
            (Some("acme".to_string()), false)
        );
        assert_eq!(detect_multi_repo("billing", "code", None), (None, false));
        assert_eq!(detect_multi_repo("api", "Work", None), (None, true));
    }

    #[tokio::test]
    async fn single_repo_directory() {
        let tmp = TempDir::new().unwrap();
        let repo = git_repo(
            tmp.path(),
            "solo",
            Some("git@github.com:acme/solo.git"),
            Some("# Solo\nA single repository.\n"),
        );
        let found = scan_directory(&repo).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "solo");
        assert_eq!(found[0].repo_url.as_deref(), Some("https://github.com/acme/solo"));
        assert_eq!(found[0].description.as_deref(), Some("A single repository."));
    }

    #[tokio::test]
    async fn import_groups_children_under_a_parent() {
        let tmp = TempDir::new().unwrap();
        let projects = tmp.path().join("projects");
        git_repo(&projects, "shop-web", Some("git@github.com:acme/shop-web.git"), None);
        git_repo(&projects, "shop-api", Some("https://github.com/acme/shop-api.git"), None);
        git_repo(&projects, "blog", None, Some("My blog.\n"));
        std::fs::create_dir_all(projects.join("notes")).unwrap();
        std::fs::create_dir_all(projects.join(".cache/.git")).unwrap();

        let store = Store::in_memory().unwrap();
        let import = import_scan(&store, &projects).await.unwrap();
        assert_eq!(import.scanned, 3);
        assert_eq!(import.created.len(), 3);
        assert_eq!(import.parents.len(), 1);
        assert_eq!(import.to_analyze.len(), 4);

        let parent = &import.parents[0];
        assert_eq!(parent.name, "shop");
        assert_eq!(
            parent.description.as_deref(),
            Some("Multi-repo project with 2 repositories")
        );
        let children: Vec<_> = import
            .created
            .iter()
            .filter(|p| p.parent_project_id.as_deref() == Some(parent.id.as_str()))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(children, ["shop-api", "shop-web"]);
        assert_eq!(store.list_agents(&parent.id, true).unwrap().len(), 7);

        let again = import_scan(&store, &projects).await.unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.skipped.len(), 3);
        assert!(again.parents.is_empty());
    }
}
