//! Knowledge-base documents created by hand or uploaded as markdown.

use llm_agent::Generate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::summarize_document;
use crate::error::{ForemanError, Result};
use crate::kb::{extract_tags, extract_title, slugify, MIN_CONTENT_CHARS};
use crate::model::{KbDocument, NewKbDocument};
use crate::store::Store;
use crate::types::KbSource;

/// Slug used when a title has no usable characters.
const FALLBACK_SLUG: &str = "document";

/// `slugify(title)`, suffixed with `-1`, `-2`, … until no document uses it.
pub fn unique_slug(store: &Store, title: &str) -> Result<String> {
    let base = match slugify(title) {
        s if s.is_empty() => FALLBACK_SLUG.to_string(),
        s => s,
    };
    if !store.slug_exists(&base)? {
        return Ok(base);
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}-{n}");
        if !store.slug_exists(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Store a document under a fresh slug.
pub fn create_document(store: &Store, input: DocumentInput, source: KbSource) -> Result<KbDocument> {
    let slug = unique_slug(store, &input.title)?;
    let doc = store.create_document(&NewKbDocument {
        title: input.title,
        slug,
        content: input.content,
        summary: input.summary,
        source,
        project_id: input.project_id,
        tags: input.tags,
    })?;
    info!(slug = %doc.slug, source = %doc.source, "created knowledge-base document");
    Ok(doc)
}

pub fn create_manual(store: &Store, input: DocumentInput) -> Result<KbDocument> {
    create_document(store, input, KbSource::Manual)
}

/// A markdown upload: the title is the first H1, else derived from the
/// filename. Tags are mined like repository documents and merged with
/// `extra_tags`; the summary is generated.
pub async fn upload(
    store: &Store,
    generator: &dyn Generate,
    filename: &str,
    content: String,
    project_id: Option<String>,
    extra_tags: Vec<String>,
) -> Result<KbDocument> {
    let lower = filename.to_lowercase();
    if !lower.ends_with(".md") && !lower.ends_with(".markdown") {
        return Err(ForemanError::InvalidUpload(format!(
            "{filename}: only markdown files (.md, .markdown) are supported"
        )));
    }
    if content.trim().chars().count() < MIN_CONTENT_CHARS {
        return Err(ForemanError::InvalidUpload(format!(
            "{filename}: content is shorter than {MIN_CONTENT_CHARS} characters"
        )));
    }
    let title = extract_title(&content, filename);
    let mut tags = extract_tags(&content, filename, filename);
    for tag in extra_tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    let summary = summarize_document(generator, &title, &content).await;
    create_document(
        store,
        DocumentInput {
            title,
            content,
            summary: Some(summary),
            project_id,
            tags,
        },
        KbSource::Upload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_agent::ScriptedGenerator;

    #[test]
    fn slugs_are_suffixed_until_unique() {
        let store = Store::in_memory().unwrap();
        let input = |title: &str| DocumentInput {
            title: title.into(),
            content: "body".into(),
            ..Default::default()
        };
        assert_eq!(create_manual(&store, input("API Guide")).unwrap().slug, "api-guide");
        assert_eq!(create_manual(&store, input("API guide!")).unwrap().slug, "api-guide-1");
        assert_eq!(create_manual(&store, input("api  guide")).unwrap().slug, "api-guide-2");
        assert_eq!(create_manual(&store, input("???")).unwrap().slug, "document");
        assert_eq!(create_manual(&store, input("!!!")).unwrap().slug, "document-1");
    }

    #[tokio::test]
    async fn upload_takes_title_from_heading_or_filename() {
        let store = Store::in_memory().unwrap();
        let generator = ScriptedGenerator::new("How releases are cut.");
        let doc = upload(
            &store,
            &generator,
            "notes.md",
            "# Release Process\n\nSteps for tagging, building and publishing a release.".into(),
            None,
            vec!["Ops".into()],
        )
        .await
        .unwrap();
        assert_eq!(doc.title, "Release Process");
        assert_eq!(doc.source, KbSource::Upload);
        assert_eq!(doc.summary.as_deref(), Some("How releases are cut."));
        assert!(doc.tags.contains(&"ops".to_string()));

        let body = "no heading here, just a long enough paragraph about the rota".to_string();
        let doc = upload(&store, &generator, "on-call_rota.md", body, None, Vec::new())
            .await
            .unwrap();
        assert_eq!(doc.title, "on call rota");
        assert_eq!(doc.slug, "on-call-rota");
    }

    #[tokio::test]
    async fn upload_rejects_other_files_and_short_content() {
        let store = Store::in_memory().unwrap();
        let generator = ScriptedGenerator::new("summary");
        let long = "x".repeat(80);
        assert!(matches!(
            upload(&store, &generator, "notes.txt", long, None, Vec::new()).await,
            Err(ForemanError::InvalidUpload(_))
        ));
        assert!(matches!(
            upload(&store, &generator, "notes.md", "# Tiny".into(), None, Vec::new()).await,
            Err(ForemanError::InvalidUpload(_))
        ));
        assert_eq!(generator.call_count(), 0);
    }
}
