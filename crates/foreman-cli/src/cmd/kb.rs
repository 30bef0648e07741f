use crate::output::{clip, print_json, print_table};
use crate::session::{block_on, Session};
use anyhow::Context;
use clap::Subcommand;
use foreman_core::knowledge::{self, DocumentInput};
use foreman_core::model::KbDocument;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum KbSubcommand {
    /// List documents, optionally filtered
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Case-insensitive match on title or content
        #[arg(long)]
        search: Option<String>,
    },
    /// Print a document
    Show { slug: String },
    /// Write a document by hand
    Add {
        #[arg(long)]
        title: String,
        /// Document body; `-` reads stdin
        #[arg(long)]
        content: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Import a markdown file
    Upload {
        file: PathBuf,
        #[arg(long)]
        project: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a document
    Delete { slug: String },
    /// List tags with their document counts
    Tags,
}

pub fn run(session: &Session, subcmd: KbSubcommand, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    match subcmd {
        KbSubcommand::List {
            project,
            tag,
            search,
        } => {
            let mut docs = store.list_documents(project.as_deref(), tag.as_deref())?;
            if let Some(needle) = search.map(|s| s.to_lowercase()) {
                docs.retain(|d| {
                    d.title.to_lowercase().contains(&needle)
                        || d.content.to_lowercase().contains(&needle)
                });
            }
            if json {
                return print_json(&docs);
            }
            if docs.is_empty() {
                println!("No documents.");
                return Ok(());
            }
            let rows = docs
                .iter()
                .map(|d| {
                    vec![
                        d.slug.clone(),
                        clip(&d.title, 40),
                        d.source.to_string(),
                        d.tags.join(","),
                    ]
                })
                .collect();
            print_table(&["SLUG", "TITLE", "SOURCE", "TAGS"], rows);
        }
        KbSubcommand::Show { slug } => {
            let doc = store.get_document(&slug)?;
            if json {
                return print_json(&doc);
            }
            print_document(&doc);
        }
        KbSubcommand::Add {
            title,
            content,
            project,
            tags,
        } => {
            let content = if content == "-" {
                std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
            } else {
                content
            };
            let doc = knowledge::create_manual(
                &store,
                DocumentInput {
                    title,
                    content,
                    summary: None,
                    project_id: project,
                    tags,
                },
            )?;
            if json {
                return print_json(&doc);
            }
            println!("Added document '{}' ({})", doc.title, doc.slug);
        }
        KbSubcommand::Upload {
            file,
            project,
            tags,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let provider = session.provider();
            let doc = block_on(knowledge::upload(
                &store,
                provider.as_ref(),
                &filename,
                content,
                project,
                tags,
            ))??;
            if json {
                return print_json(&doc);
            }
            println!("Uploaded '{}' as {}", doc.title, doc.slug);
        }
        KbSubcommand::Delete { slug } => {
            store.delete_document(&slug)?;
            if json {
                return print_json(&serde_json::json!({ "slug": slug, "deleted": true }));
            }
            println!("Deleted document {slug}");
        }
        KbSubcommand::Tags => {
            let tags = store.list_tags()?;
            if json {
                return print_json(&tags);
            }
            let rows = tags
                .iter()
                .map(|t| vec![t.name.clone(), t.document_count.to_string()])
                .collect();
            print_table(&["TAG", "DOCUMENTS"], rows);
        }
    }
    Ok(())
}

fn print_document(doc: &KbDocument) {
    println!("# {}", doc.title);
    println!("slug: {}  source: {}", doc.slug, doc.source);
    if !doc.tags.is_empty() {
        println!("tags: {}", doc.tags.join(", "));
    }
    if let Some(summary) = &doc.summary {
        println!("summary: {summary}");
    }
    println!("\n{}", doc.content);
}
