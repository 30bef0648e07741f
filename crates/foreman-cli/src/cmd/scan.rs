use crate::output::{print_json, print_table};
use crate::session::{block_on, Session};
use anyhow::Context;
use foreman_core::scanner;
use std::path::Path;

pub fn run(session: &Session, dir: &Path, analyze: bool, json: bool) -> anyhow::Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot read directory {}", dir.display()))?;
    let store = session.open_store()?;

    block_on(async {
        let import = scanner::import_scan(&store, &dir).await?;

        let mut failures = Vec::new();
        if analyze {
            let orchestrator = session.orchestrator(store.clone());
            for id in &import.to_analyze {
                if let Err(e) = orchestrator.orchestrate_project_analysis(id).await {
                    tracing::warn!(project_id = %id, "analysis failed: {e}");
                    failures.push(id.clone());
                }
            }
        }

        if json {
            return print_json(&import);
        }

        println!(
            "Scanned {} repositories: {} created, {} already known",
            import.scanned,
            import.created.len(),
            import.skipped.len()
        );
        for parent in &import.parents {
            println!("Grouped under new parent project '{}' [{}]", parent.name, parent.id);
        }
        if !import.created.is_empty() {
            let rows = import
                .created
                .iter()
                .map(|p| {
                    vec![
                        p.id.clone(),
                        p.name.clone(),
                        p.repo_url.clone().unwrap_or_else(|| "-".into()),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "REMOTE"], rows);
        }
        if !failures.is_empty() {
            println!("{} analyses failed; rerun `foreman analyze <id>`", failures.len());
        }
        Ok(())
    })?
}
