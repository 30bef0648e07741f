use crate::output::{clip, print_json, print_table};
use crate::session::Session;
use clap::Subcommand;
use foreman_core::model::NewProject;
use foreman_core::projects;

// ---------------------------------------------------------------------------
// Subcommand definition
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List all projects
    List,
    /// Show a project with its tasks and insights
    Show { id: String },
    /// Register a project by hand (default personas are seeded)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        description: Option<String>,
        /// Remote URL; GitHub URLs enable pull-request lookups
        #[arg(long)]
        repo_url: Option<String>,
        /// Id of the parent project in a multi-repo group
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a project and everything attached to it
    Delete { id: String },
    /// Fold SOURCE into TARGET as an extra repository
    Merge { target: String, source: String },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(session: &Session, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::List => list(session, json),
        ProjectSubcommand::Show { id } => show(session, &id, json),
        ProjectSubcommand::Create {
            name,
            path,
            description,
            repo_url,
            parent,
        } => create(
            session,
            NewProject {
                name,
                path,
                description,
                repo_url,
                parent_project_id: parent,
            },
            json,
        ),
        ProjectSubcommand::Delete { id } => delete(session, &id, json),
        ProjectSubcommand::Merge { target, source } => merge(session, &target, &source, json),
    }
}

fn list(session: &Session, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let projects = store.list_projects()?;
    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects. Run `foreman scan <dir>` or `foreman project create`.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            let analyzed = p
                .last_analyzed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".into());
            vec![
                p.id.clone(),
                p.name.clone(),
                clip(&p.path, 40),
                store.count_tasks(&p.id).map(|n| n.to_string()).unwrap_or_default(),
                analyzed,
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "PATH", "TASKS", "ANALYZED"], rows);
    Ok(())
}

fn show(session: &Session, id: &str, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let project = store.get_project(id)?;
    let tasks = store.list_tasks(id)?;
    let insights = store.list_insights(id)?;

    if json {
        return print_json(&serde_json::json!({
            "project": project,
            "tasks": tasks,
            "insights": insights,
        }));
    }

    println!("{} [{}]", project.name, project.id);
    println!("  path:      {}", project.path);
    if let Some(url) = &project.repo_url {
        println!("  remote:    {url}");
    }
    if let Some(desc) = &project.description {
        println!("  about:     {desc}");
    }
    if !project.tech_stack.is_empty() {
        println!("  stack:     {}", project.tech_stack.join(", "));
    }
    for repo in &project.repositories {
        println!("  repo:      {} ({})", repo.name, repo.path);
    }
    if let Some(analysis) = &project.ai_analysis {
        println!("\n{analysis}");
    }

    if !tasks.is_empty() {
        println!();
        let rows = tasks
            .iter()
            .map(|t| {
                vec![
                    t.id.clone(),
                    t.status.to_string(),
                    t.priority.to_string(),
                    t.agent_type.clone().unwrap_or_else(|| "-".into()),
                    clip(&t.title, 60),
                ]
            })
            .collect();
        print_table(&["ID", "STATUS", "PRIORITY", "AGENT", "TITLE"], rows);
    }
    if !insights.is_empty() {
        println!("\nInsights:");
        for insight in &insights {
            println!("  [{}] {}", insight.agent_type, insight.title);
        }
    }
    Ok(())
}

fn create(session: &Session, input: NewProject, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let project = projects::create_project(&store, &input)?;
    if json {
        print_json(&project)?;
    } else {
        println!("Created project '{}' [{}]", project.name, project.id);
    }
    Ok(())
}

fn delete(session: &Session, id: &str, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    store.delete_project(id)?;
    if json {
        print_json(&serde_json::json!({ "id": id, "deleted": true }))?;
    } else {
        println!("Deleted project [{id}]");
    }
    Ok(())
}

fn merge(session: &Session, target: &str, source: &str, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let merged = projects::merge_repository(&store, target, source)?;
    if json {
        print_json(&merged)?;
    } else {
        println!(
            "Merged [{source}] into '{}'; it now tracks {} extra repositories",
            merged.name,
            merged.repositories.len()
        );
    }
    Ok(())
}
