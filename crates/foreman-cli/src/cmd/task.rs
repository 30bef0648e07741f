use crate::output::{clip, print_json, print_table};
use crate::session::Session;
use clap::Subcommand;
use foreman_core::model::{NewTask, TaskUpdate};
use foreman_core::types::{Priority, TaskStatus};

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List a project's tasks in board order
    List {
        project_id: String,
        /// Only tasks with this status (todo, in_progress, done)
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Add a task to the end of a project's board
    Add {
        project_id: String,
        #[arg(required = true)]
        title: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },
    /// Show full details for a single task
    Show { task_id: String },
    /// Move a task to another column
    Move { task_id: String, status: TaskStatus },
    /// Edit task fields
    Edit {
        task_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Delete a task
    Delete { task_id: String },
}

pub fn run(session: &Session, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    match subcmd {
        TaskSubcommand::List { project_id, status } => {
            store.get_project(&project_id)?;
            let tasks: Vec<_> = store
                .list_tasks(&project_id)?
                .into_iter()
                .filter(|t| status.map_or(true, |s| t.status == s))
                .collect();
            if json {
                return print_json(&tasks);
            }
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            let rows = tasks
                .iter()
                .map(|t| {
                    vec![
                        t.order.to_string(),
                        t.id.clone(),
                        t.status.to_string(),
                        t.priority.to_string(),
                        t.agent_type.clone().unwrap_or_else(|| "-".into()),
                        clip(&t.title, 60),
                    ]
                })
                .collect();
            print_table(&["#", "ID", "STATUS", "PRIORITY", "AGENT", "TITLE"], rows);
        }
        TaskSubcommand::Add {
            project_id,
            title,
            description,
            priority,
        } => {
            let task = store.create_task(
                &project_id,
                &NewTask {
                    title: title.join(" "),
                    description,
                    priority,
                    ..Default::default()
                },
            )?;
            if json {
                return print_json(&task);
            }
            println!("Added task [{}]: {}", task.id, task.title);
        }
        TaskSubcommand::Show { task_id } => {
            let task = store.get_task(&task_id)?;
            if json {
                return print_json(&task);
            }
            println!("{} [{}]", task.title, task.id);
            println!("  status:   {}", task.status);
            println!("  priority: {}", task.priority);
            if let Some(agent) = &task.agent_type {
                println!("  agent:    {agent}");
            }
            if !task.tags.is_empty() {
                println!("  tags:     {}", task.tags.join(", "));
            }
            if let Some(desc) = &task.description {
                println!("\n{desc}");
            }
            if let Some(reasoning) = &task.ai_reasoning {
                println!("\nWhy: {reasoning}");
            }
        }
        TaskSubcommand::Move { task_id, status } => {
            let task = store.update_task(
                &task_id,
                &TaskUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )?;
            if json {
                return print_json(&task);
            }
            println!("Moved task [{}] to {}", task.id, task.status);
        }
        TaskSubcommand::Edit {
            task_id,
            title,
            description,
            priority,
        } => {
            let task = store.update_task(
                &task_id,
                &TaskUpdate {
                    title,
                    description,
                    priority,
                    ..Default::default()
                },
            )?;
            if json {
                return print_json(&task);
            }
            println!("Updated task [{}]", task.id);
        }
        TaskSubcommand::Delete { task_id } => {
            store.delete_task(&task_id)?;
            if json {
                return print_json(&serde_json::json!({ "id": task_id, "deleted": true }));
            }
            println!("Deleted task [{task_id}]");
        }
    }
    Ok(())
}
