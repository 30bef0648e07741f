use crate::output::{clip, print_json, print_table};
use crate::session::Session;
use clap::Subcommand;
use foreman_core::model::{AgentUpdate, NewAgent};
use foreman_core::personas;

#[derive(Subcommand)]
pub enum AgentSubcommand {
    /// List the built-in persona catalog
    Catalog,
    /// List a project's personas
    List { project_id: String },
    /// Add a custom persona to a project
    Add {
        project_id: String,
        /// Lowercase identifier, e.g. `security`
        #[arg(long = "type", value_name = "TYPE")]
        agent_type: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        system_prompt: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated task categories
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },
    /// Include a persona in future runs
    Enable { agent_id: String },
    /// Leave a persona out of future runs
    Disable { agent_id: String },
    /// Delete a persona
    Delete { agent_id: String },
}

pub fn run(session: &Session, subcmd: AgentSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AgentSubcommand::Catalog => catalog(json),
        AgentSubcommand::List { project_id } => list(session, &project_id, json),
        AgentSubcommand::Add {
            project_id,
            agent_type,
            name,
            system_prompt,
            description,
            categories,
        } => {
            personas::validate_agent_type(&agent_type)?;
            let input = NewAgent {
                agent_type,
                name,
                icon: None,
                description,
                system_prompt,
                task_categories: categories,
                is_default: false,
            };
            let agent = session.open_store()?.create_agent(&project_id, &input)?;
            if json {
                return print_json(&agent);
            }
            println!("Added persona '{}' [{}]", agent.name, agent.id);
            Ok(())
        }
        AgentSubcommand::Enable { agent_id } => set_active(session, &agent_id, true, json),
        AgentSubcommand::Disable { agent_id } => set_active(session, &agent_id, false, json),
        AgentSubcommand::Delete { agent_id } => {
            session.open_store()?.delete_agent(&agent_id)?;
            if json {
                return print_json(&serde_json::json!({ "id": agent_id, "deleted": true }));
            }
            println!("Deleted persona [{agent_id}]");
            Ok(())
        }
    }
}

fn catalog(json: bool) -> anyhow::Result<()> {
    let catalog: Vec<NewAgent> = personas::catalog().iter().map(|p| p.to_new_agent()).collect();
    if json {
        return print_json(&catalog);
    }
    let rows = catalog
        .iter()
        .map(|a| vec![a.agent_type.clone(), a.name.clone(), clip(&a.description, 60)])
        .collect();
    print_table(&["TYPE", "NAME", "DESCRIPTION"], rows);
    Ok(())
}

fn list(session: &Session, project_id: &str, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    store.get_project(project_id)?;
    let agents = store.list_agents(project_id, false)?;
    if json {
        return print_json(&agents);
    }
    let rows = agents
        .iter()
        .map(|a| {
            vec![
                a.id.clone(),
                a.agent_type.clone(),
                a.name.clone(),
                if a.is_active { "yes" } else { "no" }.to_string(),
                if a.is_default { "built-in" } else { "custom" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "NAME", "ACTIVE", "KIND"], rows);
    Ok(())
}

fn set_active(session: &Session, agent_id: &str, active: bool, json: bool) -> anyhow::Result<()> {
    let agent = session.open_store()?.update_agent(
        agent_id,
        &AgentUpdate {
            is_active: Some(active),
            ..Default::default()
        },
    )?;
    if json {
        return print_json(&agent);
    }
    let state = if active { "enabled" } else { "disabled" };
    println!("Persona '{}' {state}", agent.name);
    Ok(())
}
