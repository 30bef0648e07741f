use crate::output::print_json;
use crate::session::{block_on, Session};

pub fn run(session: &Session, project_id: &str, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let orchestrator = session.orchestrator(store);
    let summary = block_on(orchestrator.orchestrate_project_analysis(project_id))??;

    if json {
        return print_json(&summary);
    }
    println!(
        "{} personas proposed {} tasks; created {} ({} from personas, {} from markdown)",
        summary.agent_count,
        summary.tasks_available,
        summary.tasks_created,
        summary.agent_tasks,
        summary.markdown_tasks
    );
    if summary.task_limit_reached {
        println!("Task cap reached; lower-priority proposals were dropped");
    }
    println!(
        "{} insights recorded, {} knowledge-base documents added",
        summary.total_insights, summary.kb_documents
    );
    for failed in &summary.failed_agents {
        println!("Persona '{}' failed: {}", failed.agent_type, failed.error);
    }
    Ok(())
}

pub fn generate(session: &Session, project_id: &str, count: usize, json: bool) -> anyhow::Result<()> {
    let store = session.open_store()?;
    let orchestrator = session.orchestrator(store);
    let summary = block_on(orchestrator.generate_more_tasks(project_id, count))??;

    if json {
        return print_json(&summary);
    }
    println!(
        "Generated {} tasks ({} duplicates skipped); the board now holds {}",
        summary.tasks_generated, summary.duplicates_skipped, summary.total_tasks
    );
    for failed in &summary.failed_agents {
        println!("Persona '{}' failed: {}", failed.agent_type, failed.error);
    }
    Ok(())
}
