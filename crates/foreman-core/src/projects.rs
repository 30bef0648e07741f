//! Project creation and repository merges.

use tracing::info;

use crate::error::{ForemanError, Result};
use crate::model::{NewProject, Project, RepositoryRef};
use crate::personas::seed_default_agents;
use crate::store::Store;

/// Create a project and give it the default personas.
pub fn create_project(store: &Store, input: &NewProject) -> Result<Project> {
    let project = store.create_project(input)?;
    seed_default_agents(store, &project.id)?;
    info!(id = %project.id, name = %project.name, "created project");
    Ok(project)
}

/// Fold `source_id` into `target_id` as one of its repositories.
///
/// The source's tasks move over tagged with the source name, its insights
/// move over unchanged, and the source project is deleted.
pub fn merge_repository(store: &Store, target_id: &str, source_id: &str) -> Result<Project> {
    let target = store.get_project(target_id)?;
    let source = store.get_project(source_id)?;
    if target.id == source.id
        || target
            .repositories
            .iter()
            .any(|r| r.name == source.name)
    {
        return Err(ForemanError::RepositoryExists(source.name));
    }

    let mut repositories = target.repositories.clone();
    repositories.push(RepositoryRef {
        name: source.name.clone(),
        path: source.path.clone(),
        repo_url: source.repo_url.clone(),
        description: source.description.clone(),
    });
    store.set_repositories(&target.id, &repositories)?;

    let tasks = store.move_tasks(&source.id, &target.id, &source.name)?;
    let insights = store.move_insights(&source.id, &target.id)?;
    store.delete_project(&source.id)?;
    info!(
        target = %target.name,
        source = %source.name,
        tasks,
        insights,
        "merged repository"
    );
    store.get_project(&target.id)
}
