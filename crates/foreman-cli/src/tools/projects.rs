use super::{optional_str, parse_opt, required_str, to_value, ForemanTool};
use foreman_core::store::Store;
use foreman_core::types::TaskStatus;
use serde_json::{json, Value};

pub struct ListProjectsTool;

impl ForemanTool for ListProjectsTool {
    fn name(&self) -> &str {
        "list_projects"
    }

    fn description(&self) -> &str {
        "List all tracked projects with task counts"
    }

    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn call(&self, _args: Value, store: &Store) -> Result<Value, String> {
        let projects = store.list_projects().map_err(|e| e.to_string())?;
        let mut out = Vec::with_capacity(projects.len());
        for p in projects {
            let tasks = store.list_tasks(&p.id).map_err(|e| e.to_string())?;
            let completed = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Done)
                .count();
            out.push(json!({
                "id": p.id,
                "name": p.name,
                "description": p.description,
                "path": p.path,
                "repoUrl": p.repo_url,
                "taskCount": tasks.len(),
                "completedTasks": completed,
            }));
        }
        Ok(Value::Array(out))
    }
}

pub struct GetProjectTool;

impl ForemanTool for GetProjectTool {
    fn name(&self) -> &str {
        "get_project"
    }

    fn description(&self) -> &str {
        "Get a project with its task board and insights"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project id" }
            },
            "required": ["project_id"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let id = required_str(&args, "project_id")?;
        let project = store.get_project(id).map_err(|e| e.to_string())?;
        let tasks = store.list_tasks(id).map_err(|e| e.to_string())?;
        let insights = store.list_insights(id).map_err(|e| e.to_string())?;
        let mut value = to_value(&project)?;
        value["tasks"] = to_value(&tasks)?;
        value["insights"] = to_value(&insights)?;
        Ok(value)
    }
}

pub struct GetProjectTasksTool;

impl ForemanTool for GetProjectTasksTool {
    fn name(&self) -> &str {
        "get_project_tasks"
    }

    fn description(&self) -> &str {
        "Get a project's tasks in board order, optionally filtered by status or agent"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project id" },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "done"],
                    "description": "Only tasks in this column"
                },
                "agent_type": { "type": "string", "description": "Only tasks from this persona" }
            },
            "required": ["project_id"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let id = required_str(&args, "project_id")?;
        let status: Option<TaskStatus> = parse_opt(&args, "status")?;
        let agent_type = optional_str(&args, "agent_type");
        store.get_project(id).map_err(|e| e.to_string())?;
        let tasks: Vec<_> = store
            .list_tasks(id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .filter(|t| agent_type.map_or(true, |a| t.agent_type.as_deref() == Some(a)))
            .collect();
        to_value(&tasks)
    }
}
