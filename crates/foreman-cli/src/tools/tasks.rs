use super::{optional_str, parse_opt, required_str, to_value, ForemanTool};
use foreman_core::model::{NewTask, TaskUpdate};
use foreman_core::personas::validate_agent_type;
use foreman_core::store::Store;
use foreman_core::types::{Priority, TaskStatus};
use serde_json::{json, Value};

pub struct GetNextTaskTool;

impl ForemanTool for GetNextTaskTool {
    fn name(&self) -> &str {
        "get_next_task"
    }

    fn description(&self) -> &str {
        "Get the next open task: in-progress first, then by priority, then board order"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project id" },
                "agent_type": { "type": "string", "description": "Only tasks from this persona" }
            },
            "required": ["project_id"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let id = required_str(&args, "project_id")?;
        let agent_type = optional_str(&args, "agent_type");
        match store.next_task(id, agent_type).map_err(|e| e.to_string())? {
            Some(task) => to_value(&task),
            None => Ok(json!({ "message": "No tasks available" })),
        }
    }
}

pub struct UpdateTaskTool;

impl ForemanTool for UpdateTaskTool {
    fn name(&self) -> &str {
        "update_task"
    }

    fn description(&self) -> &str {
        "Update a task's status, description or priority"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "Task id" },
                "status": { "type": "string", "enum": ["todo", "in_progress", "done"] },
                "description": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "medium", "high"] }
            },
            "required": ["task_id"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let id = required_str(&args, "task_id")?;
        let update = TaskUpdate {
            status: parse_opt::<TaskStatus>(&args, "status")?,
            priority: parse_opt::<Priority>(&args, "priority")?,
            description: optional_str(&args, "description").map(String::from),
            ..Default::default()
        };
        let task = store.update_task(id, &update).map_err(|e| e.to_string())?;
        to_value(&task)
    }
}

pub struct CreateTaskTool;

impl ForemanTool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Add a todo task to the end of a project's board"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "Project id" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "medium", "high"] },
                "agent_type": { "type": "string", "description": "Persona this task belongs to" }
            },
            "required": ["project_id", "title"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let id = required_str(&args, "project_id")?;
        let title = required_str(&args, "title")?;
        let agent_type = optional_str(&args, "agent_type");
        if let Some(agent) = agent_type {
            validate_agent_type(agent).map_err(|e| e.to_string())?;
        }
        let task = store
            .create_task(
                id,
                &NewTask {
                    title: title.to_string(),
                    description: optional_str(&args, "description").map(String::from),
                    priority: parse_opt(&args, "priority")?.unwrap_or_default(),
                    agent_type: agent_type.map(String::from),
                    ..Default::default()
                },
            )
            .map_err(|e| e.to_string())?;
        to_value(&task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::model::NewProject;

    fn store_with_project() -> (Store, String) {
        let store = Store::in_memory().unwrap();
        let project = store
            .create_project(&NewProject {
                name: "shop".into(),
                path: "/code/shop".into(),
                ..Default::default()
            })
            .unwrap();
        (store, project.id)
    }

    #[test]
    fn create_then_pick_up_next_task() {
        let (store, id) = store_with_project();
        let empty = GetNextTaskTool
            .call(json!({"project_id": id}), &store)
            .unwrap();
        assert_eq!(empty["message"], "No tasks available");

        CreateTaskTool
            .call(json!({"project_id": id, "title": "Tidy README"}), &store)
            .unwrap();
        let urgent = CreateTaskTool
            .call(
                json!({"project_id": id, "title": "Patch XSS", "priority": "high", "agent_type": "technical"}),
                &store,
            )
            .unwrap();
        assert_eq!(urgent["order"], 1);
        assert_eq!(urgent["status"], "todo");

        let next = GetNextTaskTool
            .call(json!({"project_id": id}), &store)
            .unwrap();
        assert_eq!(next["title"], "Patch XSS");
    }

    #[test]
    fn update_task_moves_and_reprioritizes() {
        let (store, id) = store_with_project();
        let task = CreateTaskTool
            .call(json!({"project_id": id, "title": "Tidy README"}), &store)
            .unwrap();
        let task_id = task["id"].as_str().unwrap();

        let updated = UpdateTaskTool
            .call(
                json!({"task_id": task_id, "status": "in_progress", "priority": "low"}),
                &store,
            )
            .unwrap();
        assert_eq!(updated["status"], "in_progress");
        assert_eq!(updated["priority"], "low");
        assert_eq!(updated["title"], "Tidy README");

        assert!(UpdateTaskTool
            .call(json!({"task_id": task_id, "priority": "urgent"}), &store)
            .is_err());
        assert!(UpdateTaskTool
            .call(json!({"task_id": "missing", "status": "done"}), &store)
            .is_err());
    }

    #[test]
    fn create_task_rejects_bad_agent_type() {
        let (store, id) = store_with_project();
        let err = CreateTaskTool
            .call(
                json!({"project_id": id, "title": "x", "agent_type": "Not Valid!"}),
                &store,
            )
            .unwrap_err();
        assert!(err.contains("Not Valid!"));
        assert!(CreateTaskTool.call(json!({"project_id": id}), &store).is_err());
    }
}
