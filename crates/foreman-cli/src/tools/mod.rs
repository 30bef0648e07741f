use foreman_core::store::Store;
use serde_json::Value;

pub mod knowledge;
pub mod projects;
pub mod tasks;

/// One tool exposed over the MCP stdio server.
pub trait ForemanTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn call(&self, args: Value, store: &Store) -> Result<Value, String>;
}

pub fn all_tools() -> Vec<Box<dyn ForemanTool>> {
    vec![
        Box::new(projects::ListProjectsTool),
        Box::new(projects::GetProjectTool),
        Box::new(projects::GetProjectTasksTool),
        Box::new(tasks::GetNextTaskTool),
        Box::new(tasks::UpdateTaskTool),
        Box::new(tasks::CreateTaskTool),
        Box::new(knowledge::CreateDocumentTool),
        Box::new(knowledge::ListDocumentsTool),
        Box::new(knowledge::GetDocumentTool),
    ]
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args[key]
        .as_str()
        .ok_or_else(|| format!("missing required argument: {key}"))
}

/// Absent, null and empty strings all read as `None`.
fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str().filter(|s| !s.is_empty())
}

fn parse_opt<T>(args: &Value, key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_str(args, key)
        .map(|s| s.parse::<T>().map_err(|e| e.to_string()))
        .transpose()
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args[key]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_names_are_unique() {
        let tools = all_tools();
        let mut names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let args = json!({"status": "", "priority": "high"});
        assert_eq!(optional_str(&args, "status"), None);
        assert_eq!(optional_str(&args, "absent"), None);
        assert_eq!(optional_str(&args, "priority"), Some("high"));
        assert!(required_str(&args, "title").unwrap_err().contains("title"));
    }
}
