use super::{optional_str, required_str, string_list, to_value, ForemanTool};
use foreman_core::knowledge::{self, DocumentInput};
use foreman_core::model::KbDocument;
use foreman_core::store::Store;
use foreman_core::types::KbSource;
use serde_json::{json, Value};

/// Listing view: everything but the body.
fn listing(doc: &KbDocument) -> Value {
    json!({
        "id": doc.id,
        "title": doc.title,
        "slug": doc.slug,
        "summary": doc.summary,
        "tags": doc.tags,
        "projectId": doc.project_id,
        "source": doc.source,
        "createdAt": doc.created_at,
        "updatedAt": doc.updated_at,
    })
}

pub struct CreateDocumentTool;

impl ForemanTool for CreateDocumentTool {
    fn name(&self) -> &str {
        "create_knowledge_base_document"
    }

    fn description(&self) -> &str {
        "Add a markdown document to the knowledge base"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string", "description": "Markdown body" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tag names, e.g. [\"architecture\", \"api\"]"
                },
                "project_id": { "type": "string", "description": "Attach to this project" }
            },
            "required": ["title", "content"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let project_id = optional_str(&args, "project_id").map(String::from);
        if let Some(id) = &project_id {
            store.get_project(id).map_err(|e| e.to_string())?;
        }
        let input = DocumentInput {
            title: required_str(&args, "title")?.to_string(),
            content: required_str(&args, "content")?.to_string(),
            summary: None,
            project_id,
            tags: string_list(&args, "tags"),
        };
        let doc = knowledge::create_document(store, input, KbSource::Mcp)
            .map_err(|e| e.to_string())?;
        Ok(json!({ "success": true, "document": listing(&doc) }))
    }
}

pub struct ListDocumentsTool;

impl ForemanTool for ListDocumentsTool {
    fn name(&self) -> &str {
        "list_knowledge_base"
    }

    fn description(&self) -> &str {
        "List knowledge-base documents, optionally by project or by any of several tags"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let tags: Vec<String> = string_list(&args, "tags")
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();
        let docs = store
            .list_documents(optional_str(&args, "project_id"), None)
            .map_err(|e| e.to_string())?;
        let out: Vec<Value> = docs
            .iter()
            .filter(|d| tags.is_empty() || d.tags.iter().any(|t| tags.contains(t)))
            .map(listing)
            .collect();
        Ok(Value::Array(out))
    }
}

pub struct GetDocumentTool;

impl ForemanTool for GetDocumentTool {
    fn name(&self) -> &str {
        "get_knowledge_base_document"
    }

    fn description(&self) -> &str {
        "Get a knowledge-base document by slug"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "slug": { "type": "string" } },
            "required": ["slug"]
        })
    }

    fn call(&self, args: Value, store: &Store) -> Result<Value, String> {
        let slug = required_str(&args, "slug")?;
        let doc = store.get_document(slug).map_err(|e| e.to_string())?;
        to_value(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_documents_are_marked_as_agent_written() {
        let store = Store::in_memory().unwrap();
        let created = CreateDocumentTool
            .call(
                json!({"title": "API Guide", "content": "Use v2.", "tags": ["API", "guide"]}),
                &store,
            )
            .unwrap();
        assert_eq!(created["document"]["slug"], "api-guide");
        assert_eq!(created["document"]["source"], "mcp");

        let again = CreateDocumentTool
            .call(json!({"title": "API Guide", "content": "Use v3."}), &store)
            .unwrap();
        assert_eq!(again["document"]["slug"], "api-guide-1");

        let doc = GetDocumentTool
            .call(json!({"slug": "api-guide"}), &store)
            .unwrap();
        assert_eq!(doc["content"], "Use v2.");
        assert_eq!(doc["source"], "mcp");
    }

    #[test]
    fn listing_matches_any_tag() {
        let store = Store::in_memory().unwrap();
        for (title, tag) in [("One", "api"), ("Two", "ops"), ("Three", "design")] {
            CreateDocumentTool
                .call(json!({"title": title, "content": "body", "tags": [tag]}), &store)
                .unwrap();
        }
        let all = ListDocumentsTool.call(json!({}), &store).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);
        assert!(all[0].get("content").is_none());

        let some = ListDocumentsTool
            .call(json!({"tags": ["api", "OPS"]}), &store)
            .unwrap();
        assert_eq!(some.as_array().unwrap().len(), 2);
    }

    #[test]
    fn unknown_project_or_slug_is_an_error() {
        let store = Store::in_memory().unwrap();
        assert!(CreateDocumentTool
            .call(json!({"title": "x", "content": "y", "project_id": "nope"}), &store)
            .is_err());
        assert!(GetDocumentTool.call(json!({"slug": "nope"}), &store).is_err());
    }
}
