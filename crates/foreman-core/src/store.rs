//! SQLite persistence for projects, agents, tasks, insights and the
//! knowledge base.
//!
//! One [`Store`] owns a single connection behind a mutex. Every public
//! method takes the lock once; row helpers take `&Connection` so they can be
//! composed inside a locked section or a transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ForemanError, Result};
use crate::model::{
    Agent, AgentUpdate, Insight, KbDocument, KbDocumentUpdate, KbTag, NewAgent, NewKbDocument,
    NewProject, NewTask, Project, RepositoryRef, Task, TaskUpdate,
};
use crate::personas;
use crate::types::Priority;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id                TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    path              TEXT NOT NULL UNIQUE,
    description       TEXT,
    repo_url          TEXT,
    github_owner      TEXT,
    github_repo       TEXT,
    ai_analysis       TEXT,
    tech_stack        TEXT,
    last_analyzed_at  TEXT,
    repositories      TEXT,
    parent_project_id TEXT REFERENCES projects(id) ON DELETE SET NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agents (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    type            TEXT NOT NULL,
    name            TEXT NOT NULL,
    icon            TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    system_prompt   TEXT NOT NULL,
    task_categories TEXT NOT NULL DEFAULT '[]',
    is_default      INTEGER NOT NULL DEFAULT 0,
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    UNIQUE(project_id, type)
);

CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title        TEXT NOT NULL,
    description  TEXT,
    priority     TEXT NOT NULL DEFAULT 'medium',
    status       TEXT NOT NULL DEFAULT 'todo',
    agent_type   TEXT,
    ai_reasoning TEXT,
    sort_order   INTEGER NOT NULL DEFAULT 0,
    tags         TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id, sort_order);

CREATE TABLE IF NOT EXISTS insights (
    id         TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    agent_type TEXT NOT NULL,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    priority   TEXT NOT NULL DEFAULT 'medium',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_insights_project ON insights(project_id);

CREATE TABLE IF NOT EXISTS kb_documents (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    slug       TEXT NOT NULL UNIQUE,
    content    TEXT NOT NULL,
    summary    TEXT,
    source     TEXT NOT NULL DEFAULT 'manual',
    project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kb_tags (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS kb_document_tags (
    document_id TEXT NOT NULL REFERENCES kb_documents(id) ON DELETE CASCADE,
    tag_id      INTEGER NOT NULL REFERENCES kb_tags(id) ON DELETE CASCADE,
    PRIMARY KEY (document_id, tag_id)
);
"#;

const PROJECT_COLUMNS: &str = "id, name, path, description, repo_url, github_owner, github_repo, \
     ai_analysis, tech_stack, last_analyzed_at, repositories, parent_project_id, created_at, updated_at";

const AGENT_COLUMNS: &str = "id, project_id, type, name, icon, description, system_prompt, \
     task_categories, is_default, is_active, created_at";

const TASK_COLUMNS: &str = "id, project_id, title, description, priority, status, agent_type, \
     ai_reasoning, sort_order, tags, created_at, updated_at";

const INSIGHT_COLUMNS: &str = "id, project_id, agent_type, title, content, priority, created_at";

const DOCUMENT_COLUMNS: &str =
    "id, title, slug, content, summary, source, project_id, created_at, updated_at";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        Ok(self.conn().execute_batch(sql)?)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    pub fn create_project(&self, input: &NewProject) -> Result<Project> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE path = ?1)",
            [&input.path],
            |r| r.get(0),
        )?;
        if exists {
            return Err(ForemanError::ProjectExists(input.path.clone()));
        }
        let id = new_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO projects (id, name, path, description, repo_url, parent_project_id,
                                   tech_stack, repositories, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', '[]', ?7, ?7)",
            params![
                id,
                input.name,
                input.path,
                input.description,
                input.repo_url,
                input.parent_project_id,
                now
            ],
        )?;
        load_project(&conn, &id)?.ok_or(ForemanError::ProjectNotFound(id))
    }

    pub fn get_project(&self, id: &str) -> Result<Project> {
        load_project(&self.conn(), id)?.ok_or_else(|| ForemanError::ProjectNotFound(id.into()))
    }

    pub fn get_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE path = ?1");
        Ok(conn.query_row(&sql, [path], row_to_project).optional()?)
    }

    /// A project with this name that is not itself a child of another.
    pub fn find_top_level_by_name(&self, name: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE name = ?1 AND parent_project_id IS NULL
             ORDER BY created_at LIMIT 1"
        );
        Ok(conn.query_row(&sql, [name], row_to_project).optional()?)
    }

    /// All projects, most recently updated first.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC, rowid");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_project)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_analysis(&self, id: &str, analysis: &str, tech_stack: &[String]) -> Result<()> {
        let now = Utc::now();
        let n = self.conn().execute(
            "UPDATE projects
             SET ai_analysis = ?2, tech_stack = ?3, last_analyzed_at = ?4, updated_at = ?4
             WHERE id = ?1",
            params![id, analysis, to_json(tech_stack)?, now],
        )?;
        require_row(n, || ForemanError::ProjectNotFound(id.into()))
    }

    pub fn set_github_ids(&self, id: &str, owner: &str, repo: &str) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE projects SET github_owner = ?2, github_repo = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, owner, repo, Utc::now()],
        )?;
        require_row(n, || ForemanError::ProjectNotFound(id.into()))
    }

    pub fn set_repositories(&self, id: &str, repositories: &[RepositoryRef]) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE projects SET repositories = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, to_json(repositories)?, Utc::now()],
        )?;
        require_row(n, || ForemanError::ProjectNotFound(id.into()))
    }

    /// Delete a project; agents, tasks, insights and owned documents cascade.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", [id])?;
        require_row(n, || ForemanError::ProjectNotFound(id.into()))
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub fn create_agent(&self, project_id: &str, input: &NewAgent) -> Result<Agent> {
        let conn = self.conn();
        require_project(&conn, project_id)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM agents WHERE project_id = ?1 AND type = ?2)",
            params![project_id, input.agent_type],
            |r| r.get(0),
        )?;
        if exists {
            return Err(ForemanError::AgentExists {
                project_id: project_id.into(),
                agent_type: input.agent_type.clone(),
            });
        }
        let id = new_id();
        let icon = input
            .icon
            .clone()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| personas::icon_for(&input.agent_type).to_string());
        conn.execute(
            "INSERT INTO agents (id, project_id, type, name, icon, description, system_prompt,
                                 task_categories, is_default, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
            params![
                id,
                project_id,
                input.agent_type,
                input.name,
                icon,
                input.description,
                input.system_prompt,
                to_json(&input.task_categories)?,
                input.is_default,
                Utc::now()
            ],
        )?;
        load_agent(&conn, &id)?.ok_or(ForemanError::AgentNotFound(id))
    }

    /// Agents in creation order, optionally only the active ones.
    pub fn list_agents(&self, project_id: &str, active_only: bool) -> Result<Vec<Agent>> {
        let conn = self.conn();
        let filter = if active_only { "AND is_active = 1" } else { "" };
        let sql = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE project_id = ?1 {filter}
             ORDER BY created_at, rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], row_to_agent)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn agent_types(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT type FROM agents WHERE project_id = ?1")?;
        let rows = stmt.query_map([project_id], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_agent(&self, id: &str) -> Result<Agent> {
        load_agent(&self.conn(), id)?.ok_or_else(|| ForemanError::AgentNotFound(id.into()))
    }

    pub fn update_agent(&self, id: &str, update: &AgentUpdate) -> Result<Agent> {
        let conn = self.conn();
        let mut agent = load_agent(&conn, id)?.ok_or_else(|| ForemanError::AgentNotFound(id.into()))?;
        if let Some(name) = &update.name {
            agent.name = name.clone();
        }
        if let Some(icon) = &update.icon {
            agent.icon = icon.clone();
        }
        if let Some(description) = &update.description {
            agent.description = description.clone();
        }
        if let Some(prompt) = &update.system_prompt {
            agent.system_prompt = prompt.clone();
        }
        if let Some(categories) = &update.task_categories {
            agent.task_categories = categories.clone();
        }
        if let Some(active) = update.is_active {
            agent.is_active = active;
        }
        conn.execute(
            "UPDATE agents SET name = ?2, icon = ?3, description = ?4, system_prompt = ?5,
                               task_categories = ?6, is_active = ?7
             WHERE id = ?1",
            params![
                id,
                agent.name,
                agent.icon,
                agent.description,
                agent.system_prompt,
                to_json(&agent.task_categories)?,
                agent.is_active
            ],
        )?;
        Ok(agent)
    }

    pub fn delete_agent(&self, id: &str) -> Result<()> {
        let n = self.conn().execute("DELETE FROM agents WHERE id = ?1", [id])?;
        require_row(n, || ForemanError::AgentNotFound(id.into()))
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Insert a task. Without an explicit order it goes after the current
    /// maximum (or at 0 on an empty board).
    pub fn create_task(&self, project_id: &str, input: &NewTask) -> Result<Task> {
        let conn = self.conn();
        require_project(&conn, project_id)?;
        let order = match input.order {
            Some(o) => o,
            None => max_order(&conn, project_id)?.map_or(0, |m| m + 1),
        };
        let id = new_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO tasks (id, project_id, title, description, priority, status, agent_type,
                                ai_reasoning, sort_order, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                project_id,
                input.title,
                input.description,
                input.priority,
                input.status,
                input.agent_type,
                input.ai_reasoning,
                order,
                optional_json(&input.tags)?,
                now
            ],
        )?;
        load_task(&conn, &id)?.ok_or(ForemanError::TaskNotFound(id))
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        load_task(&self.conn(), id)?.ok_or_else(|| ForemanError::TaskNotFound(id.into()))
    }

    /// Tasks in board order.
    pub fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY sort_order, rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], row_to_task)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_tasks(&self, project_id: &str) -> Result<usize> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
            [project_id],
            |r| r.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        let conn = self.conn();
        let mut task = load_task(&conn, id)?.ok_or_else(|| ForemanError::TaskNotFound(id.into()))?;
        if let Some(title) = &update.title {
            task.title = title.clone();
        }
        if let Some(description) = &update.description {
            task.description = Some(description.clone());
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(order) = update.order {
            task.order = order;
        }
        if let Some(tags) = &update.tags {
            task.tags = tags.clone();
        }
        task.updated_at = Utc::now();
        conn.execute(
            "UPDATE tasks SET title = ?2, description = ?3, priority = ?4, status = ?5,
                              sort_order = ?6, tags = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                task.title,
                task.description,
                task.priority,
                task.status,
                task.order,
                optional_json(&task.tags)?,
                task.updated_at
            ],
        )?;
        Ok(task)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        let n = self.conn().execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        require_row(n, || ForemanError::TaskNotFound(id.into()))
    }

    pub fn task_titles(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT title FROM tasks WHERE project_id = ?1")?;
        let rows = stmt.query_map([project_id], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn max_task_order(&self, project_id: &str) -> Result<Option<i64>> {
        max_order(&self.conn(), project_id)
    }

    /// The open task to pick up next: in-progress before todo, then high
    /// priority first, then board order. `agent_type` narrows to one persona.
    pub fn next_task(&self, project_id: &str, agent_type: Option<&str>) -> Result<Option<Task>> {
        let conn = self.conn();
        require_project(&conn, project_id)?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE project_id = ?1
               AND status IN ('todo', 'in_progress')
               AND (?2 IS NULL OR agent_type = ?2)
             ORDER BY CASE status WHEN 'in_progress' THEN 0 ELSE 1 END,
                      CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                      sort_order, rowid
             LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![project_id, agent_type], row_to_task)
            .optional()?)
    }

    /// Re-parent every task of `from` onto `to`, adding `tag` to each task's
    /// tag list. Returns the number of tasks moved.
    pub fn move_tasks(&self, from: &str, to: &str, tag: &str) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let moved = {
            let mut stmt = tx.prepare("SELECT id, tags FROM tasks WHERE project_id = ?1")?;
            let rows = stmt
                .query_map([from], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (id, raw) in &rows {
                let mut tags: Vec<String> = json_list(raw.as_deref());
                if !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
                tx.execute(
                    "UPDATE tasks SET project_id = ?2, tags = ?3, updated_at = ?4 WHERE id = ?1",
                    params![id, to, to_json(&tags)?, Utc::now()],
                )?;
            }
            rows.len()
        };
        tx.commit()?;
        Ok(moved)
    }

    // -----------------------------------------------------------------------
    // Insights
    // -----------------------------------------------------------------------

    pub fn create_insight(
        &self,
        project_id: &str,
        agent_type: &str,
        title: &str,
        content: &str,
        priority: Priority,
    ) -> Result<Insight> {
        let insight = Insight {
            id: new_id(),
            project_id: project_id.into(),
            agent_type: agent_type.into(),
            title: title.into(),
            content: content.into(),
            priority,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO insights (id, project_id, agent_type, title, content, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                insight.id,
                insight.project_id,
                insight.agent_type,
                insight.title,
                insight.content,
                insight.priority,
                insight.created_at
            ],
        )?;
        Ok(insight)
    }

    /// Newest first.
    pub fn list_insights(&self, project_id: &str) -> Result<Vec<Insight>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE project_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([project_id], row_to_insight)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn move_insights(&self, from: &str, to: &str) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE insights SET project_id = ?2 WHERE project_id = ?1",
            params![from, to],
        )?)
    }

    // -----------------------------------------------------------------------
    // Knowledge base
    // -----------------------------------------------------------------------

    pub fn create_document(&self, input: &NewKbDocument) -> Result<KbDocument> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = new_id();
        let now = Utc::now();
        tx.execute(
            "INSERT INTO kb_documents (id, title, slug, content, summary, source, project_id,
                                       created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                input.title,
                input.slug,
                input.content,
                input.summary,
                input.source,
                input.project_id,
                now
            ],
        )?;
        attach_tags(&tx, &id, &input.tags)?;
        tx.commit()?;
        load_document(&conn, "id", &id)?.ok_or(ForemanError::DocumentNotFound(id))
    }

    pub fn get_document(&self, slug: &str) -> Result<KbDocument> {
        load_document(&self.conn(), "slug", slug)?
            .ok_or_else(|| ForemanError::DocumentNotFound(slug.into()))
    }

    /// Newest first, filtered by owning project and/or tag name.
    pub fn list_documents(
        &self,
        project_id: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<KbDocument>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM kb_documents d
             WHERE (?1 IS NULL OR d.project_id = ?1)
               AND (?2 IS NULL OR EXISTS (
                    SELECT 1 FROM kb_document_tags dt JOIN kb_tags t ON t.id = dt.tag_id
                    WHERE dt.document_id = d.id AND t.name = ?2))
             ORDER BY d.created_at DESC, d.rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut docs = stmt
            .query_map(params![project_id, tag], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for doc in &mut docs {
            doc.tags = document_tags(&conn, &doc.id)?;
        }
        Ok(docs)
    }

    pub fn update_document(&self, slug: &str, update: &KbDocumentUpdate) -> Result<KbDocument> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut doc = load_document(&tx, "slug", slug)?
            .ok_or_else(|| ForemanError::DocumentNotFound(slug.into()))?;
        if let Some(title) = &update.title {
            doc.title = title.clone();
        }
        if let Some(content) = &update.content {
            doc.content = content.clone();
        }
        if let Some(summary) = &update.summary {
            doc.summary = Some(summary.clone());
        }
        doc.updated_at = Utc::now();
        tx.execute(
            "UPDATE kb_documents SET title = ?2, content = ?3, summary = ?4, updated_at = ?5
             WHERE id = ?1",
            params![doc.id, doc.title, doc.content, doc.summary, doc.updated_at],
        )?;
        if let Some(tags) = &update.tags {
            tx.execute("DELETE FROM kb_document_tags WHERE document_id = ?1", [&doc.id])?;
            attach_tags(&tx, &doc.id, tags)?;
            doc.tags = document_tags(&tx, &doc.id)?;
        }
        tx.commit()?;
        Ok(doc)
    }

    pub fn delete_document(&self, slug: &str) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM kb_documents WHERE slug = ?1", [slug])?;
        require_row(n, || ForemanError::DocumentNotFound(slug.into()))
    }

    pub fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM kb_documents WHERE slug = ?1)",
            [slug],
            |r| r.get(0),
        )?)
    }

    pub fn document_titles(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT title FROM kb_documents WHERE project_id = ?1")?;
        let rows = stmt.query_map([project_id], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Tags that label at least one document, most used first.
    pub fn list_tags(&self) -> Result<Vec<KbTag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.name, COUNT(dt.document_id) AS n
             FROM kb_tags t JOIN kb_document_tags dt ON dt.tag_id = t.id
             GROUP BY t.id
             ORDER BY n DESC, t.name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(KbTag {
                name: r.get(0)?,
                document_count: r.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require_row(changed: usize, missing: impl FnOnce() -> ForemanError) -> Result<()> {
    if changed == 0 {
        Err(missing())
    } else {
        Ok(())
    }
}

fn require_project(conn: &Connection, id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(ForemanError::ProjectNotFound(id.into()))
    }
}

fn max_order(conn: &Connection, project_id: &str) -> Result<Option<i64>> {
    Ok(conn.query_row(
        "SELECT MAX(sort_order) FROM tasks WHERE project_id = ?1",
        [project_id],
        |r| r.get(0),
    )?)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Empty tag lists are stored as NULL.
fn optional_json(values: &[String]) -> Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        to_json(values).map(Some)
    }
}

/// Decode a JSON list column; NULL or malformed text reads as empty.
fn json_list<T: DeserializeOwned>(raw: Option<&str>) -> Vec<T> {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn load_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_project).optional()?)
}

fn load_agent(conn: &Connection, id: &str) -> Result<Option<Agent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_agent).optional()?)
}

fn load_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_task).optional()?)
}

/// `key` is a trusted column name (`id` or `slug`).
fn load_document(conn: &Connection, key: &str, value: &str) -> Result<Option<KbDocument>> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM kb_documents WHERE {key} = ?1");
    let Some(mut doc) = conn.query_row(&sql, [value], row_to_document).optional()? else {
        return Ok(None);
    };
    doc.tags = document_tags(conn, &doc.id)?;
    Ok(Some(doc))
}

fn document_tags(conn: &Connection, document_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM kb_tags t JOIN kb_document_tags dt ON dt.tag_id = t.id
         WHERE dt.document_id = ?1 ORDER BY t.name",
    )?;
    let rows = stmt.query_map([document_id], |r| r.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Get-or-create each tag and link it to the document.
fn attach_tags(conn: &Connection, document_id: &str, tags: &[String]) -> Result<()> {
    for tag in tags {
        let name = tag.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        conn.execute("INSERT OR IGNORE INTO kb_tags (name) VALUES (?1)", [&name])?;
        conn.execute(
            "INSERT OR IGNORE INTO kb_document_tags (document_id, tag_id)
             SELECT ?1, id FROM kb_tags WHERE name = ?2",
            params![document_id, name],
        )?;
    }
    Ok(())
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        description: row.get(3)?,
        repo_url: row.get(4)?,
        github_owner: row.get(5)?,
        github_repo: row.get(6)?,
        ai_analysis: row.get(7)?,
        tech_stack: json_list(row.get::<_, Option<String>>(8)?.as_deref()),
        last_analyzed_at: row.get::<_, Option<DateTime<Utc>>>(9)?,
        repositories: json_list(row.get::<_, Option<String>>(10)?.as_deref()),
        parent_project_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_to_agent(row: &Row) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        project_id: row.get(1)?,
        agent_type: row.get(2)?,
        name: row.get(3)?,
        icon: row.get(4)?,
        description: row.get(5)?,
        system_prompt: row.get(6)?,
        task_categories: json_list(row.get::<_, Option<String>>(7)?.as_deref()),
        is_default: row.get(8)?,
        is_active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        agent_type: row.get(6)?,
        ai_reasoning: row.get(7)?,
        order: row.get(8)?,
        tags: json_list(row.get::<_, Option<String>>(9)?.as_deref()),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_insight(row: &Row) -> rusqlite::Result<Insight> {
    Ok(Insight {
        id: row.get(0)?,
        project_id: row.get(1)?,
        agent_type: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        priority: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_document(row: &Row) -> rusqlite::Result<KbDocument> {
    Ok(KbDocument {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        summary: row.get(4)?,
        source: row.get(5)?,
        project_id: row.get(6)?,
        tags: Vec::new(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KbSource, TaskStatus};

    fn store_with_project() -> (Store, Project) {
        let store = Store::in_memory().unwrap();
        let project = store
            .create_project(&NewProject {
                name: "acme".into(),
                path: "/src/acme".into(),
                ..Default::default()
            })
            .unwrap();
        (store, project)
    }

    fn task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let (store, _) = store_with_project();
        let err = store
            .create_project(&NewProject {
                name: "other".into(),
                path: "/src/acme".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ForemanError::ProjectExists(_)));
    }

    #[test]
    fn missing_project_is_not_found() {
        let store = Store::in_memory().unwrap();
        assert!(matches!(
            store.get_project("nope"),
            Err(ForemanError::ProjectNotFound(_))
        ));
        assert!(matches!(
            store.create_task("nope", &task("x")),
            Err(ForemanError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn task_order_continues_from_max() {
        let (store, project) = store_with_project();
        let first = store.create_task(&project.id, &task("first")).unwrap();
        assert_eq!(first.order, 0);
        store
            .create_task(
                &project.id,
                &NewTask {
                    order: Some(10),
                    ..task("pinned")
                },
            )
            .unwrap();
        let next = store.create_task(&project.id, &task("next")).unwrap();
        assert_eq!(next.order, 11);
        assert_eq!(store.max_task_order(&project.id).unwrap(), Some(11));

        let titles: Vec<_> = store
            .list_tasks(&project.id)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["first", "pinned", "next"]);
    }

    #[test]
    fn update_task_applies_only_given_fields() {
        let (store, project) = store_with_project();
        let created = store
            .create_task(
                &project.id,
                &NewTask {
                    description: Some("keep me".into()),
                    ..task("t")
                },
            )
            .unwrap();
        let updated = store
            .update_task(
                &created.id,
                &TaskUpdate {
                    status: Some(TaskStatus::Done),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.description.as_deref(), Some("keep me"));
        assert_eq!(store.get_task(&created.id).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn agent_type_is_unique_per_project() {
        let (store, project) = store_with_project();
        let agent = NewAgent {
            agent_type: "security".into(),
            name: "Security".into(),
            icon: None,
            description: String::new(),
            system_prompt: "Find vulnerabilities.".into(),
            task_categories: vec!["security".into()],
            is_default: false,
        };
        let created = store.create_agent(&project.id, &agent).unwrap();
        assert_eq!(created.icon, "🤖");
        assert!(created.is_active);
        assert!(matches!(
            store.create_agent(&project.id, &agent),
            Err(ForemanError::AgentExists { .. })
        ));

        store
            .update_agent(
                &created.id,
                &AgentUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.list_agents(&project.id, true).unwrap().is_empty());
        assert_eq!(store.list_agents(&project.id, false).unwrap().len(), 1);
    }

    #[test]
    fn deleting_project_cascades() {
        let (store, project) = store_with_project();
        let t = store.create_task(&project.id, &task("gone")).unwrap();
        store
            .create_insight(&project.id, "pm", "i", "i", Priority::Medium)
            .unwrap();
        store
            .create_document(&NewKbDocument {
                title: "Doc".into(),
                slug: "doc".into(),
                content: "body".into(),
                summary: None,
                source: KbSource::Markdown,
                project_id: Some(project.id.clone()),
                tags: vec!["api".into()],
            })
            .unwrap();

        store.delete_project(&project.id).unwrap();
        assert!(matches!(
            store.get_task(&t.id),
            Err(ForemanError::TaskNotFound(_))
        ));
        assert!(store.list_insights(&project.id).unwrap().is_empty());
        assert!(!store.slug_exists("doc").unwrap());
        assert!(store.list_tags().unwrap().is_empty());
    }

    #[test]
    fn documents_filter_by_tag_and_count_tags() {
        let store = Store::in_memory().unwrap();
        for (slug, tags) in [("a", vec!["api", "rust"]), ("b", vec!["rust"])] {
            store
                .create_document(&NewKbDocument {
                    title: slug.to_uppercase(),
                    slug: slug.into(),
                    content: "x".into(),
                    summary: None,
                    source: KbSource::Manual,
                    project_id: None,
                    tags: tags.into_iter().map(String::from).collect(),
                })
                .unwrap();
        }
        let api = store.list_documents(None, Some("api")).unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].tags, ["api", "rust"]);

        let tags = store.list_tags().unwrap();
        assert_eq!(tags[0].name, "rust");
        assert_eq!(tags[0].document_count, 2);

        let updated = store
            .update_document(
                "b",
                &KbDocumentUpdate {
                    tags: Some(vec!["Guide".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.tags, ["guide"]);
    }

    #[test]
    fn move_tasks_tags_with_source_name() {
        let (store, target) = store_with_project();
        let source = store
            .create_project(&NewProject {
                name: "acme-api".into(),
                path: "/src/acme-api".into(),
                ..Default::default()
            })
            .unwrap();
        store.create_task(&source.id, &task("from api")).unwrap();
        assert_eq!(store.move_tasks(&source.id, &target.id, "acme-api").unwrap(), 1);
        let moved = store.list_tasks(&target.id).unwrap();
        assert_eq!(moved[0].tags, ["acme-api"]);
        assert!(store.list_tasks(&source.id).unwrap().is_empty());
    }

    #[test]
    fn next_task_prefers_in_progress_then_priority_then_order() {
        let (store, project) = store_with_project();
        let add = |title: &str, priority: Priority, status: TaskStatus, agent: Option<&str>| {
            store
                .create_task(
                    &project.id,
                    &NewTask {
                        priority,
                        status,
                        agent_type: agent.map(String::from),
                        ..task(title)
                    },
                )
                .unwrap()
        };
        add("shipped", Priority::High, TaskStatus::Done, Some("seo"));
        add("low todo", Priority::Low, TaskStatus::Todo, Some("seo"));
        add("first high", Priority::High, TaskStatus::Todo, Some("technical"));
        add("second high", Priority::High, TaskStatus::Todo, Some("seo"));

        let next = store.next_task(&project.id, None).unwrap().unwrap();
        assert_eq!(next.title, "first high");
        let seo = store.next_task(&project.id, Some("seo")).unwrap().unwrap();
        assert_eq!(seo.title, "second high");

        add("started", Priority::Low, TaskStatus::InProgress, Some("pm"));
        let next = store.next_task(&project.id, None).unwrap().unwrap();
        assert_eq!(next.title, "started");

        assert!(store.next_task(&project.id, Some("pricing")).unwrap().is_none());
        assert!(matches!(
            store.next_task("nope", None),
            Err(ForemanError::ProjectNotFound(_))
        ));
    }
}
