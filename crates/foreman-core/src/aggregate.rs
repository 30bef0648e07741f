//! Ranking, capping and de-duplicated persistence of candidate tasks.

use tracing::debug;

use crate::error::Result;
use crate::markdown::ExtractedTask;
use crate::model::{NewTask, Task};
use crate::runner::{AnalysisMap, ProposedTask};
use crate::similarity::SimilarityStrategy;
use crate::store::Store;
use crate::types::TaskStatus;

/// A persona task tagged with the persona that proposed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTask {
    pub agent_type: String,
    pub task: ProposedTask,
}

impl RankedTask {
    pub fn to_new_task(&self) -> NewTask {
        NewTask {
            title: self.task.title.clone(),
            description: non_empty(&self.task.description),
            priority: self.task.priority,
            status: TaskStatus::Todo,
            agent_type: Some(self.agent_type.clone()),
            ai_reasoning: non_empty(&self.task.reasoning),
            order: None,
            tags: Vec::new(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Every persona task, highest priority first, at most `cap` of them.
/// Ties keep persona order, then the order each persona listed them.
pub fn rank_agent_tasks(analyses: &AnalysisMap, cap: usize) -> Vec<RankedTask> {
    let mut ranked: Vec<RankedTask> = analyses
        .iter()
        .flat_map(|analysis| {
            analysis.tasks.iter().map(|task| RankedTask {
                agent_type: analysis.agent_type.clone(),
                task: task.clone(),
            })
        })
        .collect();
    // sort_by_key is stable
    ranked.sort_by_key(|r| std::cmp::Reverse(r.task.priority.score()));
    ranked.truncate(cap);
    ranked
}

/// Open markdown tasks, highest priority first, at most
/// `min(budget, markdown_cap)` of them.
pub fn select_markdown_tasks(
    tasks: Vec<ExtractedTask>,
    budget: usize,
    markdown_cap: usize,
) -> Vec<ExtractedTask> {
    let mut open: Vec<ExtractedTask> = tasks.into_iter().filter(|t| !t.is_completed).collect();
    open.sort_by_key(|t| std::cmp::Reverse(t.priority.score()));
    open.truncate(budget.min(markdown_cap));
    open
}

/// Persists tasks for one project, skipping near-duplicates and numbering
/// them after the project's current highest order.
///
/// Titles written through the writer count as existing for later
/// candidates in the same batch.
pub struct TaskWriter<'a> {
    store: &'a Store,
    project_id: String,
    similarity: &'a dyn SimilarityStrategy,
    threshold: f64,
    existing: Vec<String>,
    next_order: i64,
    created: usize,
    skipped: usize,
}

impl<'a> TaskWriter<'a> {
    pub fn new(
        store: &'a Store,
        project_id: &str,
        similarity: &'a dyn SimilarityStrategy,
        threshold: f64,
    ) -> Result<Self> {
        let existing = store.task_titles(project_id)?;
        let next_order = store.max_task_order(project_id)?.map_or(0, |max| max + 1);
        Ok(Self {
            store,
            project_id: project_id.to_string(),
            similarity,
            threshold,
            existing,
            next_order,
            created: 0,
            skipped: 0,
        })
    }

    pub fn is_duplicate(&self, title: &str) -> bool {
        self.similarity
            .is_duplicate(title, &self.existing, self.threshold)
    }

    /// Insert `task` unless its title duplicates an existing one. Returns
    /// `None` for a skipped duplicate.
    pub fn write(&mut self, mut task: NewTask) -> Result<Option<Task>> {
        if self.is_duplicate(&task.title) {
            debug!(title = %task.title, "skipping duplicate task");
            self.skipped += 1;
            return Ok(None);
        }
        task.order = Some(self.next_order);
        let created = self.store.create_task(&self.project_id, &task)?;
        self.next_order += 1;
        self.created += 1;
        self.existing.push(created.title.clone());
        Ok(Some(created))
    }

    /// Count a candidate rejected before reaching [`TaskWriter::write`].
    pub fn note_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total_tasks(&self) -> usize {
        self.existing.len()
    }
}
