//! The analysis pipeline for one project.
//!
//! ```text
//! fetch project → build context → project analysis → persist analysis
//!   → run active personas → persist insights → rank, dedup, persist tasks
//!   → mine, enrich, dedup, persist markdown tasks (if the cap allows)
//!   → mine, summarize, persist KB documents → summary
//! ```
//!
//! Markdown-task and KB stages log and degrade on failure; every earlier
//! stage fails the run. At most one run per project is in flight.
//!
//! Batch writes (insights and ranked persona tasks) run on the blocking
//! pool. Single-row lookups, and the markdown and KB writes that alternate
//! with model calls, stay on the async task.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use llm_agent::Generate;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{rank_agent_tasks, select_markdown_tasks, RankedTask, TaskWriter};
use crate::analysis::{analyze_project, enrich_task, summarize_document, ProjectAnalysis};
use crate::config::{FanOutPolicy, OrchestrationConfig};
use crate::context::{build_project_context, truncate_chars, ProjectContext};
use crate::error::{ForemanError, Result};
use crate::github::RepoHost;
use crate::kb;
use crate::knowledge::{create_document, DocumentInput};
use crate::markdown::extract_tasks_from_project;
use crate::model::{NewTask, Project};
use crate::personas::PM_AGENT_TYPE;
use crate::runner::{
    generate_all_agent_tasks, generate_all_agent_tasks_isolated, AgentFailure, AnalysisMap, Persona,
};
use crate::similarity::{SimilarityStrategy, WordOverlap};
use crate::store::Store;
use crate::types::{KbSource, Priority, TaskStatus};

const INSIGHT_TITLE_CHARS: usize = 100;

struct BatchOutcome {
    created: usize,
    skipped: usize,
    total: usize,
}

/// Default number of tasks requested by a follow-up generation run.
pub const DEFAULT_MORE_TASKS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub analysis: ProjectAnalysis,
    pub agent_count: usize,
    pub total_tasks: usize,
    pub tasks_created: usize,
    /// Tasks the personas proposed before capping and dedup.
    pub tasks_available: usize,
    pub task_limit_reached: bool,
    pub agent_tasks: usize,
    pub markdown_tasks: usize,
    pub kb_documents: usize,
    pub total_insights: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<AgentFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub tasks_generated: usize,
    pub total_tasks: usize,
    pub duplicates_skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<AgentFailure>,
}

/// Marks a project busy until dropped.
struct RunGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    project_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.project_id);
    }
}

pub struct Orchestrator {
    store: Arc<Store>,
    generator: Arc<dyn Generate>,
    repo_host: Arc<dyn RepoHost>,
    similarity: Arc<dyn SimilarityStrategy>,
    settings: RwLock<OrchestrationConfig>,
    in_flight: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        generator: Arc<dyn Generate>,
        repo_host: Arc<dyn RepoHost>,
        settings: OrchestrationConfig,
    ) -> Self {
        Self {
            store,
            generator,
            repo_host,
            similarity: Arc::new(WordOverlap),
            settings: RwLock::new(settings),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityStrategy>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn generator(&self) -> &Arc<dyn Generate> {
        &self.generator
    }

    /// Settings a new run will use.
    pub fn settings(&self) -> OrchestrationConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings. Runs already in flight keep their snapshot.
    pub fn set_settings(&self, settings: OrchestrationConfig) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn is_running(&self, project_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(project_id)
    }

    fn begin(&self, project_id: &str) -> Result<RunGuard<'_>> {
        let mut running = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !running.insert(project_id.to_string()) {
            return Err(ForemanError::AnalysisInProgress(project_id.to_string()));
        }
        Ok(RunGuard {
            in_flight: &self.in_flight,
            project_id: project_id.to_string(),
        })
    }

    /// Run store work on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// Persist insights, then write `tasks` in order through a fresh
    /// [`TaskWriter`].
    async fn persist_batch(
        &self,
        project_id: &str,
        settings: &OrchestrationConfig,
        insights: Vec<(String, String)>,
        tasks: Vec<NewTask>,
    ) -> Result<BatchOutcome> {
        let project_id = project_id.to_string();
        let similarity = self.similarity.clone();
        let threshold = settings.duplicate_threshold;
        self.blocking(move |store| {
            for (agent_type, insight) in &insights {
                store.create_insight(
                    &project_id,
                    agent_type,
                    truncate_chars(insight, INSIGHT_TITLE_CHARS),
                    insight,
                    Priority::Medium,
                )?;
            }
            let mut writer = TaskWriter::new(store, &project_id, similarity.as_ref(), threshold)?;
            for task in tasks {
                writer.write(task)?;
            }
            Ok(BatchOutcome {
                created: writer.created(),
                skipped: writer.skipped(),
                total: writer.total_tasks(),
            })
        })
        .await
    }

    fn writer(&self, project_id: &str, settings: &OrchestrationConfig) -> Result<TaskWriter<'_>> {
        TaskWriter::new(
            &self.store,
            project_id,
            self.similarity.as_ref(),
            settings.duplicate_threshold,
        )
    }

    fn active_personas(&self, project_id: &str) -> Result<Vec<Persona>> {
        Ok(self
            .store
            .list_agents(project_id, true)?
            .iter()
            .map(Persona::from)
            .collect())
    }

    async fn run_personas(
        &self,
        personas: &[Persona],
        ctx: &ProjectContext,
        settings: &OrchestrationConfig,
    ) -> Result<(AnalysisMap, Vec<AgentFailure>)> {
        let generator = self.generator.as_ref();
        let max_tokens = settings.agent_max_tokens;
        match settings.fan_out {
            FanOutPolicy::AllOrNothing => {
                let analyses = generate_all_agent_tasks(generator, personas, ctx, max_tokens).await?;
                Ok((analyses, Vec::new()))
            }
            FanOutPolicy::Isolate => {
                let run =
                    generate_all_agent_tasks_isolated(generator, personas, ctx, max_tokens).await;
                Ok((run.analyses, run.failures))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Full analysis
    // -----------------------------------------------------------------------

    pub async fn orchestrate_project_analysis(&self, project_id: &str) -> Result<AnalysisSummary> {
        let _guard = self.begin(project_id)?;
        let settings = self.settings();
        let project = self.store.get_project(project_id)?;
        info!(project = %project.name, "starting analysis");

        let ctx = build_project_context(&self.store, self.repo_host.as_ref(), &project).await?;

        let analysis = analyze_project(self.generator.as_ref(), &ctx).await?;
        self.store
            .update_analysis(project_id, &analysis.summary, &analysis.tech_stack)?;

        let personas = self.active_personas(project_id)?;
        info!(project = %project.name, personas = personas.len(), "running personas");
        let (analyses, failed_agents) = self.run_personas(&personas, &ctx, &settings).await?;

        let insights = analyses
            .iter()
            .flat_map(|a| a.insights.iter().map(move |i| (a.agent_type.clone(), i.clone())))
            .collect();
        let cap = settings.task_cap;
        let ranked = rank_agent_tasks(&analyses, cap)
            .iter()
            .map(RankedTask::to_new_task)
            .collect();
        let agent_tasks = self
            .persist_batch(project_id, &settings, insights, ranked)
            .await?
            .created;
        info!(project = %project.name, agent_tasks, "persisted persona tasks");

        let budget = cap.saturating_sub(agent_tasks);
        let mut writer = self.writer(project_id, &settings)?;
        if budget > 0 {
            if let Err(e) = self
                .persist_markdown_tasks(&mut writer, &ctx, &project, budget, settings.markdown_task_cap)
                .await
            {
                warn!(project = %project.name, "markdown task extraction failed: {e}");
            }
        } else {
            info!(project = %project.name, "task cap reached, skipping markdown tasks");
        }
        let markdown_tasks = writer.created();

        let mut kb_documents = 0;
        if let Err(e) = self.persist_kb_documents(&project, &mut kb_documents).await {
            warn!(project = %project.name, kb_documents, "knowledge-base extraction failed: {e}");
        }

        let tasks_available = analyses.total_tasks();
        let summary = AnalysisSummary {
            analysis,
            agent_count: personas.len(),
            total_tasks: agent_tasks + markdown_tasks,
            tasks_created: agent_tasks + markdown_tasks,
            tasks_available,
            task_limit_reached: tasks_available > cap,
            agent_tasks,
            markdown_tasks,
            kb_documents,
            total_insights: analyses.total_insights(),
            failed_agents,
        };
        info!(
            project = %project.name,
            tasks = summary.tasks_created,
            insights = summary.total_insights,
            kb_documents,
            "analysis complete"
        );
        Ok(summary)
    }

    async fn persist_markdown_tasks(
        &self,
        writer: &mut TaskWriter<'_>,
        ctx: &ProjectContext,
        project: &Project,
        budget: usize,
        markdown_cap: usize,
    ) -> Result<()> {
        let scan = extract_tasks_from_project(Path::new(&project.path)).await;
        info!(found = scan.tasks.len(), "mined markdown tasks");
        let selected = select_markdown_tasks(scan.tasks, budget, markdown_cap);
        for task in selected {
            if writer.is_duplicate(&task.title) {
                writer.note_skipped();
                continue;
            }
            let markdown_context = scan.files.get(&task.source).map_or("", String::as_str);
            let enriched =
                enrich_task(self.generator.as_ref(), ctx, &task, markdown_context).await;
            writer.write(NewTask {
                title: task.title,
                description: Some(enriched.description),
                priority: task.priority,
                status: TaskStatus::Todo,
                agent_type: Some(PM_AGENT_TYPE.to_string()),
                ai_reasoning: Some(enriched.reasoning),
                order: None,
                tags: Vec::new(),
            })?;
        }
        Ok(())
    }

    /// Documents whose title the project already has are skipped. `created`
    /// counts what was committed, including before an error.
    async fn persist_kb_documents(&self, project: &Project, created: &mut usize) -> Result<()> {
        let documents = kb::extract_documents(Path::new(&project.path)).await;
        let mut known = self.store.document_titles(&project.id)?;
        for doc in documents {
            if known.contains(&doc.title) {
                continue;
            }
            let summary = summarize_document(self.generator.as_ref(), &doc.title, &doc.content).await;
            let title = doc.title.clone();
            create_document(
                &self.store,
                DocumentInput {
                    title: doc.title,
                    content: doc.content,
                    summary: Some(summary),
                    project_id: Some(project.id.clone()),
                    tags: doc.tags,
                },
                KbSource::Markdown,
            )?;
            known.push(title);
            *created += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Follow-up generation
    // -----------------------------------------------------------------------

    /// Ask the active personas for more work using only the project's name
    /// and description, and keep up to `count` new, non-duplicate tasks.
    pub async fn generate_more_tasks(
        &self,
        project_id: &str,
        count: usize,
    ) -> Result<GenerationSummary> {
        let _guard = self.begin(project_id)?;
        let settings = self.settings();
        let project = self.store.get_project(project_id)?;
        let personas = self.active_personas(project_id)?;
        let ctx = ProjectContext::minimal(&project);
        info!(project = %project.name, count, "generating more tasks");

        let (analyses, failed_agents) = self.run_personas(&personas, &ctx, &settings).await?;
        let ranked = rank_agent_tasks(&analyses, count)
            .iter()
            .map(RankedTask::to_new_task)
            .collect();
        let outcome = self
            .persist_batch(project_id, &settings, Vec::new(), ranked)
            .await?;
        info!(
            project = %project.name,
            created = outcome.created,
            duplicates = outcome.skipped,
            "generated more tasks"
        );
        Ok(GenerationSummary {
            tasks_generated: outcome.created,
            total_tasks: outcome.total,
            duplicates_skipped: outcome.skipped,
            failed_agents,
        })
    }
}
