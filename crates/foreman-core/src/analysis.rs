//! Single-call generation steps: project overview, markdown task
//! enrichment and document summaries.

use llm_agent::{Generate, GenerateOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::context::{truncate_chars, ProjectContext};
use crate::error::Result;
use crate::kb::fallback_summary;
use crate::markdown::ExtractedTask;
use crate::runner::extract_json_object;

const ANALYST_SYSTEM_PROMPT: &str = "You are an expert software project analyst. You assess \
projects as a whole: their technology stack, architecture patterns, strengths and where they \
could improve.";

const ENRICH_SYSTEM_PROMPT: &str = "You are a technical project analyst helping to understand \
and prioritize software development tasks.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a technical documentation summarizer.";

const ANALYSIS_README_CHARS: usize = 8000;
const ANALYSIS_FALLBACK_CHARS: usize = 500;
const ENRICH_CONTEXT_CHARS: usize = 1000;
const ENRICH_MAX_TOKENS: u32 = 300;
const SUMMARY_CONTENT_CHARS: usize = 3000;
const SUMMARY_MAX_TOKENS: u32 = 200;

// ---------------------------------------------------------------------------
// Project analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default = "unknown_project_type")]
    pub project_type: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

fn unknown_project_type() -> String {
    "unknown".to_string()
}

impl ProjectAnalysis {
    /// Structured reply if there is one, else the first 500 characters of
    /// the raw text as the summary.
    pub fn parse(text: &str) -> Self {
        if let Some(json) = extract_json_object(text) {
            match serde_json::from_str(json) {
                Ok(analysis) => return analysis,
                Err(e) => warn!("project analysis was not valid JSON: {e}"),
            }
        }
        Self {
            summary: truncate_chars(text, ANALYSIS_FALLBACK_CHARS).to_string(),
            project_type: unknown_project_type(),
            ..Default::default()
        }
    }
}

fn analysis_prompt(ctx: &ProjectContext) -> String {
    format!(
        "Analyze this project:\n\n\
         **Project Name:** {}\n**Description:** {}\n**Repository:** {}\n\n\
         **README Content:**\n{}\n\n\
         **Code Structure:**\n{}\n\n\
         Provide:\n\
         1. A short summary of what the project does\n\
         2. The technology stack\n\
         3. The project type (web app, library, CLI tool, ...)\n\
         4. Its main strengths\n\
         5. Recommendations for improvement\n\n\
         Respond with JSON:\n\
         {{\n  \"summary\": \"...\",\n  \"techStack\": [\"tech1\", \"tech2\"],\n  \
         \"projectType\": \"...\",\n  \"strengths\": [\"strength1\"],\n  \
         \"recommendations\": [\"rec1\"]\n}}",
        ctx.name,
        ctx.description.as_deref().unwrap_or("Not provided"),
        ctx.repo_url.as_deref().unwrap_or("Not provided"),
        ctx.readme
            .as_deref()
            .map(|r| truncate_chars(r, ANALYSIS_README_CHARS))
            .unwrap_or("No README available"),
        ctx.code_structure.as_deref().unwrap_or("Not analyzed"),
    )
}

/// The project-level overview. A generation failure propagates.
pub async fn analyze_project(
    generator: &dyn Generate,
    ctx: &ProjectContext,
) -> Result<ProjectAnalysis> {
    let generation = generator
        .generate(
            ANALYST_SYSTEM_PROMPT,
            &analysis_prompt(ctx),
            &GenerateOptions::default(),
        )
        .await?;
    Ok(ProjectAnalysis::parse(&generation.text))
}

// ---------------------------------------------------------------------------
// Markdown task enrichment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedTask {
    pub description: String,
    pub reasoning: String,
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)DESCRIPTION:\s*(.+?)(?:REASONING:|$)").expect("valid regex"))
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)REASONING:\s*(.+)$").expect("valid regex"))
}

fn section(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Read a `DESCRIPTION: … REASONING: …` reply; absent sections get
/// source-based defaults.
pub fn parse_enrichment(text: &str, task: &ExtractedTask) -> EnrichedTask {
    EnrichedTask {
        description: section(description_re(), text)
            .unwrap_or_else(|| format!("{}. Extracted from {}.", task.title, task.source)),
        reasoning: section(reasoning_re(), text).unwrap_or_else(|| {
            format!(
                "Task identified in {} as part of project development goals.",
                task.source
            )
        }),
    }
}

fn enrichment_prompt(task: &ExtractedTask, ctx: &ProjectContext, markdown_context: &str) -> String {
    let mut prompt = String::from(
        "This task was pulled from a markdown file in the project. Provide:\n\
         1. A fuller description of WHAT needs doing and WHY it matters\n\
         2. Technical reasoning about its importance and impact\n\
         3. Any context you can infer from the project type and the task itself\n\n",
    );
    prompt.push_str(&format!("Project: {}\n", ctx.name));
    if let Some(description) = &ctx.description {
        prompt.push_str(&format!("Description: {description}\n"));
    }
    if !ctx.tech_stack.is_empty() {
        prompt.push_str(&format!("Tech Stack: {}\n", ctx.tech_stack.join(", ")));
    }
    prompt.push_str(&format!(
        "\nTask Title: {}\nSource File: {}\nOriginal Description: {}\n\n\
         Surrounding markdown:\n{}\n\n\
         Answer in exactly this format:\n\
         DESCRIPTION: [2-3 sentences on what needs doing and why]\n\
         REASONING: [2-3 sentences on technical importance, impact and priority]",
        task.title,
        task.source,
        task.description.as_deref().unwrap_or("None"),
        truncate_chars(markdown_context, ENRICH_CONTEXT_CHARS),
    ));
    prompt
}

/// Turn a bare checklist line into a description and reasoning. Never
/// fails: a generation error falls back to the task's own text.
pub async fn enrich_task(
    generator: &dyn Generate,
    ctx: &ProjectContext,
    task: &ExtractedTask,
    markdown_context: &str,
) -> EnrichedTask {
    let opts = GenerateOptions::with_max_tokens(ENRICH_MAX_TOKENS);
    match generator
        .generate(
            ENRICH_SYSTEM_PROMPT,
            &enrichment_prompt(task, ctx, markdown_context),
            &opts,
        )
        .await
    {
        Ok(generation) => parse_enrichment(&generation.text, task),
        Err(e) => {
            warn!(title = %task.title, "task enrichment failed: {e}");
            EnrichedTask {
                description: task
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Extracted from {}", task.source)),
                reasoning: format!(
                    "Task extracted from {} as part of project development.",
                    task.source
                ),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Document summaries
// ---------------------------------------------------------------------------

/// Two or three sentences about a document. Never fails: on a generation
/// error or an empty reply the first substantial line is used.
pub async fn summarize_document(generator: &dyn Generate, title: &str, content: &str) -> String {
    let prompt = format!(
        "Summarize this documentation in 2-3 concise sentences. Focus on its purpose \
         and the main topics it covers.\n\nTitle: {title}\n\nContent:\n{}\n\n\
         Reply with the summary only.",
        truncate_chars(content, SUMMARY_CONTENT_CHARS)
    );
    let opts = GenerateOptions::with_max_tokens(SUMMARY_MAX_TOKENS);
    match generator.generate(SUMMARY_SYSTEM_PROMPT, &prompt, &opts).await {
        Ok(generation) if !generation.text.trim().is_empty() => generation.text.trim().to_string(),
        Ok(_) => fallback_summary(content),
        Err(e) => {
            warn!(title, "document summary failed: {e}");
            fallback_summary(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use llm_agent::ScriptedGenerator;

    fn md_task() -> ExtractedTask {
        ExtractedTask {
            title: "configure CI caching".into(),
            description: None,
            priority: Priority::Medium,
            source: "TODO.md".into(),
            is_completed: false,
        }
    }

    #[test]
    fn analysis_falls_back_to_raw_text() {
        let parsed = ProjectAnalysis::parse(&"plain words ".repeat(100));
        assert_eq!(parsed.summary.chars().count(), ANALYSIS_FALLBACK_CHARS);
        assert_eq!(parsed.project_type, "unknown");
        assert!(parsed.tech_stack.is_empty());

        let parsed = ProjectAnalysis::parse(
            r#"Sure! {"summary": "A CLI", "techStack": ["rust"], "projectType": "CLI tool"}"#,
        );
        assert_eq!(parsed.summary, "A CLI");
        assert_eq!(parsed.tech_stack, ["rust"]);
        assert_eq!(parsed.project_type, "CLI tool");
        assert!(parsed.strengths.is_empty());
    }

    #[test]
    fn enrichment_sections_and_defaults() {
        let task = md_task();
        let full = parse_enrichment(
            "DESCRIPTION: Cache cargo builds.\nREASONING: Builds are slow.",
            &task,
        );
        assert_eq!(full.description, "Cache cargo builds.");
        assert_eq!(full.reasoning, "Builds are slow.");

        let partial = parse_enrichment("DESCRIPTION: Only this.", &task);
        assert_eq!(partial.description, "Only this.");
        assert_eq!(
            partial.reasoning,
            "Task identified in TODO.md as part of project development goals."
        );

        let none = parse_enrichment("free text", &task);
        assert_eq!(none.description, "configure CI caching. Extracted from TODO.md.");
    }

    #[tokio::test]
    async fn enrichment_failure_uses_task_text() {
        let generator = ScriptedGenerator::failing("down");
        let enriched =
            enrich_task(&generator, &ProjectContext::default(), &md_task(), "").await;
        assert_eq!(enriched.description, "Extracted from TODO.md");
        assert_eq!(
            enriched.reasoning,
            "Task extracted from TODO.md as part of project development."
        );
        assert_eq!(generator.calls()[0].opts.max_tokens, Some(ENRICH_MAX_TOKENS));
    }

    #[tokio::test]
    async fn summary_uses_reply_or_first_line() {
        let content = "# Guide\n\nThis guide walks through deploying the service.\n";
        let ok = ScriptedGenerator::new("  A deployment guide.  ");
        assert_eq!(summarize_document(&ok, "Guide", content).await, "A deployment guide.");

        let down = ScriptedGenerator::failing("down");
        assert_eq!(
            summarize_document(&down, "Guide", content).await,
            "This guide walks through deploying the service."
        );
    }

    #[tokio::test]
    async fn project_analysis_error_propagates() {
        let down = ScriptedGenerator::failing("down");
        assert!(analyze_project(&down, &ProjectContext::default()).await.is_err());
    }
}
