//! Runs personas against a context bundle and parses what they say.

use futures::future::{join_all, try_join_all};
use llm_agent::{Generate, GenerateOptions};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::context::{truncate_chars, ProjectContext};
use crate::model::Agent;
use crate::personas::{PersonaDefinition, TECHNICAL_AGENT_TYPE};
use crate::types::Priority;

pub const DEFAULT_AGENT_MAX_TOKENS: u32 = 3000;

const README_CHARS: usize = 3000;
const MANIFEST_CHARS: usize = 2000;
const MAX_LISTED_PRS: usize = 5;
const MAX_LISTED_ISSUES: usize = 5;

/// The single insight a persona gets when its reply cannot be parsed.
pub const UNEXPECTED_FORMAT_INSIGHT: &str =
    "Analysis completed but response format was unexpected";

// ---------------------------------------------------------------------------
// Personas and analyses
// ---------------------------------------------------------------------------

/// What the runner needs from an agent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub agent_type: String,
    pub name: String,
    pub system_prompt: String,
}

impl From<&Agent> for Persona {
    fn from(agent: &Agent) -> Self {
        Self {
            agent_type: agent.agent_type.clone(),
            name: agent.name.clone(),
            system_prompt: agent.system_prompt.clone(),
        }
    }
}

impl From<&PersonaDefinition> for Persona {
    fn from(def: &PersonaDefinition) -> Self {
        Self {
            agent_type: def.agent_type.to_string(),
            name: def.name.to_string(),
            system_prompt: def.system_prompt.to_string(),
        }
    }
}

/// A task as a persona proposed it. Every field tolerates being absent,
/// null or oddly typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedTask {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Priority,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAnalysis {
    pub agent_type: String,
    pub insights: Vec<String>,
    pub tasks: Vec<ProposedTask>,
    pub recommendations: Vec<String>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default, deserialize_with = "lenient_strings")]
    insights: Vec<String>,
    #[serde(default, deserialize_with = "lenient_tasks")]
    tasks: Vec<ProposedTask>,
    #[serde(default, deserialize_with = "lenient_strings")]
    recommendations: Vec<String>,
}

fn value_to_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_text(serde_json::Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_priority<'de, D: Deserializer<'de>>(d: D) -> Result<Priority, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.into_iter().filter_map(value_to_text).collect(),
        other => value_to_text(other).into_iter().collect(),
    })
}

fn lenient_tasks<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ProposedTask>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<ProposedTask>(item).ok())
        .filter(|task| !task.title.trim().is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Result of reading one persona reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAnalysis {
    Structured(AgentAnalysis),
    Degraded { agent_type: String, reason: String },
}

impl ParsedAnalysis {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ParsedAnalysis::Degraded { .. })
    }

    /// Degraded replies become one warning insight with no tasks.
    pub fn into_analysis(self) -> AgentAnalysis {
        match self {
            ParsedAnalysis::Structured(analysis) => analysis,
            ParsedAnalysis::Degraded { agent_type, .. } => AgentAnalysis {
                agent_type,
                insights: vec![UNEXPECTED_FORMAT_INSIGHT.to_string()],
                tasks: Vec::new(),
                recommendations: Vec::new(),
            },
        }
    }
}

/// The first balanced `{ ... }` in `text`, honouring JSON string escapes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_agent_response(agent_type: &str, text: &str) -> ParsedAnalysis {
    let Some(json) = extract_json_object(text) else {
        return ParsedAnalysis::Degraded {
            agent_type: agent_type.to_string(),
            reason: "no JSON object in response".to_string(),
        };
    };
    match serde_json::from_str::<RawAnalysis>(json) {
        Ok(raw) => ParsedAnalysis::Structured(AgentAnalysis {
            agent_type: agent_type.to_string(),
            insights: raw.insights,
            tasks: raw.tasks,
            recommendations: raw.recommendations,
        }),
        Err(e) => ParsedAnalysis::Degraded {
            agent_type: agent_type.to_string(),
            reason: e.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

pub fn build_agent_prompt(persona: &Persona, ctx: &ProjectContext) -> String {
    let mut prompt = format!(
        "Review this project from the point of view of your specialty.\n\n\
         **Project:** {}\n**Description:** {}\n**Repository:** {}\n\n",
        ctx.name,
        ctx.description.as_deref().unwrap_or("Not provided"),
        ctx.repo_url.as_deref().unwrap_or("Not provided"),
    );

    if let Some(readme) = &ctx.readme {
        prompt.push_str(&format!(
            "**README:**\n{}\n\n",
            truncate_chars(readme, README_CHARS)
        ));
    }
    if !ctx.tech_stack.is_empty() {
        prompt.push_str(&format!("**Tech Stack:** {}\n\n", ctx.tech_stack.join(", ")));
    }
    if let Some(structure) = &ctx.code_structure {
        prompt.push_str(&format!("**Code Structure:**\n{structure}\n\n"));
    }
    if let Some(manifest) = &ctx.manifest {
        prompt.push_str(&format!(
            "**Dependencies:**\n{}\n\n",
            truncate_chars(&manifest.render(), MANIFEST_CHARS)
        ));
    }
    if !ctx.open_prs.is_empty() {
        prompt.push_str(&format!("**Open Pull Requests ({}):**\n", ctx.open_prs.len()));
        for pr in ctx.open_prs.iter().take(MAX_LISTED_PRS) {
            prompt.push_str(&format!("- #{}: {}\n", pr.number, pr.title));
        }
        prompt.push('\n');
    }
    if !ctx.open_issues.is_empty() {
        prompt.push_str(&format!("**Open Issues ({}):**\n", ctx.open_issues.len()));
        for issue in ctx.open_issues.iter().take(MAX_LISTED_ISSUES) {
            prompt.push_str(&format!("- #{}: {}\n", issue.number, issue.title));
        }
        prompt.push('\n');
    }

    let technical = persona.agent_type == TECHNICAL_AGENT_TYPE;
    if technical {
        prompt.push_str(
            "**FOR THIS TECHNICAL REVIEW:**\n\
             - Point at SPECIFIC files, functions or components from the structure above\n\
             - Name the patterns you actually see in the layout and dependencies\n\
             - Call out individual dependencies that need attention (version, security, size)\n\
             - Give every task concrete file paths and technical detail\n\
             - No generic advice: be as precise as the information above allows\n\n",
        );
    }

    prompt.push_str(&format!(
        "From your analysis, provide:\n\n\
         1. **Key Insights** - 2-4 SPECIFIC observations about this project from your {} perspective\n\
         2. **Actionable Tasks** - 3-7 CONCRETE tasks to add to the project board\n\
         3. **Recommendations** - higher-level strategic recommendations\n\n\
         Respond with JSON in exactly this shape:\n\
         {{\n  \"insights\": [\"insight1\", \"insight2\"],\n  \"tasks\": [\n    {{\n      \
         \"title\": \"Specific task title naming files or components\",\n      \
         \"description\": \"Detailed description with technical context\",\n      \
         \"priority\": \"high|medium|low\",\n      \
         \"reasoning\": \"Why the task matters and what it changes\"\n    }}\n  ],\n  \
         \"recommendations\": [\"rec1\", \"rec2\"]\n}}\n\n",
        persona.name
    ));
    prompt.push_str(if technical {
        "Be SPECIFIC and TECHNICAL. Reference the files, dependencies and patterns you observe. No generic tasks."
    } else {
        "Be specific and actionable. Prefer tasks someone could start on today."
    });
    prompt
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One persona, one generation call. Only the generation call itself can
/// fail; a malformed reply degrades instead.
pub async fn generate_tasks_with_agent(
    generator: &dyn Generate,
    persona: &Persona,
    ctx: &ProjectContext,
    max_tokens: u32,
) -> llm_agent::Result<AgentAnalysis> {
    let prompt = build_agent_prompt(persona, ctx);
    let opts = GenerateOptions::with_max_tokens(max_tokens);
    let generation = generator
        .generate(&persona.system_prompt, &prompt, &opts)
        .await?;
    let parsed = parse_agent_response(&persona.agent_type, &generation.text);
    if let ParsedAnalysis::Degraded { reason, .. } = &parsed {
        warn!(agent = %persona.agent_type, "unparseable persona response: {reason}");
    }
    let analysis = parsed.into_analysis();
    debug!(
        agent = %analysis.agent_type,
        tasks = analysis.tasks.len(),
        insights = analysis.insights.len(),
        "persona finished"
    );
    Ok(analysis)
}

/// Analyses keyed by persona type, in persona order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnalysisMap {
    entries: Vec<AgentAnalysis>,
}

impl AnalysisMap {
    /// Insert, replacing (in place) any analysis for the same type.
    pub fn insert(&mut self, analysis: AgentAnalysis) {
        match self
            .entries
            .iter_mut()
            .find(|a| a.agent_type == analysis.agent_type)
        {
            Some(slot) => *slot = analysis,
            None => self.entries.push(analysis),
        }
    }

    pub fn get(&self, agent_type: &str) -> Option<&AgentAnalysis> {
        self.entries.iter().find(|a| a.agent_type == agent_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentAnalysis> {
        self.entries.iter()
    }

    pub fn total_tasks(&self) -> usize {
        self.entries.iter().map(|a| a.tasks.len()).sum()
    }

    pub fn total_insights(&self) -> usize {
        self.entries.iter().map(|a| a.insights.len()).sum()
    }
}

impl FromIterator<AgentAnalysis> for AnalysisMap {
    fn from_iter<I: IntoIterator<Item = AgentAnalysis>>(iter: I) -> Self {
        let mut map = AnalysisMap::default();
        for analysis in iter {
            map.insert(analysis);
        }
        map
    }
}

impl<'a> IntoIterator for &'a AnalysisMap {
    type Item = &'a AgentAnalysis;
    type IntoIter = std::slice::Iter<'a, AgentAnalysis>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Run every persona concurrently. The first generation failure fails the
/// whole call and the other personas' results are dropped.
pub async fn generate_all_agent_tasks(
    generator: &dyn Generate,
    personas: &[Persona],
    ctx: &ProjectContext,
    max_tokens: u32,
) -> llm_agent::Result<AnalysisMap> {
    info!(personas = personas.len(), "running personas");
    let analyses = try_join_all(
        personas
            .iter()
            .map(|p| generate_tasks_with_agent(generator, p, ctx, max_tokens)),
    )
    .await?;
    Ok(analyses.into_iter().collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailure {
    pub agent_type: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolatedRun {
    pub analyses: AnalysisMap,
    pub failures: Vec<AgentFailure>,
}

/// Run every persona concurrently, keeping the successes when some fail.
pub async fn generate_all_agent_tasks_isolated(
    generator: &dyn Generate,
    personas: &[Persona],
    ctx: &ProjectContext,
    max_tokens: u32,
) -> IsolatedRun {
    info!(personas = personas.len(), "running personas (isolated)");
    let results = join_all(
        personas
            .iter()
            .map(|p| generate_tasks_with_agent(generator, p, ctx, max_tokens)),
    )
    .await;
    let mut run = IsolatedRun::default();
    for (persona, result) in personas.iter().zip(results) {
        match result {
            Ok(analysis) => run.analyses.insert(analysis),
            Err(e) => {
                warn!(agent = %persona.agent_type, "persona failed: {e}");
                run.failures.push(AgentFailure {
                    agent_type: persona.agent_type.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    run
}
