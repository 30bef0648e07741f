use crate::output::print_json;
use crate::session::Session;
use anyhow::Context;
use clap::Subcommand;
use foreman_core::config::{Config, MaskedSettings};
use foreman_core::paths;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective settings with keys masked
    Show,

    /// Set a dotted key, e.g. `orchestration.task_cap 30`; an empty value clears optional keys
    Set { key: String, value: String },

    /// Print the config file location
    Path,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(session: &Session, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(&session.config.masked(), json),
        ConfigSubcommand::Set { key, value } => set(session, &key, &value, json),
        ConfigSubcommand::Path => {
            let path = paths::config_path(&session.data_dir);
            if json {
                return print_json(&serde_json::json!({ "path": path }));
            }
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn show(masked: &MaskedSettings, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(masked);
    }
    let provider = masked
        .provider
        .map(|p| p.to_string())
        .unwrap_or_else(|| "auto".into());
    println!("provider:          {provider} (active: {})", masked.active_provider);
    println!("anthropic model:   {}", masked.anthropic_model);
    println!("openai model:      {}", masked.openai_model);
    println!("anthropic key:     {}", key_line(masked.anthropic_api_key.as_deref()));
    println!("openai key:        {}", key_line(masked.openai_api_key.as_deref()));
    println!("github token:      {}", key_line(masked.github_token.as_deref()));
    let o = &masked.orchestration;
    println!("task cap:          {}", o.task_cap);
    println!("markdown task cap: {}", o.markdown_task_cap);
    println!("dup threshold:     {}", o.duplicate_threshold);
    println!("agent max tokens:  {}", o.agent_max_tokens);
    println!("fan-out:           {}", o.fan_out);
    Ok(())
}

fn key_line(masked: Option<&str>) -> &str {
    masked.unwrap_or("(not set)")
}

/// Only file values are written back; environment overrides stay out of
/// the file.
fn set(session: &Session, key: &str, value: &str, json: bool) -> anyhow::Result<()> {
    let mut file_config = Config::load(&session.data_dir)?;
    file_config.set(key, value)?;
    file_config
        .save(&session.data_dir)
        .with_context(|| format!("failed to write {}", paths::config_path(&session.data_dir).display()))?;

    let mut effective = file_config;
    effective.apply_env(|name| std::env::var(name).ok());
    if json {
        return print_json(&effective.masked());
    }
    println!("Set {key}");
    Ok(())
}
