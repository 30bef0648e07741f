mod cmd;
mod output;
mod session;
mod tools;

use clap::{Parser, Subcommand};
use cmd::{
    agent::AgentSubcommand, config::ConfigSubcommand, kb::KbSubcommand,
    project::ProjectSubcommand, task::TaskSubcommand,
};
use session::Session;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "foreman",
    about = "AI project manager: scan repositories, run persona analyses, and keep a task board",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory (default: ~/.foreman)
    #[arg(long, global = true, env = "FOREMAN_HOME")]
    data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every git repository under a directory as a project
    Scan {
        dir: PathBuf,
        /// Run a full analysis on each newly created project
        #[arg(long)]
        analyze: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Run the full persona analysis for a project
    Analyze { project_id: String },

    /// Ask the personas for more tasks
    Generate {
        project_id: String,
        /// Maximum number of new tasks
        #[arg(long, default_value_t = foreman_core::orchestrator::DEFAULT_MORE_TASKS)]
        count: usize,
    },

    /// Manage a project's task board
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Manage a project's personas
    Agent {
        #[command(subcommand)]
        subcommand: AgentSubcommand,
    },

    /// Manage the knowledge base
    Kb {
        #[command(subcommand)]
        subcommand: KbSubcommand,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Serve the project board to coding agents over MCP (stdio)
    Mcp,

    /// Serve the HTTP API
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "3141")]
        port: u16,

        /// Open the API in a browser once listening
        #[arg(long)]
        open: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Analyze { .. } | Commands::Scan { analyze: true, .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = Session::resolve(cli.data_dir.as_deref()).and_then(|session| {
        let json = cli.json;
        match cli.command {
            Commands::Scan { dir, analyze } => cmd::scan::run(&session, &dir, analyze, json),
            Commands::Project { subcommand } => cmd::project::run(&session, subcommand, json),
            Commands::Analyze { project_id } => cmd::analyze::run(&session, &project_id, json),
            Commands::Generate { project_id, count } => {
                cmd::analyze::generate(&session, &project_id, count, json)
            }
            Commands::Task { subcommand } => cmd::task::run(&session, subcommand, json),
            Commands::Agent { subcommand } => cmd::agent::run(&session, subcommand, json),
            Commands::Kb { subcommand } => cmd::kb::run(&session, subcommand, json),
            Commands::Config { subcommand } => cmd::config::run(&session, subcommand, json),
            Commands::Mcp => cmd::mcp::run(&session),
            Commands::Serve { port, open } => cmd::serve::run(session, port, open),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
