pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod github;
pub mod io;
pub mod kb;
pub mod knowledge;
pub mod markdown;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod personas;
pub mod projects;
pub mod runner;
pub mod scanner;
pub mod similarity;
pub mod store;
pub mod types;

pub use error::{ForemanError, Result};
pub use orchestrator::{AnalysisSummary, GenerationSummary, Orchestrator};
pub use store::Store;
