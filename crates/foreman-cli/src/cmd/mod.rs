pub mod agent;
pub mod analyze;
pub mod config;
pub mod kb;
pub mod mcp;
pub mod project;
pub mod scan;
pub mod serve;
pub mod task;
