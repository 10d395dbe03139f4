//! Library interface for the sluice CLI

pub mod config;
pub mod tasks;

pub use config::{SluiceConfig, CONFIG_FILE};
pub use tasks::{
    compile_api_proposal_names, compile_task, task_name, transpile_task, watch_api_proposal_names, watch_task,
    CompileTaskOptions,
};
