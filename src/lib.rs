pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;
mod shared;

pub use application::use_cases::example_manager::ExampleManager;
pub use application::use_cases::text2sql_pipeline::{
    PipelineComponents, PipelineOutcome, PipelineResponse, PipelineSettings, Text2SqlPipeline,
};
pub use domain::error::{AppError, PipelineError, Result};
pub use infrastructure::bootstrap::{init_tracing, setup, Text2SqlApp};
pub use infrastructure::config::AppConfig;

pub fn run() {
    app::run()
}
