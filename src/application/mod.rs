pub mod use_cases;

pub use use_cases::example_manager::ExampleManager;
pub use use_cases::text2sql_pipeline::Text2SqlPipeline;
