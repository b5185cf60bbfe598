pub mod embedding_service;
pub mod example_manager;
pub mod example_retriever;
pub mod feedback_updater;
pub mod lexicon_manager;
pub mod prompt_assembler;
pub mod query_executor;
pub mod schema_context;
pub mod sql_validator;
pub mod term_mapper;
pub mod text2sql_pipeline;
