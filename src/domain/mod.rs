pub mod error;
pub mod llm_config;
pub mod ports;
pub mod text2sql_entities;
