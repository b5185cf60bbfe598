use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::use_cases::embedding_service::{EmbeddingProvider, EmbeddingService};
use crate::application::use_cases::example_manager::ExampleManager;
use crate::application::use_cases::lexicon_manager::LexiconManager;
use crate::application::use_cases::query_executor::PgQueryExecutor;
use crate::application::use_cases::text2sql_pipeline::{PipelineComponents, Text2SqlPipeline};
use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::connection::{connect_pool, init_db};
use crate::infrastructure::db::repository::PgText2SqlRepository;
use crate::infrastructure::db::seed::seed_postgres;
use crate::infrastructure::llm_clients::RouterClient;

/// Everything a caller needs once the database and providers are wired up.
pub struct Text2SqlApp {
    pub config: AppConfig,
    pub repository: Arc<PgText2SqlRepository>,
    pub examples: ExampleManager,
    pub lexicon: LexiconManager,
    pub pipeline: Text2SqlPipeline,
}

/// `RUST_LOG` wins over the configured filter when set.
pub fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

pub async fn setup(config: AppConfig) -> Result<Text2SqlApp> {
    let pool = connect_pool(&config.database).await.map_err(|err| {
        error!(error = %err, host = %config.database.host, "Failed to connect to database");
        err
    })?;
    init_db(&pool).await?;

    let repository = Arc::new(PgText2SqlRepository::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(EmbeddingService::new(config.embedding.clone())?);
    let examples = ExampleManager::new(repository.clone()).with_embedder(embedder.clone());

    if config.pipeline.seed_defaults {
        if let Err(err) = seed_postgres(&repository, &examples).await {
            warn!(error = %err, "Seeding defaults failed; continuing with existing data");
        }
    }

    let lexicon = LexiconManager::new(repository.clone());

    let components = PipelineComponents {
        metadata: repository.clone(),
        examples: repository.clone(),
        history: repository.clone(),
        embedder,
        generator: Arc::new(RouterClient::new()?),
        executor: Arc::new(PgQueryExecutor::new(pool)),
    };
    let pipeline = Text2SqlPipeline::new(components, config.llm.clone(), config.pipeline.settings());

    info!(
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "Text2SQL pipeline initialized"
    );

    Ok(Text2SqlApp {
        config,
        repository,
        examples,
        lexicon,
        pipeline,
    })
}
