use std::sync::Arc;

use kgrag_bedrock::{BedrockConverse, BedrockEmbedding, BedrockRuntime};
use kgrag_core::config::{require, AppConfig, ENV_EMBEDDING_MODEL_ID, ENV_LLM_MODEL_ID};
use kgrag_core::error::Result;
use kgrag_core::llm::{EmbeddingModel, LanguageModel};

/// Build the Bedrock text-generation and embedding clients from configuration.
/// Both share one runtime, so credentials are resolved once.
pub async fn bedrock_models(
    config: &AppConfig,
) -> Result<(Arc<dyn LanguageModel>, Arc<dyn EmbeddingModel>)> {
    let llm_model_id = require(&config.llm_model_id, ENV_LLM_MODEL_ID)?;
    let embedding_model_id = require(&config.embedding_model_id, ENV_EMBEDDING_MODEL_ID)?;

    let runtime = BedrockRuntime::from_config(config).await?;
    let llm = BedrockConverse::new(runtime.clone(), llm_model_id);
    let embed_model = BedrockEmbedding::new(runtime.clone(), embedding_model_id);

    tracing::info!(
        llm = %llm.model_id(),
        embedding = %embed_model.model_id(),
        region = %runtime.region(),
        "Bedrock clients ready"
    );

    Ok((Arc::new(llm), Arc::new(embed_model)))
}
