use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kgrag_core::error::{KgError, Result};
use kgrag_core::llm::EmbeddingModel;

use crate::runtime::BedrockRuntime;

/// Request/response dialect of an embedding model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Titan,
    Cohere,
}

impl EmbeddingProvider {
    pub fn for_model(model_id: &str) -> Self {
        // Cross-region inference profiles prefix the id with a geography, e.g. `us.cohere...`.
        if model_id.split('.').take(2).any(|part| part == "cohere") {
            EmbeddingProvider::Cohere
        } else {
            EmbeddingProvider::Titan
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TitanResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    texts: [&'a str; 1],
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct BedrockEmbedding {
    runtime: BedrockRuntime,
    model_id: String,
    provider: EmbeddingProvider,
}

impl BedrockEmbedding {
    pub fn new(runtime: BedrockRuntime, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            provider: EmbeddingProvider::for_model(&model_id),
            runtime,
            model_id,
        }
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    async fn invoke(&self, text: &str, cohere_input_type: &'static str) -> Result<Vec<f32>> {
        let embedding = match self.provider {
            EmbeddingProvider::Titan => {
                let response: TitanResponse = self
                    .runtime
                    .invoke(&self.model_id, "invoke", &TitanRequest { input_text: text })
                    .await?;
                response.embedding
            }
            EmbeddingProvider::Cohere => {
                let request = CohereRequest {
                    texts: [text],
                    input_type: cohere_input_type,
                };
                let response: CohereResponse =
                    self.runtime.invoke(&self.model_id, "invoke", &request).await?;
                response.embeddings.into_iter().next().unwrap_or_default()
            }
        };

        if embedding.is_empty() {
            return Err(KgError::Model {
                model: self.model_id.clone(),
                message: "embedding response contained no vector".to_string(),
            });
        }

        tracing::debug!(
            model = %self.model_id,
            dimensions = embedding.len(),
            text_len = text.len(),
            "Computed embedding"
        );

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingModel for BedrockEmbedding {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.invoke(text, "search_document").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.invoke(text, "search_query").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSource;
    use aws_credential_types::Credentials;
    use httpmock::prelude::*;
    use serde_json::json;
    use url::Url;

    fn client(server: &MockServer, model_id: &str) -> BedrockEmbedding {
        let runtime = BedrockRuntime::new(
            Url::parse(&server.base_url()).unwrap(),
            "us-east-1",
            CredentialSource::fixed(Credentials::new("AKID", "secret", None, None, "test")),
        )
        .unwrap();
        BedrockEmbedding::new(runtime, model_id)
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(
            EmbeddingProvider::for_model("amazon.titan-embed-text-v1"),
            EmbeddingProvider::Titan
        );
        assert_eq!(
            EmbeddingProvider::for_model("cohere.embed-english-v3"),
            EmbeddingProvider::Cohere
        );
        assert_eq!(
            EmbeddingProvider::for_model("us.cohere.embed-multilingual-v3"),
            EmbeddingProvider::Cohere
        );
    }

    #[tokio::test]
    async fn test_titan_embedding_is_parsed() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/model/amazon.titan-embed-text-v1/invoke")
                .header_exists("authorization")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("\"inputText\":\"some chunk\"")
                });
            then.status(200).json_body(json!({
                "embedding": [0.1, 0.2, 0.3],
                "inputTextTokenCount": 2
            }));
        });

        let embedding = client(&server, "amazon.titan-embed-text-v1")
            .embed("some chunk")
            .await
            .unwrap();

        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_cohere_query_embedding_uses_search_query() {
        let server = MockServer::start_async().await;

        let embed_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/model/cohere.embed-english-v3/invoke")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("search_query")
                });
            then.status(200).json_body(json!({
                "embeddings": [[1.0, 0.0]],
                "id": "abc",
                "response_type": "embeddings_floats"
            }));
        });

        let embedding = client(&server, "cohere.embed-english-v3")
            .embed_query("who wrote it?")
            .await
            .unwrap();

        assert_eq!(embedding, vec![1.0, 0.0]);
        embed_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_empty_vector_is_an_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/model/amazon.titan-embed-text-v1/invoke");
            then.status(200).json_body(json!({ "embedding": [] }));
        });

        let result = client(&server, "amazon.titan-embed-text-v1")
            .embed("x")
            .await;
        assert!(result.is_err());
    }
}
