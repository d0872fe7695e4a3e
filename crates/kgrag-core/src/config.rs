use serde::{Deserialize, Serialize};

use crate::error::{KgError, Result};

pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
pub const ENV_LLM_MODEL_ID: &str = "BEDROCK_LLM_MODEL_ID";
pub const ENV_EMBEDDING_MODEL_ID: &str = "EMBEDDING_MODEL_ID";
pub const ENV_BEDROCK_ENDPOINT: &str = "BEDROCK_ENDPOINT_URL";
pub const ENV_NEO4J_URI: &str = "NEO4J_URI";
pub const ENV_NEO4J_USERNAME: &str = "NEO4J_USERNAME";
pub const ENV_NEO4J_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_NEO4J_DATABASE: &str = "NEO4J_DATABASE";

/// Process-wide settings read once at startup.
///
/// Nothing here is validated on load: a missing value only becomes an error
/// when a client constructor or connector asks for it through [`require`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub aws_access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub aws_secret_access_key: Option<String>,
    #[serde(skip_serializing)]
    pub aws_session_token: Option<String>,
    pub aws_region: Option<String>,
    /// Read for completeness, no stage uses it.
    pub bucket_name: Option<String>,
    pub llm_model_id: Option<String>,
    pub embedding_model_id: Option<String>,
    pub bedrock_endpoint: Option<String>,
    pub neo4j_uri: Option<String>,
    pub neo4j_username: Option<String>,
    #[serde(skip_serializing)]
    pub neo4j_password: Option<String>,
    /// Read but not passed to the connector, which targets `neo4j` unless told otherwise.
    pub neo4j_database: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            aws_access_key_id: get(ENV_AWS_ACCESS_KEY_ID),
            aws_secret_access_key: get(ENV_AWS_SECRET_ACCESS_KEY),
            aws_session_token: get(ENV_AWS_SESSION_TOKEN),
            aws_region: get(ENV_AWS_REGION).or_else(|| get(ENV_AWS_DEFAULT_REGION)),
            bucket_name: get(ENV_BUCKET_NAME),
            llm_model_id: get(ENV_LLM_MODEL_ID),
            embedding_model_id: get(ENV_EMBEDDING_MODEL_ID),
            bedrock_endpoint: get(ENV_BEDROCK_ENDPOINT),
            neo4j_uri: get(ENV_NEO4J_URI),
            neo4j_username: get(ENV_NEO4J_USERNAME),
            neo4j_password: get(ENV_NEO4J_PASSWORD),
            neo4j_database: get(ENV_NEO4J_DATABASE),
        }
    }
}

/// Unwrap a config value, naming the environment variable when it is missing.
pub fn require<'a>(value: &'a Option<String>, env_name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| KgError::Config(format!("{env_name} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_REGION", "us-west-2"),
            ("BEDROCK_LLM_MODEL_ID", "anthropic.claude-3-haiku-20240307-v1:0"),
            ("EMBEDDING_MODEL_ID", "amazon.titan-embed-text-v1"),
            ("NEO4J_URI", "bolt://localhost:7687"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "pw"),
            ("NEO4J_DATABASE", "papers"),
        ]));

        assert_eq!(config.aws_access_key_id.as_deref(), Some("AKID"));
        assert_eq!(config.aws_region.as_deref(), Some("us-west-2"));
        assert_eq!(
            config.llm_model_id.as_deref(),
            Some("anthropic.claude-3-haiku-20240307-v1:0")
        );
        assert_eq!(config.neo4j_database.as_deref(), Some("papers"));
        assert!(config.aws_session_token.is_none());
        assert!(config.bucket_name.is_none());
    }

    #[test]
    fn test_region_falls_back_to_default_region() {
        let config = AppConfig::from_lookup(lookup_from(&[("AWS_DEFAULT_REGION", "eu-central-1")]));
        assert_eq!(config.aws_region.as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[("NEO4J_URI", "  ")]));
        assert!(config.neo4j_uri.is_none());
    }

    #[test]
    fn test_require_names_missing_variable() {
        let config = AppConfig::default();
        let err = require(&config.llm_model_id, ENV_LLM_MODEL_ID).unwrap_err();
        assert!(err.to_string().contains("BEDROCK_LLM_MODEL_ID"));
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("AWS_SECRET_ACCESS_KEY", "very-secret"),
            ("NEO4J_PASSWORD", "hunter2"),
        ]));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(!json.contains("hunter2"));
    }
}
