//! Where request-signing credentials and the region come from.
//!
//! Explicit keys in [`AppConfig`] win. Without them the AWS default chains are
//! consulted (environment, shared profile, SSO, web identity, ECS and instance
//! roles), so a run on an instance role or a named profile needs no keys.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::default_provider::region::DefaultRegionChain;
use aws_config::Region;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use tokio::sync::Mutex;

use kgrag_core::config::{
    AppConfig, ENV_AWS_ACCESS_KEY_ID, ENV_AWS_REGION, ENV_AWS_SECRET_ACCESS_KEY,
};
use kgrag_core::error::{KgError, Result};

const PROVIDER_NAME: &str = "kgrag-config";

/// Cached credentials are refreshed this long before they expire.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Keys given explicitly in the config, if any. Half a key pair is an error.
pub(crate) fn static_credentials(config: &AppConfig) -> Result<Option<Credentials>> {
    match (&config.aws_access_key_id, &config.aws_secret_access_key) {
        (Some(key), Some(secret)) => Ok(Some(Credentials::new(
            key,
            secret,
            config.aws_session_token.clone(),
            None,
            PROVIDER_NAME,
        ))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(KgError::Config(format!(
            "{ENV_AWS_ACCESS_KEY_ID} is set but {ENV_AWS_SECRET_ACCESS_KEY} is not"
        ))),
        (None, Some(_)) => Err(KgError::Config(format!(
            "{ENV_AWS_SECRET_ACCESS_KEY} is set but {ENV_AWS_ACCESS_KEY_ID} is not"
        ))),
    }
}

pub(crate) async fn resolve_region(config: &AppConfig) -> Result<String> {
    if let Some(region) = &config.aws_region {
        return Ok(region.clone());
    }
    DefaultRegionChain::builder()
        .build()
        .region()
        .await
        .map(|r| r.to_string())
        .ok_or_else(|| {
            KgError::Config(format!(
                "no AWS region configured; set {ENV_AWS_REGION} or a profile region"
            ))
        })
}

/// A credentials provider plus the last credentials it handed out.
#[derive(Clone)]
pub struct CredentialSource {
    provider: SharedCredentialsProvider,
    cached: Arc<Mutex<Option<Credentials>>>,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource").finish_non_exhaustive()
    }
}

impl CredentialSource {
    pub fn fixed(credentials: Credentials) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(credentials),
            cached: Arc::default(),
        }
    }

    pub async fn from_config(config: &AppConfig, region: &str) -> Result<Self> {
        if let Some(credentials) = static_credentials(config)? {
            return Ok(Self::fixed(credentials));
        }

        tracing::debug!(region = %region, "Using the AWS default credential chain");
        let chain = DefaultCredentialsChain::builder()
            .region(Region::new(region.to_string()))
            .build()
            .await;

        Ok(Self {
            provider: SharedCredentialsProvider::new(chain),
            cached: Arc::default(),
        })
    }

    /// Current credentials, re-resolved shortly before the cached ones expire.
    pub async fn credentials(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;
        if let Some(credentials) = cached.as_ref() {
            let fresh = credentials
                .expiry()
                .map(|expiry| expiry > SystemTime::now() + EXPIRY_BUFFER)
                .unwrap_or(true);
            if fresh {
                return Ok(credentials.clone());
            }
        }

        let credentials = self.provider.provide_credentials().await.map_err(|e| {
            KgError::Config(format!("failed to load AWS credentials: {}", error_chain(&e)))
        })?;
        *cached = Some(credentials.clone());
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn test_static_credentials_from_config() {
        let credentials = static_credentials(&config(&[
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "token"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(credentials.access_key_id(), "AKID");
        assert_eq!(credentials.secret_access_key(), "secret");
        assert_eq!(credentials.session_token(), Some("token"));
    }

    #[test]
    fn test_no_keys_defers_to_default_chain() {
        assert!(static_credentials(&AppConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_half_a_key_pair_is_rejected() {
        let err = static_credentials(&config(&[("AWS_ACCESS_KEY_ID", "AKID")])).unwrap_err();
        assert!(err.to_string().contains("AWS_SECRET_ACCESS_KEY"));

        let err = static_credentials(&config(&[("AWS_SECRET_ACCESS_KEY", "s")])).unwrap_err();
        assert!(err.to_string().contains("AWS_ACCESS_KEY_ID is not"));
    }

    #[tokio::test]
    async fn test_explicit_region_skips_region_chain() {
        let region = resolve_region(&config(&[("AWS_REGION", "eu-west-1")]))
            .await
            .unwrap();
        assert_eq!(region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_fixed_source_returns_its_credentials() {
        let source = CredentialSource::fixed(Credentials::new("AKID", "secret", None, None, "test"));
        assert_eq!(source.credentials().await.unwrap().access_key_id(), "AKID");
        // Second call is served from the cache.
        assert_eq!(source.credentials().await.unwrap().access_key_id(), "AKID");
    }
}
