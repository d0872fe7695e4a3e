use std::time::{Duration, SystemTime};

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use kgrag_core::config::AppConfig;
use kgrag_core::error::{KgError, Result};

use crate::credentials::{resolve_region, CredentialSource};

const SERVICE: &str = "bedrock";
const CONTENT_TYPE: &str = "application/json";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// SigV4 headers (`authorization`, `x-amz-date`, and `x-amz-security-token`
/// for temporary credentials) for a JSON POST to `url`.
fn signed_headers(
    url: &Url,
    payload: &[u8],
    region: &str,
    credentials: Credentials,
    time: SystemTime,
) -> Result<Vec<(String, String)>> {
    let identity = credentials.into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SERVICE)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| KgError::Internal(format!("invalid signing parameters: {e}")))?
        .into();

    let signable = SignableRequest::new(
        "POST",
        url.as_str(),
        [("content-type", CONTENT_TYPE)].into_iter(),
        SignableBody::Bytes(payload),
    )
    .map_err(|e| KgError::Internal(format!("request cannot be signed: {e}")))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| KgError::Internal(format!("request signing failed: {e}")))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

/// Signed JSON transport to the Bedrock runtime, shared by the text and
/// embedding clients.
#[derive(Debug, Clone)]
pub struct BedrockRuntime {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: CredentialSource,
}

impl BedrockRuntime {
    pub fn new(
        endpoint: Url,
        region: impl Into<String>,
        credentials: CredentialSource,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("kgrag/0.1")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| KgError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            region: region.into(),
            credentials,
        })
    }

    /// Resolve region and credentials, failing here when none can be found.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let region = resolve_region(config).await?;
        let credentials = CredentialSource::from_config(config, &region).await?;
        credentials.credentials().await?;

        let endpoint = match &config.bedrock_endpoint {
            Some(custom) => custom.clone(),
            None => format!("https://bedrock-runtime.{region}.amazonaws.com"),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| KgError::Config(format!("invalid Bedrock endpoint {endpoint}: {e}")))?;

        tracing::debug!(endpoint = %endpoint, region = %region, "Bedrock runtime configured");
        Self::new(endpoint, region, credentials)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn model_url(&self, model_id: &str, action: &str) -> Result<Url> {
        let url = format!(
            "{}/model/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            urlencoding::encode(model_id),
            action
        );
        Url::parse(&url).map_err(|e| KgError::Model {
            model: model_id.to_string(),
            message: format!("invalid request URL {url}: {e}"),
        })
    }

    /// POST `body` to `/model/{model_id}/{action}` and decode the JSON reply.
    pub async fn invoke<Req, Resp>(&self, model_id: &str, action: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.model_url(model_id, action)?;
        let payload = serde_json::to_vec(body)?;
        let credentials = self.credentials.credentials().await?;
        let headers = signed_headers(&url, &payload, &self.region, credentials, SystemTime::now())?;

        tracing::debug!(
            model = %model_id,
            action = action,
            payload_len = payload.len(),
            "Sending request to Bedrock runtime"
        );

        let mut request = self
            .http
            .post(url)
            .header("content-type", CONTENT_TYPE)
            .header("accept", CONTENT_TYPE);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| KgError::Model {
                model: model_id.to_string(),
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(KgError::Model {
                model: model_id.to_string(),
                message: format!("Bedrock returned status {status}: {body}"),
            });
        }

        response.json().await.map_err(|e| KgError::Model {
            model: model_id.to_string(),
            message: format!("failed to parse Bedrock response: {e}"),
        })
    }
}
