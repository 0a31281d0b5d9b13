use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::remote::{ProviderTransport, RemoteCall, RemoteError, RemoteTable};

/// Result code the provider uses for "too many calls".
const RATE_LIMIT_CODE: i64 = 40203;

/// HTTP transport for the provider's JSON RPC endpoint.
#[derive(Clone)]
pub struct TushareTransport {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<RemoteTable>,
}

impl TushareTransport {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self {
            http: Arc::new(ReqwestHttpClient::default()),
            endpoint: policy.endpoint.clone(),
            timeout: policy.request_timeout,
        }
    }

    fn encode(&self, token: &str, call: &RemoteCall) -> Result<HttpRequest, RemoteError> {
        let body = json!({
            "api_name": call.operation.api_name(),
            "token": token,
            "params": call.params,
            "fields": call.fields.join(","),
        });
        let body = serde_json::to_string(&body)
            .map_err(|error| RemoteError::decode(format!("request encoding failed: {error}")))?;

        Ok(HttpRequest::post_json(self.endpoint.as_str(), body).with_timeout(self.timeout))
    }
}

impl ProviderTransport for TushareTransport {
    fn fetch<'a>(
        &'a self,
        token: &'a str,
        call: &'a RemoteCall,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteTable, RemoteError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.encode(token, call)?;
            let response = self
                .http
                .execute(request)
                .await
                .map_err(|error| RemoteError::transport(error.message()))?;

            if response.status == 429 {
                return Err(RemoteError::rate_limited(format!(
                    "{} returned HTTP 429",
                    call.operation
                )));
            }
            if !response.is_success() {
                return Err(RemoteError::transport(format!(
                    "{} returned HTTP {}",
                    call.operation, response.status
                )));
            }

            decode_envelope(&response.body)
        })
    }
}

fn decode_envelope(body: &str) -> Result<RemoteTable, RemoteError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|error| RemoteError::decode(format!("invalid response envelope: {error}")))?;

    match envelope.code {
        0 => Ok(envelope.data.unwrap_or_default()),
        RATE_LIMIT_CODE => Err(RemoteError::rate_limited(
            envelope.msg.unwrap_or_else(|| String::from("rate limit exceeded")),
        )),
        code => Err(RemoteError::provider(code, envelope.msg.unwrap_or_default())),
    }
}
