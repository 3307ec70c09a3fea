//! HTTP remote invoker
//!
//! POSTs `{"dsn": .., "dryrun": .., "id": ..}` to a function endpoint. The
//! invocation type travels in the `X-Invocation-Type` header. A handler that
//! ran but failed answers 2xx with an `X-Function-Error` header, so both the
//! status and that header are checked in request/response mode.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use bucketsync_core::domain::{DomainError, StoreError};
use bucketsync_core::ports::{IRemoteInvoker, InvocationMode};

/// Header naming the invocation type
pub const INVOCATION_TYPE_HEADER: &str = "X-Invocation-Type";

/// Header set by the handler when the invocation itself failed
pub const FUNCTION_ERROR_HEADER: &str = "X-Function-Error";

/// Request body sent for every invocation
#[derive(Debug, Clone, Serialize)]
pub struct InvokePayload<'a> {
    pub dsn: &'a str,
    pub dryrun: bool,
    pub id: i64,
}

/// [`IRemoteInvoker`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: Client,
    endpoint: String,
    dsn: String,
    dry_run: bool,
    token: Option<String>,
}

impl HttpInvoker {
    /// Creates an invoker for `endpoint` that forwards `dsn` to the handler
    ///
    /// # Errors
    /// Returns [`StoreError::Domain`] if `endpoint` is not an http(s) URL.
    pub fn new(endpoint: &str, dsn: impl Into<String>, dry_run: bool) -> Result<Self, StoreError> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| DomainError::ValidationFailed(format!("invoke endpoint '{endpoint}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::ValidationFailed(format!(
                "invoke endpoint '{endpoint}' is not http(s)"
            ))
            .into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(900))
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            dsn: dsn.into(),
            dry_run,
            token: None,
        })
    }

    /// Sends `token` as a bearer credential with every invocation
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait::async_trait]
impl IRemoteInvoker for HttpInvoker {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn invoke(&self, id: i64, mode: InvocationMode) -> Result<(), StoreError> {
        let payload = InvokePayload {
            dsn: &self.dsn,
            dryrun: self.dry_run,
            id,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(INVOCATION_TYPE_HEADER, mode.as_str())
            .json(&payload);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(e.to_string())
            } else {
                StoreError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), format!("invoke {id}: {body}")));
        }

        match mode {
            InvocationMode::Event => {
                debug!(id, status = status.as_u16(), "Invocation accepted");
                Ok(())
            }
            InvocationMode::RequestResponse => {
                let function_error = response
                    .headers()
                    .get(FUNCTION_ERROR_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                if let Some(kind) = function_error {
                    let body = response.text().await.unwrap_or_default();
                    return Err(StoreError::InvocationFailed(format!("{id}: {kind}: {body}")));
                }
                if status == StatusCode::ACCEPTED {
                    debug!(id, "Handler answered 202 to a request/response invocation");
                }
                Ok(())
            }
        }
    }
}
