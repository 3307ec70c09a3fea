//! S3-compatible object store client
//!
//! Talks to any store that speaks the S3 REST dialect using path-style URLs
//! (`{endpoint}/{bucket}/{key}`). Requests are either unsigned or carry a
//! bearer token from the DSN; request signing belongs to whatever proxy or
//! gateway sits in front of the bucket.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bucketsync_core::domain::Dsn;
//! use bucketsync_core::ports::IObjectStore;
//! use bucketsync_store::HttpObjectStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dsn = Dsn::parse("bucket=data.example.org prefix=records")?;
//! let store = HttpObjectStore::new(&dsn)?;
//! let meta = store.head("101/736/545/101736545.geojson").await?;
//! println!("{meta:?}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use bucketsync_core::domain::{
    join_key, DomainError, Dsn, ListPage, PutOptions, RemoteObjectMetadata, StoreError,
};
use bucketsync_core::ports::IObjectStore;

use crate::listing::parse_list_response;

/// Content type sent when neither the extension nor the caller names one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Header carrying the canned ACL on PUT
const ACL_HEADER: &str = "x-amz-acl";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// HttpObjectStore
// ============================================================================

/// HTTP client for one bucket and connection prefix
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    /// The underlying HTTP client
    client: Client,
    /// Store endpoint, without the bucket
    endpoint: Url,
    /// Bucket name, the first path segment of every request
    bucket: String,
    /// Connection prefix joined in front of every key
    prefix: String,
    /// Bearer token, if the DSN names one
    token: Option<String>,
}

impl HttpObjectStore {
    /// Creates a client from a parsed DSN
    ///
    /// # Errors
    /// Fails if the endpoint is not a valid base URL, if `env:` credentials
    /// name an unset variable, or if the HTTP client cannot be built.
    pub fn new(dsn: &Dsn) -> Result<Self, StoreError> {
        Self::with_timeout(dsn, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom per-request timeout
    pub fn with_timeout(dsn: &Dsn, timeout: Duration) -> Result<Self, StoreError> {
        let endpoint = Url::parse(&dsn.endpoint())
            .map_err(|e| DomainError::InvalidDsn(format!("endpoint '{}': {e}", dsn.endpoint())))?;
        if endpoint.cannot_be_a_base() {
            return Err(DomainError::InvalidDsn(format!("endpoint '{endpoint}' cannot be a base URL")).into());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            bucket: dsn.bucket.clone(),
            prefix: dsn.prefix.clone(),
            token: dsn.credentials.token()?,
        })
    }

    /// Returns the connection prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Builds `{endpoint}/{bucket}[/{segments}...]`, percent-encoding each segment
    fn url_for(&self, key: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| DomainError::InvalidDsn(format!("endpoint '{}'", self.endpoint)))?;
            segments.pop_if_empty().push(&self.bucket);
            if let Some(key) = key {
                for part in key.split('/') {
                    segments.push(part);
                }
            }
        }
        Ok(url)
    }

    /// URL of a key relative to the connection prefix
    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        let full = join_key(&self.prefix, key);
        if full.is_empty() {
            return Err(DomainError::InvalidPath("empty object key".to_string()).into());
        }
        self.url_for(Some(&full))
    }

    /// Full listing prefix for a prefix relative to the connection prefix
    fn list_prefix(&self, prefix: &str) -> String {
        if self.prefix.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", self.prefix, prefix.trim_start_matches('/'))
        }
    }

    /// Creates a request with the Authorization header applied
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        builder.send().await.map_err(transport_error)
    }
}

/// Maps a reqwest transport failure to the store taxonomy
fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(err.to_string())
    } else {
        StoreError::Network(err.to_string())
    }
}

/// Turns a non-success response into a [`StoreError`], consuming the body
async fn status_error(response: Response, key: &str) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        format!(
            "{key}: {}",
            status.canonical_reason().unwrap_or("unexpected status")
        )
    } else {
        format!("{key}: {}", body.trim())
    };
    StoreError::from_status(status.as_u16(), message)
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extracts object metadata from HEAD response headers
fn metadata_from_headers(key: &str, headers: &HeaderMap) -> Result<RemoteObjectMetadata, StoreError> {
    let etag = header_str(headers, ETAG)
        .ok_or_else(|| StoreError::InvalidResponse(format!("{key}: missing ETag")))?
        .to_string();

    let size = header_str(headers, CONTENT_LENGTH)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let raw_modified = header_str(headers, LAST_MODIFIED)
        .ok_or_else(|| StoreError::InvalidResponse(format!("{key}: missing Last-Modified")))?;
    let last_modified = DateTime::parse_from_rfc2822(raw_modified)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::InvalidResponse(format!("{key}: bad Last-Modified '{raw_modified}': {e}"))
        })?;

    Ok(RemoteObjectMetadata {
        key: key.to_string(),
        size,
        last_modified,
        etag,
    })
}

#[async_trait::async_trait]
impl IObjectStore for HttpObjectStore {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn head(&self, key: &str) -> Result<Option<RemoteObjectMetadata>, StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(self.request(Method::HEAD, url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(key, "HEAD: not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, key).await);
        }

        metadata_from_headers(key, response.headers()).map(Some)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(self.request(Method::GET, url)).await?;

        if !response.status().is_success() {
            return Err(status_error(response, key).await);
        }

        let body = response.bytes().await.map_err(transport_error)?;
        debug!(key, bytes = body.len(), "GET complete");
        Ok(body)
    }

    #[tracing::instrument(skip(self, body), fields(bytes = body.len()), level = "debug")]
    async fn put(&self, key: &str, body: Bytes, options: &PutOptions) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let content_type = options.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);

        let mut builder = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(acl) = &options.acl {
            builder = builder.header(ACL_HEADER, acl.as_str());
        }

        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(status_error(response, key).await);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(self.request(Method::DELETE, url)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(key, "DELETE: already absent");
                Ok(())
            }
            _ => Err(status_error(response, key).await),
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        let mut url = self.url_for(None)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("list-type", "2")
                .append_pair("prefix", &self.list_prefix(prefix))
                .append_pair("max-keys", &max_keys.to_string());
            if let Some(token) = continuation {
                query.append_pair("continuation-token", token);
            }
        }

        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(status_error(response, prefix).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        let page = parse_list_response(&body, &self.prefix)?;

        if page.entries.len() > max_keys {
            warn!(
                prefix,
                returned = page.entries.len(),
                max_keys,
                "Store returned more keys than requested"
            );
        }
        Ok(page)
    }
}
