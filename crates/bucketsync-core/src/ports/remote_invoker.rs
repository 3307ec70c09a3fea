//! Remote invocation port

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, StoreError};

/// How a remote invocation is awaited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    /// Wait for the remote result and check it
    #[default]
    RequestResponse,
    /// Fire and forget; acceptance counts as success
    Event,
}

impl InvocationMode {
    /// Returns the mode's wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestResponse => "RequestResponse",
            Self::Event => "Event",
        }
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request-response" | "requestresponse" => Ok(Self::RequestResponse),
            "event" => Ok(Self::Event),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown invocation mode '{other}'"
            ))),
        }
    }
}

/// Port trait for handing one identifier to another process
#[async_trait::async_trait]
pub trait IRemoteInvoker: Send + Sync {
    /// Invokes the remote handler for `id`
    ///
    /// In [`InvocationMode::Event`] mode an accepted request is a success.
    async fn invoke(&self, id: i64, mode: InvocationMode) -> Result<(), StoreError>;
}
