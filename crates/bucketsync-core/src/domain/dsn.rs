//! Object store connection strings
//!
//! A DSN is a space separated list of `name=value` pairs:
//!
//! ```text
//! bucket=data.example.org prefix=records region=us-east-1 credentials=env:S3_TOKEN
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Region used when the DSN does not name one
pub const DEFAULT_REGION: &str = "us-east-1";

/// How requests to the store are authorised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Unsigned requests
    #[default]
    Anonymous,
    /// A static bearer token
    Bearer(String),
    /// A bearer token read from the named environment variable
    Env(String),
}

impl Credentials {
    fn parse(value: &str) -> Result<Self, DomainError> {
        let (scheme, rest) = value.split_once(':').unwrap_or((value, ""));
        match scheme {
            "" | "anon" => Ok(Self::Anonymous),
            "bearer" if !rest.is_empty() => Ok(Self::Bearer(rest.to_string())),
            "env" if !rest.is_empty() => Ok(Self::Env(rest.to_string())),
            _ => Err(DomainError::UnsupportedCredentials(scheme.to_string())),
        }
    }

    /// Resolves the bearer token, if any
    ///
    /// # Errors
    /// Returns [`DomainError::UnsupportedCredentials`] if an `env:` variable is unset.
    pub fn token(&self) -> Result<Option<String>, DomainError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Bearer(token) => Ok(Some(token.clone())),
            Self::Env(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| DomainError::UnsupportedCredentials(format!("env:{var} is not set"))),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anon:"),
            // Never print the token itself
            Self::Bearer(_) => write!(f, "bearer:***"),
            Self::Env(var) => write!(f, "env:{var}"),
        }
    }
}

/// Parsed connection parameters for one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    /// Bucket name
    pub bucket: String,
    /// Key prefix applied to every key on this connection
    pub prefix: String,
    /// Bucket region
    pub region: String,
    /// Explicit endpoint, overriding the regional default
    pub endpoint: Option<String>,
    /// Request authorisation
    pub credentials: Credentials,
}

impl Dsn {
    /// Parses a DSN string
    ///
    /// # Errors
    /// Returns [`DomainError::MissingBucket`] when no bucket is named,
    /// [`DomainError::InvalidDsn`] for malformed pairs or unknown names and
    /// [`DomainError::UnsupportedCredentials`] for unknown credential schemes.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let mut bucket = None;
        let mut prefix = String::new();
        let mut region = None;
        let mut endpoint = None;
        let mut credentials = Credentials::Anonymous;

        for pair in input.split_whitespace() {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| DomainError::InvalidDsn(format!("expected name=value, got '{pair}'")))?;

            match name {
                "bucket" => bucket = Some(value.to_string()),
                "prefix" => prefix = value.trim_matches('/').to_string(),
                "region" => region = Some(value.to_string()),
                "endpoint" => endpoint = Some(value.trim_end_matches('/').to_string()),
                "credentials" => credentials = Credentials::parse(value)?,
                other => return Err(DomainError::InvalidDsn(format!("unknown parameter '{other}'"))),
            }
        }

        let bucket = bucket
            .filter(|b| !b.is_empty())
            .ok_or(DomainError::MissingBucket)?;

        Ok(Self {
            bucket,
            prefix,
            region: region
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint,
            credentials,
        })
    }

    /// Returns the base URL requests are sent to
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

impl FromStr for Dsn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket={} region={}", self.bucket, self.region)?;
        if !self.prefix.is_empty() {
            write!(f, " prefix={}", self.prefix)?;
        }
        if let Some(endpoint) = &self.endpoint {
            write!(f, " endpoint={endpoint}")?;
        }
        write!(f, " credentials={}", self.credentials)
    }
}
