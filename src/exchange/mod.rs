//! Token exchange hops
//!
//! Each hop trades one token for another or for temporary credentials at a
//! foreign trust boundary. Hops are polymorphic over [`ExchangeValue`] so a
//! chain is just an ordered list of [`ExchangeStep`] trait objects, each
//! consuming the previous step's output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FederationError;
use crate::token::Assertion;

pub mod entra;
pub mod identity_pool;
pub mod sts;

pub use entra::ClientAssertionHandle;

/// Temporary AWS credentials returned by STS.
#[derive(Debug, Clone)]
pub struct TempAwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl TempAwsCredentials {
    /// Whether the credentials are past their server-reported expiry.
    /// Unknown expiry counts as live; STS reports it on every issue.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration, Some(expiration) if expiration <= now)
    }
}

/// Value flowing between exchange steps.
///
/// A step consumes one kind and produces another; the chain aborts if a
/// step is handed a kind it does not understand.
#[derive(Debug, Clone)]
pub enum ExchangeValue {
    Assertion(Assertion),
    AwsCredentials(TempAwsCredentials),
    EntraHandle(ClientAssertionHandle),
}

impl ExchangeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeValue::Assertion(_) => "assertion",
            ExchangeValue::AwsCredentials(_) => "aws-credentials",
            ExchangeValue::EntraHandle(_) => "entra-handle",
        }
    }

    /// Unwrap an assertion input, failing with a wiring error otherwise.
    pub fn into_assertion(self, step: &'static str) -> Result<Assertion, FederationError> {
        match self {
            ExchangeValue::Assertion(assertion) => Ok(assertion),
            other => Err(FederationError::WrongInput {
                step,
                got: other.kind(),
            }),
        }
    }
}

/// A single token-for-token or token-for-credential hop.
///
/// Required configuration is read from the environment inside `exchange`,
/// never cached, so each cycle sees the current process environment.
#[async_trait]
pub trait ExchangeStep: Send + Sync {
    /// Step name for progress logs and wiring errors.
    fn name(&self) -> &'static str;

    async fn exchange(&self, input: ExchangeValue) -> Result<ExchangeValue, FederationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_assertion_accepts_assertion() {
        let value = ExchangeValue::Assertion(Assertion::new("a.b.c").unwrap());
        assert!(value.into_assertion("test-step").is_ok());
    }

    #[test]
    fn test_credentials_expiry() {
        let now = Utc::now();
        let mut creds = TempAwsCredentials {
            access_key_id: "ASIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "session".to_string(),
            expiration: Some(now + chrono::Duration::hours(1)),
        };
        assert!(!creds.is_expired(now));
        assert!(creds.is_expired(now + chrono::Duration::hours(2)));

        creds.expiration = None;
        assert!(!creds.is_expired(now));
    }

    #[test]
    fn test_into_assertion_rejects_credentials() {
        let value = ExchangeValue::AwsCredentials(TempAwsCredentials {
            access_key_id: "AKIA".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "session".to_string(),
            expiration: None,
        });
        let err = value.into_assertion("test-step").unwrap_err();
        assert!(matches!(
            err,
            FederationError::WrongInput {
                step: "test-step",
                got: "aws-credentials"
            }
        ));
    }
}
