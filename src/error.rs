//! Failure taxonomy for the exchange chain
//!
//! Every step converts its failures into one of these variants; nothing
//! propagates past the run loop.

use thiserror::Error;

/// Errors produced while driving a federation cycle.
#[derive(Debug, Error)]
pub enum FederationError {
    /// A required environment value is absent. Raised before any remote
    /// call is attempted.
    #[error("required configuration {0} is not set")]
    MissingConfig(&'static str),

    /// The local token could not be obtained (file missing, unreadable,
    /// empty, or the provider client failed).
    #[error("token source unavailable: {0}")]
    TokenSource(String),

    /// The assertion is not a well-formed three-segment token or its body
    /// did not decode. Advisory when raised by the inspector.
    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),

    /// A multi-hop exchange was handed an assertion bound to a different
    /// federation issuer key than the hop is configured for.
    #[error("trust binding mismatch: hop configured for issuer key {expected} was handed {actual}")]
    TrustBindingMismatch { expected: String, actual: String },

    /// The foreign endpoint rejected the assertion or credential.
    #[error("{endpoint} rejected the exchange: {detail}")]
    RemoteAuth {
        endpoint: &'static str,
        detail: String,
    },

    /// The foreign endpoint could not be reached.
    #[error("transport failure reaching {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A step was wired to consume an input kind it does not understand.
    #[error("{step} cannot consume {got} input")]
    WrongInput {
        step: &'static str,
        got: &'static str,
    },
}

impl FederationError {
    /// Whether the failure happened before any remote call was made.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            FederationError::MissingConfig(_)
                | FederationError::TokenSource(_)
                | FederationError::MalformedAssertion(_)
                | FederationError::TrustBindingMismatch { .. }
                | FederationError::WrongInput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_names_the_value() {
        let err = FederationError::MissingConfig("AWS_ROLE_ARN");
        assert!(err.to_string().contains("AWS_ROLE_ARN"));
        assert!(err.is_local());
    }

    #[test]
    fn test_token_source_cause() {
        let err = FederationError::TokenSource("no such file".to_string());
        assert!(err.to_string().starts_with("token source unavailable"));
    }

    #[test]
    fn test_trust_binding_mismatch_reports_both_keys() {
        let err = FederationError::TrustBindingMismatch {
            expected: "oidc.eks.us-west-2.amazonaws.com/id/AAAA".to_string(),
            actual: "oidc.eks.us-west-2.amazonaws.com/id/BBBB".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AAAA"));
        assert!(msg.contains("BBBB"));
        assert!(err.is_local());
    }
}
