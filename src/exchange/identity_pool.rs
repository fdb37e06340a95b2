//! Cognito identity-pool exchange
//!
//! Two-hop federation: `GetId` resolves the workload assertion to an
//! identity-pool identifier, `GetOpenIdToken` then issues a fresh assertion
//! for that identity. Both hops must present the same assertion under the
//! same federation issuer key; a mismatched key is a configuration fault and
//! fails before the remote call.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::info;

use super::{ExchangeStep, ExchangeValue};
use crate::error::FederationError;
use crate::token::Assertion;

const COGNITO_ENDPOINT: &str = "Cognito Identity";

/// An assertion pinned to the federation issuer key it was obtained under.
#[derive(Debug, Clone)]
pub struct TrustBinding {
    issuer_key: String,
    assertion: Assertion,
}

impl TrustBinding {
    /// Bind an assertion to its issuer. The scheme prefix is stripped: the
    /// identity pool's login map is keyed by bare issuer host/path.
    pub fn new(issuer_url: &str, assertion: Assertion) -> Self {
        let issuer_key = issuer_url
            .strip_prefix("https://")
            .unwrap_or(issuer_url)
            .to_string();
        Self {
            issuer_key,
            assertion,
        }
    }

    pub fn issuer_key(&self) -> &str {
        &self.issuer_key
    }

    /// Check this binding against the key a hop is configured for.
    pub fn ensure_matches(&self, expected_key: &str) -> Result<(), FederationError> {
        if self.issuer_key != expected_key {
            return Err(FederationError::TrustBindingMismatch {
                expected: expected_key.to_string(),
                actual: self.issuer_key.clone(),
            });
        }
        Ok(())
    }

    fn logins(&self) -> HashMap<&str, &str> {
        HashMap::from([(self.issuer_key.as_str(), self.assertion.as_str())])
    }
}

/// Identity-pool configuration, resolved from the environment at call time.
#[derive(Debug, Clone)]
pub struct IdentityPoolConfig {
    pub identity_pool_id: String,
    pub issuer_key: String,
    pub issuer_url: String,
    pub region: String,
}

impl IdentityPoolConfig {
    pub fn from_env() -> Result<Self, FederationError> {
        let identity_pool_id = env::var("COGNITO_IDENTITY_POOL_ID")
            .map_err(|_| FederationError::MissingConfig("COGNITO_IDENTITY_POOL_ID"))?;
        let issuer_url = env::var("EKS_OIDC_ISSUER_URL")
            .map_err(|_| FederationError::MissingConfig("EKS_OIDC_ISSUER_URL"))?;
        let region =
            env::var("AWS_REGION").unwrap_or_else(|_| super::sts::DEFAULT_AWS_REGION.to_string());
        let issuer_key = issuer_url
            .strip_prefix("https://")
            .unwrap_or(&issuer_url)
            .to_string();
        Ok(Self {
            identity_pool_id,
            issuer_key,
            issuer_url,
            region,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://cognito-identity.{}.amazonaws.com/", self.region)
    }
}

#[derive(Debug, Deserialize)]
struct GetIdResponse {
    #[serde(rename = "IdentityId")]
    identity_id: String,
}

#[derive(Debug, Deserialize)]
struct GetOpenIdTokenResponse {
    #[serde(rename = "Token")]
    token: String,
}

/// Identity-pool hop: assertion in, identity-pool-scoped assertion out.
pub struct IdentityPoolExchange {
    http_client: reqwest::Client,
}

impl IdentityPoolExchange {
    pub fn new() -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http_client })
    }

    async fn call(
        &self,
        config: &IdentityPoolConfig,
        target: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, FederationError> {
        let response = self
            .http_client
            .post(config.endpoint())
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", target)
            .body(body.to_string())
            .send()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: COGNITO_ENDPOINT,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::RemoteAuth {
                endpoint: COGNITO_ENDPOINT,
                detail: format!("{} {}: {}", target, status, body),
            });
        }

        response
            .json()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: COGNITO_ENDPOINT,
                source,
            })
    }

    /// Hop one: resolve the identity-pool identifier for this workload.
    pub async fn resolve_identity(
        &self,
        config: &IdentityPoolConfig,
        binding: &TrustBinding,
    ) -> Result<String, FederationError> {
        binding.ensure_matches(&config.issuer_key)?;

        let body = serde_json::json!({
            "IdentityPoolId": config.identity_pool_id,
            "Logins": binding.logins(),
        });
        let raw = self
            .call(config, "AWSCognitoIdentityService.GetId", body)
            .await?;
        let parsed: GetIdResponse =
            serde_json::from_value(raw).map_err(|e| FederationError::RemoteAuth {
                endpoint: COGNITO_ENDPOINT,
                detail: format!("GetId returned no identity id: {}", e),
            })?;
        Ok(parsed.identity_id)
    }

    /// Hop two: issue a fresh assertion for the resolved identity. Must
    /// carry the same binding as hop one.
    pub async fn issue_open_id_token(
        &self,
        config: &IdentityPoolConfig,
        identity_id: &str,
        binding: &TrustBinding,
    ) -> Result<Assertion, FederationError> {
        binding.ensure_matches(&config.issuer_key)?;

        let body = serde_json::json!({
            "IdentityId": identity_id,
            "Logins": binding.logins(),
        });
        let raw = self
            .call(config, "AWSCognitoIdentityService.GetOpenIdToken", body)
            .await?;
        let parsed: GetOpenIdTokenResponse =
            serde_json::from_value(raw).map_err(|e| FederationError::RemoteAuth {
                endpoint: COGNITO_ENDPOINT,
                detail: format!("GetOpenIdToken returned no token: {}", e),
            })?;
        Assertion::new(parsed.token)
    }
}

#[async_trait]
impl ExchangeStep for IdentityPoolExchange {
    fn name(&self) -> &'static str {
        "cognito-identity-pool"
    }

    async fn exchange(&self, input: ExchangeValue) -> Result<ExchangeValue, FederationError> {
        let assertion = input.into_assertion(self.name())?;
        let config = IdentityPoolConfig::from_env()?;

        let binding = TrustBinding::new(&config.issuer_url, assertion);
        let identity_id = self.resolve_identity(&config, &binding).await?;
        info!(identity_id = %identity_id, "Resolved identity-pool identity");

        let token = self
            .issue_open_id_token(&config, &identity_id, &binding)
            .await?;
        info!(
            identity_id = %identity_id,
            token_length = token.len(),
            "Issued identity-pool assertion"
        );

        Ok(ExchangeValue::Assertion(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(issuer: &str) -> TrustBinding {
        TrustBinding::new(issuer, Assertion::new("a.b.c").unwrap())
    }

    #[test]
    fn test_binding_strips_scheme() {
        let b = binding("https://oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE");
        assert_eq!(b.issuer_key(), "oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE");
    }

    #[test]
    fn test_binding_matches_own_key() {
        let b = binding("https://oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE");
        assert!(b
            .ensure_matches("oidc.eks.us-west-2.amazonaws.com/id/EXAMPLE")
            .is_ok());
    }

    #[test]
    fn test_binding_mismatch_fails_fast() {
        let b = binding("https://oidc.eks.us-west-2.amazonaws.com/id/AAAA");
        let err = b
            .ensure_matches("oidc.eks.us-west-2.amazonaws.com/id/BBBB")
            .unwrap_err();
        assert!(matches!(err, FederationError::TrustBindingMismatch { .. }));
    }

    #[tokio::test]
    async fn test_mismatched_binding_never_reaches_the_wire() {
        let exchange = IdentityPoolExchange::new().unwrap();
        let config = IdentityPoolConfig {
            identity_pool_id: "us-west-2:11111111-2222-3333-4444-555555555555".to_string(),
            issuer_key: "oidc.eks.us-west-2.amazonaws.com/id/EXPECTED".to_string(),
            issuer_url: "https://oidc.eks.us-west-2.amazonaws.com/id/EXPECTED".to_string(),
            region: "us-west-2".to_string(),
        };
        let stray = binding("https://oidc.eks.us-west-2.amazonaws.com/id/OTHER");

        let err = exchange
            .resolve_identity(&config, &stray)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::TrustBindingMismatch { .. }));

        let err = exchange
            .issue_open_id_token(&config, "us-west-2:identity", &stray)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::TrustBindingMismatch { .. }));
    }

    #[test]
    fn test_get_id_response_parsing() {
        let raw = serde_json::json!({ "IdentityId": "us-west-2:abc-123" });
        let parsed: GetIdResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.identity_id, "us-west-2:abc-123");
    }

    #[test]
    fn test_config_requires_pool_id() {
        std::env::remove_var("COGNITO_IDENTITY_POOL_ID");
        let err = IdentityPoolConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            FederationError::MissingConfig("COGNITO_IDENTITY_POOL_ID")
        ));
    }
}
