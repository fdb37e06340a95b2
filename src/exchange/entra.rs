//! Entra ID client-assertion exchange
//!
//! Binds a federated assertion to an Entra service principal. The hop itself
//! is local: it produces a reusable handle, and the handle posts the
//! assertion as a `jwt-bearer` client assertion whenever a caller asks it
//! for an access token.

use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use tracing::info;

use super::{ExchangeStep, ExchangeValue};
use crate::error::FederationError;
use crate::token::Assertion;

const ENTRA_ENDPOINT: &str = "Entra ID";

/// Scope for Azure Resource Manager access.
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Access token minted by the Entra token endpoint.
#[derive(Debug, Deserialize)]
pub struct EntraAccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchange a federated assertion for an Entra access token.
pub async fn request_access_token(
    http_client: &reqwest::Client,
    tenant_id: &str,
    client_id: &str,
    assertion: &Assertion,
    scope: &str,
) -> Result<EntraAccessToken, FederationError> {
    let token_url = format!(
        "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
        tenant_id
    );

    let form_data = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        (
            "client_assertion_type",
            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
        ),
        ("client_assertion", assertion.as_str()),
        ("scope", scope),
    ];

    let response = http_client
        .post(&token_url)
        .form(&form_data)
        .send()
        .await
        .map_err(|source| FederationError::Transport {
            endpoint: ENTRA_ENDPOINT,
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FederationError::RemoteAuth {
            endpoint: ENTRA_ENDPOINT,
            detail: format!("{}: {}", status, body),
        });
    }

    response
        .json()
        .await
        .map_err(|source| FederationError::Transport {
            endpoint: ENTRA_ENDPOINT,
            source,
        })
}

/// Reusable credential handle bound to an Entra service principal.
///
/// Holds the federated assertion and produces scoped access tokens on
/// demand; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct ClientAssertionHandle {
    tenant_id: String,
    client_id: String,
    assertion: Assertion,
}

impl ClientAssertionHandle {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        assertion: Assertion,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            assertion,
        }
    }

    /// The service principal this handle authenticates as.
    pub fn principal(&self) -> &str {
        &self.client_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Produce an access token for the given scope.
    pub async fn access_token(
        &self,
        http_client: &reqwest::Client,
        scope: &str,
    ) -> Result<EntraAccessToken, FederationError> {
        request_access_token(
            http_client,
            &self.tenant_id,
            &self.client_id,
            &self.assertion,
            scope,
        )
        .await
    }
}

/// Entra configuration, resolved from the environment at call time.
#[derive(Debug, Clone)]
pub struct EntraConfig {
    pub tenant_id: String,
    pub client_id: String,
}

impl EntraConfig {
    pub fn from_env() -> Result<Self, FederationError> {
        let tenant_id = env::var("AZURE_TENANT_ID")
            .map_err(|_| FederationError::MissingConfig("AZURE_TENANT_ID"))?;
        let client_id = env::var("AZURE_CLIENT_ID")
            .map_err(|_| FederationError::MissingConfig("AZURE_CLIENT_ID"))?;
        Ok(Self {
            tenant_id,
            client_id,
        })
    }
}

/// Assertion-credential hop: assertion in, Entra credential handle out.
pub struct ClientAssertionExchange;

impl ClientAssertionExchange {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClientAssertionExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStep for ClientAssertionExchange {
    fn name(&self) -> &'static str {
        "entra-client-assertion"
    }

    async fn exchange(&self, input: ExchangeValue) -> Result<ExchangeValue, FederationError> {
        let assertion = input.into_assertion(self.name())?;
        let config = EntraConfig::from_env()?;

        info!(
            tenant_id = %config.tenant_id,
            client_id = %config.client_id,
            "Bound assertion to Entra service principal"
        );

        Ok(ExchangeValue::EntraHandle(ClientAssertionHandle::new(
            config.tenant_id,
            config.client_id,
            assertion,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_exposes_principal() {
        let handle = ClientAssertionHandle::new(
            "tenant-1234",
            "client-5678",
            Assertion::new("a.b.c").unwrap(),
        );
        assert_eq!(handle.principal(), "client-5678");
        assert_eq!(handle.tenant_id(), "tenant-1234");
    }

    #[test]
    fn test_access_token_deserializes() {
        let raw = serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "eyJ0eXAi.example.token",
        });
        let token: EntraAccessToken = serde_json::from_value(raw).unwrap();
        assert_eq!(token.access_token, "eyJ0eXAi.example.token");
        assert_eq!(token.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_exchange_fails_locally_without_tenant() {
        std::env::remove_var("AZURE_TENANT_ID");
        let step = ClientAssertionExchange::new();
        let input = ExchangeValue::Assertion(Assertion::new("a.b.c").unwrap());
        let err = step.exchange(input).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::MissingConfig("AZURE_TENANT_ID")
        ));
    }
}
