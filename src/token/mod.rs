//! Workload identity token sources
//!
//! Obtains the locally-issued assertion that opens every exchange chain:
//! read from the platform's projected token file, requested from the local
//! identity provider, or (demo only) self-issued.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::env;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::error::FederationError;

pub mod inspect;

/// Default projected ServiceAccount token path on AKS.
pub const AKS_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default IRSA projected token path on EKS.
pub const EKS_TOKEN_PATH: &str = "/var/run/secrets/eks.amazonaws.com/serviceaccount/token";

/// A signed, time-bounded statement of workload identity.
///
/// Opaque three-segment token (`header.body.signature`) held in memory for
/// the duration of one exchange cycle. Never empty.
#[derive(Debug, Clone)]
pub struct Assertion(String);

impl Assertion {
    /// Wrap a raw token string, rejecting empty input.
    pub fn new(raw: impl Into<String>) -> Result<Self, FederationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(FederationError::TokenSource(
                "assertion content is empty".to_string(),
            ));
        }
        Ok(Self(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source of workload identity assertions.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Human-readable description for progress logs.
    fn describe(&self) -> String;

    /// Obtain a fresh assertion. No retries happen inside this call; the
    /// run loop is the only retry mechanism.
    async fn obtain(&self) -> Result<Assertion, FederationError>;
}

/// File-backed token source reading a projected ServiceAccount token.
///
/// The platform refreshes the file out-of-band; this only ever reads it.
pub struct FileTokenSource {
    path: String,
}

impl FileTokenSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Projected token path on AKS, overridable via
    /// `KUBERNETES_SERVICE_ACCOUNT_TOKEN_PATH`.
    pub fn aks_default() -> Self {
        let path = env::var("KUBERNETES_SERVICE_ACCOUNT_TOKEN_PATH")
            .unwrap_or_else(|_| AKS_TOKEN_PATH.to_string());
        Self::new(path)
    }

    /// IRSA token path on EKS, overridable via `AWS_WEB_IDENTITY_TOKEN_FILE`.
    pub fn eks_default() -> Self {
        let path =
            env::var("AWS_WEB_IDENTITY_TOKEN_FILE").unwrap_or_else(|_| EKS_TOKEN_PATH.to_string());
        Self::new(path)
    }
}

#[async_trait]
impl TokenSource for FileTokenSource {
    fn describe(&self) -> String {
        format!("projected token file {}", self.path)
    }

    async fn obtain(&self) -> Result<Assertion, FederationError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            FederationError::TokenSource(format!("failed to read {}: {}", self.path, e))
        })?;
        let assertion = Assertion::new(raw)?;
        info!(
            path = %self.path,
            token_length = assertion.len(),
            "Obtained workload identity token"
        );
        Ok(assertion)
    }
}

/// Provider-backed token source requesting an Entra ID token for a target
/// audience via the Azure workload-identity mechanism.
///
/// Reads the federated token file the platform projects
/// (`AZURE_FEDERATED_TOKEN_FILE`) and exchanges it at the tenant's token
/// endpoint for an access token scoped to the exchange audience.
pub struct EntraWorkloadTokenSource {
    http_client: reqwest::Client,
    scope: String,
}

/// Token-exchange audience scope used when assuming a foreign-cloud role
/// with an Entra-issued assertion.
pub const ENTRA_EXCHANGE_SCOPE: &str = "api://AzureADTokenExchange/.default";

impl EntraWorkloadTokenSource {
    pub fn new(scope: impl Into<String>) -> AnyResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            scope: scope.into(),
        })
    }
}

#[async_trait]
impl TokenSource for EntraWorkloadTokenSource {
    fn describe(&self) -> String {
        format!("Entra workload identity (scope {})", self.scope)
    }

    async fn obtain(&self) -> Result<Assertion, FederationError> {
        let tenant_id = env::var("AZURE_TENANT_ID")
            .map_err(|_| FederationError::MissingConfig("AZURE_TENANT_ID"))?;
        let client_id = env::var("AZURE_CLIENT_ID")
            .map_err(|_| FederationError::MissingConfig("AZURE_CLIENT_ID"))?;
        let token_file = env::var("AZURE_FEDERATED_TOKEN_FILE")
            .map_err(|_| FederationError::MissingConfig("AZURE_FEDERATED_TOKEN_FILE"))?;

        let federated = std::fs::read_to_string(&token_file).map_err(|e| {
            FederationError::TokenSource(format!("failed to read {}: {}", token_file, e))
        })?;
        let federated = Assertion::new(federated)?;

        let token = crate::exchange::entra::request_access_token(
            &self.http_client,
            &tenant_id,
            &client_id,
            &federated,
            &self.scope,
        )
        .await?;

        info!(
            tenant_id = %tenant_id,
            scope = %self.scope,
            "Obtained Entra ID token via workload identity"
        );
        Assertion::new(token.access_token)
    }
}

/// Demo-only token source fabricating an unsigned assertion.
///
/// The assertion carries `alg: none` and an empty signature segment, so no
/// real issuer stands behind it. Strictly a stand-in for wiring demos where
/// the genuine issuer is not reachable; any deployment that matters must use
/// [`FileTokenSource`] or [`EntraWorkloadTokenSource`] instead.
pub struct SelfIssuedTokenSource {
    issuer: String,
    subject: String,
    audience: String,
}

impl SelfIssuedTokenSource {
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        warn!("Self-issued token source active - assertions are unsigned and demo-only");
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl TokenSource for SelfIssuedTokenSource {
    fn describe(&self) -> String {
        format!("self-issued demo assertion (issuer {})", self.issuer)
    }

    async fn obtain(&self) -> Result<Assertion, FederationError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| FederationError::TokenSource(format!("system clock error: {}", e)))?
            .as_secs();

        let header = serde_json::json!({ "alg": "none", "typ": "JWT" });
        let claims = serde_json::json!({
            "iss": self.issuer,
            "sub": self.subject,
            "aud": self.audience,
            "iat": now,
            "exp": now + 3600,
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());

        // Empty third segment: unsigned by construction.
        Assertion::new(format!("{}.{}.", header_b64, claims_b64))
    }
}
