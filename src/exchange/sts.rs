//! AWS STS web identity exchange
//!
//! Trades a workload identity assertion for temporary AWS credentials via
//! `AssumeRoleWithWebIdentity`. STS answers in XML.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use super::{ExchangeStep, ExchangeValue, TempAwsCredentials};
use crate::error::FederationError;

const STS_ENDPOINT: &str = "AWS STS";

/// Default region for the STS regional endpoint.
pub const DEFAULT_AWS_REGION: &str = "us-west-2";

/// Configuration for a web identity role assumption, resolved from the
/// environment at call time.
#[derive(Debug, Clone)]
pub struct StsExchangeConfig {
    pub role_arn: String,
    pub region: String,
    pub session_name: String,
}

impl StsExchangeConfig {
    /// Read the config from the process environment. `AWS_ROLE_ARN` is
    /// required; region and session name fall back to defaults.
    pub fn from_env(default_session_name: &str) -> Result<Self, FederationError> {
        let role_arn =
            env::var("AWS_ROLE_ARN").map_err(|_| FederationError::MissingConfig("AWS_ROLE_ARN"))?;
        let region = env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string());
        let session_name = env::var("AWS_ROLE_SESSION_NAME")
            .unwrap_or_else(|_| default_session_name.to_string());
        Ok(Self {
            role_arn,
            region,
            session_name,
        })
    }
}

/// AssumeRoleWithWebIdentity response body (XML).
#[derive(Debug, Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResult")]
    result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
struct AssumeRoleResult {
    #[serde(rename = "Credentials")]
    credentials: CredentialsXml,
}

#[derive(Debug, Deserialize)]
struct CredentialsXml {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken")]
    session_token: String,
    #[serde(rename = "Expiration")]
    expiration: Option<String>,
}

/// Direct STS hop: assertion in, temporary credentials out.
pub struct StsWebIdentityExchange {
    http_client: reqwest::Client,
    default_session_name: String,
}

impl StsWebIdentityExchange {
    pub fn new(default_session_name: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            default_session_name: default_session_name.into(),
        })
    }
}

#[async_trait]
impl ExchangeStep for StsWebIdentityExchange {
    fn name(&self) -> &'static str {
        "sts-web-identity"
    }

    async fn exchange(&self, input: ExchangeValue) -> Result<ExchangeValue, FederationError> {
        let assertion = input.into_assertion(self.name())?;
        let config = StsExchangeConfig::from_env(&self.default_session_name)?;

        let url = format!(
            "https://sts.{}.amazonaws.com/?Action=AssumeRoleWithWebIdentity&Version=2011-06-15&RoleArn={}&RoleSessionName={}&WebIdentityToken={}",
            config.region,
            urlencoding::encode(&config.role_arn),
            urlencoding::encode(&config.session_name),
            urlencoding::encode(assertion.as_str())
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: STS_ENDPOINT,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::RemoteAuth {
                endpoint: STS_ENDPOINT,
                detail: format!("{}: {}", status, body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: STS_ENDPOINT,
                source,
            })?;

        let parsed: AssumeRoleResponse =
            quick_xml::de::from_str(&body).map_err(|e| FederationError::RemoteAuth {
                endpoint: STS_ENDPOINT,
                detail: format!("unparseable XML response: {}", e),
            })?;
        let creds = parsed.result.credentials;

        let expiration = creds.expiration.as_deref().and_then(parse_expiration);

        info!(
            role_arn = %config.role_arn,
            session_name = %config.session_name,
            expiration = ?expiration,
            "Assumed AWS role via web identity"
        );

        Ok(ExchangeValue::AwsCredentials(TempAwsCredentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.session_token,
            expiration,
        }))
    }
}

fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(raw = %raw, error = %e, "Unparseable credential expiration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <SubjectFromWebIdentityToken>system:serviceaccount:demo:workload-identity-sa</SubjectFromWebIdentityToken>
    <Credentials>
      <SessionToken>AQoDYXdzEE0a8ANXXXXXXXXNO1ewxE5TijQyp</SessionToken>
      <SecretAccessKey>wJalrXUtnFEMI/K7MDENG/bPxRfiCYzEXAMPLEKEY</SecretAccessKey>
      <Expiration>2025-06-16T17:15:23Z</Expiration>
      <AccessKeyId>ASIACVQWERTYEXAMPLE</AccessKeyId>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>ad4156e9-bce1-11e2-82e6-6b6efEXAMPLE</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

    #[test]
    fn test_parse_sts_response() {
        let parsed: AssumeRoleResponse = quick_xml::de::from_str(SAMPLE_RESPONSE).unwrap();
        let creds = parsed.result.credentials;
        assert_eq!(creds.access_key_id, "ASIACVQWERTYEXAMPLE");
        assert_eq!(
            creds.secret_access_key,
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYzEXAMPLEKEY"
        );
        assert_eq!(creds.expiration.as_deref(), Some("2025-06-16T17:15:23Z"));
    }

    #[test]
    fn test_parse_expiration() {
        let dt = parse_expiration("2025-06-16T17:15:23Z").unwrap();
        assert_eq!(dt.timestamp(), 1750094123);
        assert!(parse_expiration("not-a-date").is_none());
    }

    #[test]
    fn test_config_requires_role_arn() {
        std::env::remove_var("AWS_ROLE_ARN");
        let err = StsExchangeConfig::from_env("TestSession").unwrap_err();
        assert!(matches!(
            err,
            FederationError::MissingConfig("AWS_ROLE_ARN")
        ));
    }
}
