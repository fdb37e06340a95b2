//! AWS caller-identity probe
//!
//! One `GetCallerIdentity` call, SigV4-signed with the exchanged temporary
//! credentials. STS answers in XML.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::info;

use super::{ProbeReport, TargetProbe};
use crate::error::FederationError;
use crate::exchange::sts::DEFAULT_AWS_REGION;
use crate::exchange::ExchangeValue;
use crate::sigv4::{sign_request, SigV4Request};

const STS_ENDPOINT: &str = "AWS STS";
const CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

#[derive(Debug, Deserialize)]
struct CallerIdentityResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: CallerIdentityResult,
}

#[derive(Debug, Deserialize)]
struct CallerIdentityResult {
    #[serde(rename = "Account")]
    account: String,
    #[serde(rename = "Arn")]
    arn: String,
    #[serde(rename = "UserId")]
    user_id: String,
}

/// Proves the exchanged AWS credentials work by asking STS who we are.
pub struct CallerIdentityProbe {
    http_client: reqwest::Client,
}

impl CallerIdentityProbe {
    pub fn new() -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl TargetProbe for CallerIdentityProbe {
    fn name(&self) -> &'static str {
        "aws-caller-identity"
    }

    async fn probe(&self, credential: &ExchangeValue) -> Result<ProbeReport, FederationError> {
        let credentials = match credential {
            ExchangeValue::AwsCredentials(credentials) => credentials,
            other => {
                return Err(FederationError::WrongInput {
                    step: self.name(),
                    got: other.kind(),
                })
            }
        };

        let region = env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string());
        let host = format!("sts.{}.amazonaws.com", region);

        let signed_headers = sign_request(
            &SigV4Request {
                method: "POST",
                host: &host,
                path: "/",
                query: "",
                content_type: Some("application/x-www-form-urlencoded"),
                body: CALLER_IDENTITY_BODY.as_bytes(),
            },
            credentials,
            &region,
            "sts",
            Utc::now(),
        );

        let mut request = self
            .http_client
            .post(format!("https://{}/", host))
            .body(CALLER_IDENTITY_BODY);
        for (name, value) in &signed_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
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
                detail: format!("GetCallerIdentity {}: {}", status, body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: STS_ENDPOINT,
                source,
            })?;

        let parsed: CallerIdentityResponse =
            quick_xml::de::from_str(&body).map_err(|e| FederationError::RemoteAuth {
                endpoint: STS_ENDPOINT,
                detail: format!("unparseable XML response: {}", e),
            })?;
        let identity = parsed.result;

        info!(
            account = %identity.account,
            arn = %identity.arn,
            user_id = %identity.user_id,
            "Caller identity confirmed"
        );

        Ok(ProbeReport {
            account: identity.account,
            principal: identity.arn,
            resource_count: 0,
            samples: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Assertion;

    const SAMPLE_RESPONSE: &str = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>arn:aws:sts::123456789012:assumed-role/aks-workload-role/AKSWorkloadSession</Arn>
    <UserId>AROACLKWSDQRAOEXAMPLE:AKSWorkloadSession</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
  <ResponseMetadata>
    <RequestId>01234567-89ab-cdef-0123-456789abcdef</RequestId>
  </ResponseMetadata>
</GetCallerIdentityResponse>"#;

    #[test]
    fn test_parse_caller_identity_response() {
        let parsed: CallerIdentityResponse = quick_xml::de::from_str(SAMPLE_RESPONSE).unwrap();
        assert_eq!(parsed.result.account, "123456789012");
        assert_eq!(
            parsed.result.arn,
            "arn:aws:sts::123456789012:assumed-role/aks-workload-role/AKSWorkloadSession"
        );
    }

    #[tokio::test]
    async fn test_probe_rejects_assertion_input() {
        let probe = CallerIdentityProbe::new().unwrap();
        let input = ExchangeValue::Assertion(Assertion::new("a.b.c").unwrap());
        let err = probe.probe(&input).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::WrongInput {
                step: "aws-caller-identity",
                ..
            }
        ));
    }
}
