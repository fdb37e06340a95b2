//! Azure resource-group probe
//!
//! One Resource Manager listing call authenticated with an access token
//! produced by the exchanged credential handle.

use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::info;

use super::{ProbeReport, TargetProbe, SAMPLE_LIMIT};
use crate::error::FederationError;
use crate::exchange::entra::ARM_SCOPE;
use crate::exchange::ExchangeValue;

const ARM_ENDPOINT: &str = "Azure Resource Manager";
const ARM_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Deserialize)]
struct ResourceGroupList {
    #[serde(default)]
    value: Vec<ResourceGroup>,
}

#[derive(Debug, Deserialize)]
struct ResourceGroup {
    name: String,
    location: String,
}

/// Proves the Entra credential handle works by listing resource groups.
pub struct ResourceGroupProbe {
    http_client: reqwest::Client,
}

impl ResourceGroupProbe {
    pub fn new() -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl TargetProbe for ResourceGroupProbe {
    fn name(&self) -> &'static str {
        "azure-resource-groups"
    }

    async fn probe(&self, credential: &ExchangeValue) -> Result<ProbeReport, FederationError> {
        let handle = match credential {
            ExchangeValue::EntraHandle(handle) => handle,
            other => {
                return Err(FederationError::WrongInput {
                    step: self.name(),
                    got: other.kind(),
                })
            }
        };

        let subscription_id = env::var("AZURE_SUBSCRIPTION_ID")
            .map_err(|_| FederationError::MissingConfig("AZURE_SUBSCRIPTION_ID"))?;

        let token = handle.access_token(&self.http_client, ARM_SCOPE).await?;

        let url = format!(
            "https://management.azure.com/subscriptions/{}/resourcegroups?api-version={}",
            subscription_id, ARM_API_VERSION
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|source| FederationError::Transport {
                endpoint: ARM_ENDPOINT,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::RemoteAuth {
                endpoint: ARM_ENDPOINT,
                detail: format!("{}: {}", status, body),
            });
        }

        let groups: ResourceGroupList =
            response
                .json()
                .await
                .map_err(|source| FederationError::Transport {
                    endpoint: ARM_ENDPOINT,
                    source,
                })?;

        let samples: Vec<String> = groups
            .value
            .iter()
            .take(SAMPLE_LIMIT)
            .map(|rg| format!("{} ({})", rg.name, rg.location))
            .collect();

        info!(
            subscription_id = %subscription_id,
            resource_groups = groups.value.len(),
            "Resource Manager call confirmed"
        );

        Ok(ProbeReport {
            account: subscription_id,
            principal: handle.principal().to_string(),
            resource_count: groups.value.len(),
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Assertion;

    #[test]
    fn test_parse_resource_group_list() {
        let raw = serde_json::json!({
            "value": [
                { "id": "/subscriptions/s/resourceGroups/rg-one", "name": "rg-one", "location": "westus2", "properties": { "provisioningState": "Succeeded" } },
                { "id": "/subscriptions/s/resourceGroups/rg-two", "name": "rg-two", "location": "eastus" },
            ]
        });
        let list: ResourceGroupList = serde_json::from_value(raw).unwrap();
        assert_eq!(list.value.len(), 2);
        assert_eq!(list.value[0].name, "rg-one");
        assert_eq!(list.value[1].location, "eastus");
    }

    #[test]
    fn test_empty_listing_deserializes() {
        let list: ResourceGroupList = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(list.value.is_empty());
    }

    #[tokio::test]
    async fn test_probe_rejects_assertion_input() {
        let probe = ResourceGroupProbe::new().unwrap();
        let input = ExchangeValue::Assertion(Assertion::new("a.b.c").unwrap());
        let err = probe.probe(&input).await.unwrap_err();
        assert!(matches!(err, FederationError::WrongInput { .. }));
    }
}
