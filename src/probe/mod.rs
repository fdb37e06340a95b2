//! Target API probes
//!
//! One minimal, read-only call against the destination cloud with the final
//! credential, purely to prove the chain works end to end.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::FederationError;
use crate::exchange::ExchangeValue;

pub mod aws;
pub mod azure;

/// How many sample items a probe report carries at most.
pub const SAMPLE_LIMIT: usize = 3;

/// Diagnostic record proving the exchanged credential works.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    /// Account or subscription the credential landed in.
    pub account: String,
    /// Principal the target cloud saw (role ARN or service principal id).
    pub principal: String,
    /// Number of resources the probe call could see.
    pub resource_count: usize,
    /// Up to [`SAMPLE_LIMIT`] sample items.
    pub samples: Vec<String>,
}

/// Read-only identity or listing call against the destination cloud.
#[async_trait]
pub trait TargetProbe: Send + Sync {
    /// Probe name for progress logs and wiring errors.
    fn name(&self) -> &'static str;

    /// Issue exactly one call; never retried internally.
    async fn probe(&self, credential: &ExchangeValue) -> Result<ProbeReport, FederationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes() {
        let report = ProbeReport {
            account: "123456789012".to_string(),
            principal: "arn:aws:sts::123456789012:assumed-role/demo/session".to_string(),
            resource_count: 2,
            samples: vec!["rg-one (westus2)".to_string()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("123456789012"));
        assert!(json.contains("rg-one"));
    }
}
