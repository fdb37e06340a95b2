//! Exchange cycle run loop
//!
//! Drives repeated exchange cycles: acquire a token, inspect it
//! (best-effort), walk the exchange hops, probe the target cloud, record
//! the outcome. A cycle moves Idle → Attempting → Succeeded/Failed → Idle;
//! the loop never terminates on its own and nothing is retried within a
//! cycle - the next cycle is the only retry mechanism.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::FederationError;
use crate::exchange::{ExchangeStep, ExchangeValue};
use crate::probe::{ProbeReport, TargetProbe};
use crate::token::{inspect::inspect, TokenSource};

/// Per-loop attempt counters.
///
/// Owned by the driving loop; monotonically increasing, reset only on
/// process restart. Concurrent loops keep separate instances.
#[derive(Debug, Default)]
pub struct RunStats {
    attempts: u64,
    successes: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_attempt(&mut self) -> u64 {
        self.attempts += 1;
        self.attempts
    }

    fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Running success rate in percent; 0 before the first attempt.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64 * 100.0
        }
    }

    fn summary(&self) -> String {
        format!(
            "{}/{} ({:.1}%)",
            self.successes,
            self.attempts,
            self.success_rate()
        )
    }
}

/// Result of one cycle: a diagnostic payload on success, a cause on
/// failure. Folded into [`RunStats`] immediately; never retained.
#[derive(Debug)]
pub enum CycleOutcome {
    Succeeded(ProbeReport),
    Failed(String),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Succeeded(_))
    }
}

/// Inter-cycle delay policy.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    /// Constant delay regardless of outcome.
    FixedInterval(Duration),
    /// Delay doubling with the consecutive-failure streak, capped at `max`.
    /// A success resets the streak.
    ExponentialBackoff { base: Duration, max: Duration },
}

impl RetryPolicy {
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match self {
            RetryPolicy::FixedInterval(interval) => *interval,
            RetryPolicy::ExponentialBackoff { base, max } => {
                let exponent = consecutive_failures.min(16);
                base.saturating_mul(1u32 << exponent).min(*max)
            }
        }
    }
}

/// One direction's full exchange chain: token source, exchange hops, probe.
pub struct ExchangeChain {
    name: &'static str,
    source: Box<dyn TokenSource>,
    steps: Vec<Box<dyn ExchangeStep>>,
    probe: Box<dyn TargetProbe>,
}

impl ExchangeChain {
    pub fn new(
        name: &'static str,
        source: Box<dyn TokenSource>,
        steps: Vec<Box<dyn ExchangeStep>>,
        probe: Box<dyn TargetProbe>,
    ) -> Self {
        Self {
            name,
            source,
            steps,
            probe,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run one full pass: acquire → inspect → exchange hops → probe.
    /// Short-circuits at the first failing step; inspection is advisory
    /// and never blocks the chain.
    pub async fn run_cycle(&self) -> Result<ProbeReport, FederationError> {
        let assertion = self.source.obtain().await?;

        match inspect(&assertion) {
            Ok(claims) => info!(
                issuer = claims.iss.as_deref().unwrap_or("n/a"),
                subject = claims.sub.as_deref().unwrap_or("n/a"),
                audience = %claims
                    .aud
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                "Assertion claims"
            ),
            Err(e) => warn!(cause = %e, "Assertion inspection failed, continuing"),
        }

        let mut value = ExchangeValue::Assertion(assertion);
        for step in &self.steps {
            debug!(step = step.name(), input = value.kind(), "Executing exchange hop");
            value = step.exchange(value).await?;
        }

        self.probe.probe(&value).await
    }
}

/// The continuous retry/reporting loop around an [`ExchangeChain`].
pub struct RunLoop {
    chain: ExchangeChain,
    policy: RetryPolicy,
    stats: RunStats,
}

impl RunLoop {
    pub fn new(chain: ExchangeChain, policy: RetryPolicy) -> Self {
        Self {
            chain,
            policy,
            stats: RunStats::new(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Execute a single cycle and fold its outcome into the counters.
    pub async fn run_once(&mut self) -> CycleOutcome {
        let attempt = self.stats.begin_attempt();
        info!(attempt, chain = self.chain.name(), "Starting exchange cycle");

        match self.chain.run_cycle().await {
            Ok(report) => {
                self.stats.record_success();
                info!(
                    attempt,
                    outcome = "succeeded",
                    account = %report.account,
                    principal = %report.principal,
                    resource_count = report.resource_count,
                    success_rate = %self.stats.summary(),
                    "Cycle complete"
                );
                CycleOutcome::Succeeded(report)
            }
            Err(e) => {
                error!(
                    attempt,
                    outcome = "failed",
                    cause = %e,
                    success_rate = %self.stats.summary(),
                    "Cycle failed"
                );
                CycleOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run cycles until the process is terminated.
    pub async fn run_forever(&mut self) {
        let mut consecutive_failures = 0u32;
        loop {
            let outcome = self.run_once().await;
            consecutive_failures = if outcome.is_success() {
                0
            } else {
                consecutive_failures + 1
            };

            let delay = self.policy.delay(consecutive_failures);
            debug!(delay_secs = delay.as_secs(), "Idle until next cycle");
            tokio::time::sleep(delay).await;
        }
    }
}
