//! Cross-cloud workload identity federation
//!
//! Exchange chains that turn a locally-issued Kubernetes workload identity
//! token into a foreign cloud's temporary credentials, plus the continuous
//! retry/reporting loop that drives them. No static keys anywhere: every
//! cycle performs the full chain from scratch.

pub mod error;
pub mod exchange;
pub mod probe;
pub mod runner;
pub mod sigv4;
pub mod token;

pub use error::FederationError;
pub use exchange::{ExchangeStep, ExchangeValue};
pub use probe::{ProbeReport, TargetProbe};
pub use runner::{CycleOutcome, ExchangeChain, RetryPolicy, RunLoop, RunStats};
pub use token::{Assertion, TokenSource};
