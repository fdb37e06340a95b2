//! AKS to AWS federation agent
//!
//! Proves cross-cloud authentication by calling AWS STS from Azure AKS.
//! Flow: AKS OIDC issuer -> Kubernetes ServiceAccount JWT -> AWS IAM role
//! -> GetCallerIdentity.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::env;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use federation_agent::exchange::sts::StsWebIdentityExchange;
use federation_agent::probe::aws::CallerIdentityProbe;
use federation_agent::token::{
    EntraWorkloadTokenSource, FileTokenSource, TokenSource, ENTRA_EXCHANGE_SCOPE,
};
use federation_agent::{ExchangeChain, RetryPolicy, RunLoop};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Projected ServiceAccount token file
    File,
    /// Entra ID token requested via Azure workload identity
    Entra,
}

/// AKS to AWS federation agent
#[derive(Parser, Debug)]
#[command(name = "aks-to-aws", version, about)]
struct Args {
    /// Seconds between exchange cycles
    #[arg(long, default_value = "20", env = "CYCLE_INTERVAL")]
    interval: u64,

    /// Back off exponentially after consecutive failures instead of the
    /// fixed interval
    #[arg(long, default_value = "false")]
    backoff: bool,

    /// Run a single cycle and exit (for Job mode)
    #[arg(long, default_value = "false")]
    once: bool,

    /// Where the workload identity assertion comes from
    #[arg(long, value_enum, default_value = "file", env = "TOKEN_SOURCE")]
    token_source: SourceKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    let pod_name = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let namespace = env::var("POD_NAMESPACE").unwrap_or_else(|_| "unknown".to_string());

    info!(
        pod = %pod_name,
        namespace = %namespace,
        interval = args.interval,
        "Starting AKS to AWS federation agent (AKS OIDC -> ServiceAccount JWT -> AWS IAM role)"
    );

    let source: Box<dyn TokenSource> = match args.token_source {
        SourceKind::File => Box::new(FileTokenSource::aks_default()),
        SourceKind::Entra => Box::new(EntraWorkloadTokenSource::new(ENTRA_EXCHANGE_SCOPE)?),
    };
    info!(source = %source.describe(), "Token source selected");

    let chain = ExchangeChain::new(
        "aks-to-aws",
        source,
        vec![Box::new(StsWebIdentityExchange::new("AKSWorkloadSession")?)],
        Box::new(CallerIdentityProbe::new()?),
    );

    let policy = if args.backoff {
        RetryPolicy::ExponentialBackoff {
            base: Duration::from_secs(args.interval),
            max: Duration::from_secs(args.interval.saturating_mul(16)),
        }
    } else {
        RetryPolicy::FixedInterval(Duration::from_secs(args.interval))
    };

    let mut run_loop = RunLoop::new(chain, policy);

    if args.once {
        let outcome = run_loop.run_once().await;
        if !outcome.is_success() {
            anyhow::bail!("exchange cycle failed");
        }
        return Ok(());
    }

    run_loop.run_forever().await;
    Ok(())
}
