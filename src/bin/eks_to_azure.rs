//! EKS to Azure federation agent
//!
//! Proves cross-cloud authentication by calling Azure Resource Manager from
//! AWS EKS. Flow: IRSA JWT -> Cognito Identity Pool assertion -> Entra
//! service principal -> resource-group listing.

use anyhow::Result;
use clap::Parser;
use std::env;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use federation_agent::exchange::entra::ClientAssertionExchange;
use federation_agent::exchange::identity_pool::IdentityPoolExchange;
use federation_agent::exchange::sts::{StsWebIdentityExchange, DEFAULT_AWS_REGION};
use federation_agent::probe::aws::CallerIdentityProbe;
use federation_agent::probe::azure::ResourceGroupProbe;
use federation_agent::token::{FileTokenSource, SelfIssuedTokenSource, TokenSource};
use federation_agent::{
    ExchangeChain, ExchangeStep, ExchangeValue, RetryPolicy, RunLoop, TargetProbe,
};

/// EKS to Azure federation agent
#[derive(Parser, Debug)]
#[command(name = "eks-to-azure", version, about)]
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

    /// Demo only: fabricate an unsigned assertion instead of the IRSA
    /// token and skip the identity-pool hop. Not a production trust path.
    #[arg(long, default_value = "false")]
    self_issued: bool,
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
        "Starting EKS to Azure federation agent (IRSA -> Cognito assertion -> Entra service principal)"
    );

    if env::var("AWS_ROLE_ARN").is_ok() {
        if let Err(e) = aws_identity_preflight().await {
            warn!(error = %e, "AWS identity preflight failed, continuing");
        }
    } else {
        info!("AWS_ROLE_ARN not set, skipping AWS identity preflight");
    }

    let (source, steps) = assemble_chain(args.self_issued)?;
    info!(source = %source.describe(), "Token source selected");

    let chain = ExchangeChain::new(
        "eks-to-azure",
        source,
        steps,
        Box::new(ResourceGroupProbe::new()?),
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

/// Pick the token source and exchange hops for this run.
///
/// The normal chain reads the IRSA token and walks the identity-pool
/// two-hop before binding to the Entra principal. The demo chain fabricates
/// the pool-style assertion locally and goes straight to the binding hop.
fn assemble_chain(
    self_issued: bool,
) -> Result<(Box<dyn TokenSource>, Vec<Box<dyn ExchangeStep>>)> {
    if self_issued {
        let user_pool_id = env::var("COGNITO_USER_POOL_ID")
            .map_err(|_| anyhow::anyhow!("COGNITO_USER_POOL_ID required with --self-issued"))?;
        let region = env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_AWS_REGION.to_string());

        let source = SelfIssuedTokenSource::new(
            format!("https://cognito-idp.{}.amazonaws.com/{}", region, user_pool_id),
            "system:serviceaccount:demo:workload-identity-sa",
            "api://AzureADTokenExchange",
        );
        return Ok((
            Box::new(source),
            vec![Box::new(ClientAssertionExchange::new())],
        ));
    }

    Ok((
        Box::new(FileTokenSource::eks_default()),
        vec![
            Box::new(IdentityPoolExchange::new()?),
            Box::new(ClientAssertionExchange::new()),
        ],
    ))
}

/// Startup diagnostic: confirm the ambient IRSA identity works before the
/// first cycle. Failure is logged, never fatal.
async fn aws_identity_preflight() -> Result<()> {
    let source = FileTokenSource::eks_default();
    let assertion = source.obtain().await?;

    let step = StsWebIdentityExchange::new("EKSWorkloadPreflight")?;
    let credentials = step.exchange(ExchangeValue::Assertion(assertion)).await?;

    let probe = CallerIdentityProbe::new()?;
    let report = probe.probe(&credentials).await?;

    info!(
        account = %report.account,
        principal = %report.principal,
        "Authenticated to AWS via IRSA"
    );
    Ok(())
}
