use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use rxminer_stratum::{
    open_with_backoff, Job, PoolConfig, SessionCredentials, StratumConfig, StratumConnection,
    VariantKind,
};
use tracing::{info, warn};

use crate::config::{config_exists, load_config, MinerConfig};

/// Connect to a pool and follow its jobs
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Pool URL (e.g., stratum+tcp://pool.example.com:3333)
    #[arg(short, long, env = "RXMINER_URL")]
    pub url: Option<String>,

    /// Pool host, overrides the host in the URL
    #[arg(long, env = "RXMINER_HOST")]
    pub host: Option<String>,

    /// Pool port, overrides the port in the URL
    #[arg(long, env = "RXMINER_PORT")]
    pub port: Option<u16>,

    /// Wallet address or account login
    #[arg(short, long, env = "RXMINER_LOGIN")]
    pub login: Option<String>,

    /// Worker password
    #[arg(short, long, env = "RXMINER_PASSWORD")]
    pub password: Option<String>,

    /// Pool dialect (xmr, eth, standard)
    #[arg(long, env = "RXMINER_VARIANT")]
    pub variant: Option<VariantKind>,

    /// Exit when the pool drops the session instead of reconnecting
    #[arg(long)]
    pub once: bool,
}

/// Everything needed to open a session
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub credentials: SessionCredentials,
    pub variant: VariantKind,
    pub stratum: StratumConfig,
}

enum SessionEnd {
    Interrupted,
    Dropped,
}

pub async fn execute(args: StartArgs) -> Result<()> {
    let file = if config_exists() {
        Some(load_config()?)
    } else {
        None
    };

    let session = resolve_session(&args, file)?;

    println!("{}", "Starting session".bold());
    println!("  {} {}", "Pool:".bold(), session.name.white());
    println!("  {} {}", "Endpoint:".bold(), session.credentials.endpoint().cyan());
    println!("  {} {}", "Variant:".bold(), session.variant.to_string().yellow());
    println!();

    loop {
        let connection = open_with_backoff(&session.credentials, session.variant, &session.stratum)
            .await
            .with_context(|| format!("Failed to connect to {}", session.credentials.endpoint()))?;

        match follow_jobs(&connection).await {
            SessionEnd::Interrupted => {
                let _ = connection.close().await;
                println!("{}", "Session closed".green());
                return Ok(());
            }
            SessionEnd::Dropped if args.once => {
                println!("{} {}", "Session ended:".yellow(), connection.state().await);
                return Ok(());
            }
            SessionEnd::Dropped => {
                warn!("Session ended ({}), reconnecting", connection.state().await);
            }
        }
    }
}

/// Merge command-line values over the config file
pub fn resolve_session(args: &StartArgs, file: Option<MinerConfig>) -> Result<Session> {
    let (pool, stratum) = match file {
        Some(config) => (Some(config.pool), config.stratum),
        None => (None, StratumConfig::default()),
    };

    let url = args
        .url
        .clone()
        .or_else(|| pool.as_ref().map(|p| p.url.clone()));

    let (url_host, url_port) = match url {
        Some(url) => {
            let parsed = PoolConfig {
                name: String::new(),
                url,
                login: String::new(),
                password: String::new(),
                variant: VariantKind::default(),
            }
            .parse_url()?;
            (Some(parsed.0), Some(parsed.1))
        }
        None => (None, None),
    };

    let host = args
        .host
        .clone()
        .or(url_host)
        .context("Pool host must be specified (--url or --host)")?;
    let port = args
        .port
        .map(|p| p.to_string())
        .or(url_port)
        .context("Pool port must be specified (--url or --port)")?;
    let login = args
        .login
        .clone()
        .or_else(|| pool.as_ref().map(|p| p.login.clone()))
        .context("Login must be specified (--login)")?;
    let password = args
        .password
        .clone()
        .or_else(|| pool.as_ref().map(|p| p.password.clone()))
        .unwrap_or_else(|| "x".to_string());
    let variant = args
        .variant
        .or_else(|| pool.as_ref().map(|p| p.variant))
        .unwrap_or_default();
    let name = pool.map(|p| p.name).unwrap_or_else(|| host.clone());

    Ok(Session {
        name,
        credentials: SessionCredentials::new(login, password, host, port),
        variant,
        stratum,
    })
}

async fn follow_jobs(connection: &StratumConnection) -> SessionEnd {
    let mut jobs = connection.subscribe_jobs();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return SessionEnd::Interrupted,
            _ = connection.closed() => return SessionEnd::Dropped,
            changed = jobs.changed() => {
                if changed.is_err() {
                    return SessionEnd::Dropped;
                }
                if let Some(job) = connection.current_job() {
                    print_job(&job);
                }
            }
        }
    }
}

fn print_job(job: &Job) {
    let difficulty = job
        .difficulty()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    info!(job_id = %job.job_id, height = job.height, "Job received");
    println!(
        "  {} job {} height {} difficulty {} blob {} bytes",
        "▸".bright_cyan(),
        job.job_id.bright_yellow(),
        job.height.to_string().white(),
        difficulty.bright_white(),
        job.blob.len()
    );
}
