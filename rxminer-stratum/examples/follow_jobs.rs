//! Follow the jobs of one pool session.
//!
//! A plain thread stands in for a solver and samples the current job on
//! its own schedule while the session swaps jobs underneath it.
//!
//! ```text
//! cargo run --example follow_jobs -- pool.example.com 3333 <wallet> [xmr|eth|standard]
//! ```

use rxminer_stratum::{open_with_backoff, SessionCredentials, StratumConfig, VariantKind};
use std::{
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("rxminer_stratum=debug,follow_jobs=info")
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().unwrap_or_else(|| "3333".to_string());
    let login = args.next().unwrap_or_else(|| "wallet".to_string());
    let kind: VariantKind = args.next().as_deref().unwrap_or("xmr").parse()?;

    let config = StratumConfig::default();
    let credentials = SessionCredentials::new(login, "x", host, port);
    let connection = Arc::new(open_with_backoff(&credentials, kind, &config).await?);

    let stop = Arc::new(AtomicBool::new(false));
    let solver = {
        let connection = connection.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut last = None;
            while !stop.load(Ordering::Relaxed) {
                if let Some(job) = connection.current_job() {
                    if last.as_deref() != Some(job.job_id.as_str()) {
                        info!("Solver picked up {} ({})", job, job.fingerprint());
                        last = Some(job.job_id.clone());
                    }
                }
                thread::sleep(Duration::from_millis(250));
            }
        })
    };

    let mut jobs = connection.subscribe_jobs();
    let watch = async {
        while jobs.changed().await.is_ok() {
            if let Some(job) = connection.current_job() {
                info!("Pool sent {} difficulty {:?}", job, job.difficulty());
            }
        }
    };

    tokio::select! {
        _ = watch => {}
        _ = connection.closed() => info!("Session ended: {}", connection.state().await),
        _ = tokio::signal::ctrl_c() => {}
    }

    stop.store(true, Ordering::Relaxed);
    connection.close().await.ok();
    solver.join().ok();
    Ok(())
}
