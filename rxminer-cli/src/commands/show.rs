use anyhow::Result;
use clap::Args;
use colored::*;
use serde_json::json;

use crate::config::{get_config_path, load_config, MinerConfig};

/// Print the configured pool
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ShowArgs) -> Result<()> {
    let config = load_config()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&config)?)?);
        return Ok(());
    }

    let (host, port) = config.pool.parse_url()?;

    println!("{} {}", "Config:".bold(), get_config_path().display());
    println!();
    println!("  {} {}", "Pool:".bold(), config.pool.name.white());
    println!("  {} {}", "Host:".bold(), host.cyan());
    println!("  {} {}", "Port:".bold(), port.cyan());
    println!("  {} {}", "Login:".bold(), format_login(&config.pool.login));
    println!("  {} {}", "Password:".bold(), mask(&config.pool.password).bright_black());
    println!("  {} {}", "Variant:".bold(), config.pool.variant.to_string().yellow());
    println!();
    println!(
        "  {} {}s connect, {}s response",
        "Timeouts:".bold(),
        config.stratum.connection_timeout_secs,
        config.stratum.response_timeout_secs
    );
    println!("  {} {}", "Agent:".bold(), config.stratum.user_agent);

    Ok(())
}

fn to_json(config: &MinerConfig) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(config)?;
    value["pool"]["password"] = json!(mask(&config.pool.password));
    Ok(value)
}

fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

/// Shorten long wallet addresses
fn format_login(login: &str) -> String {
    if login.chars().count() > 20 {
        let head: String = login.chars().take(8).collect();
        let tail: String = login.chars().skip(login.chars().count() - 8).collect();
        format!("{}...{}", head, tail)
    } else {
        login.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxminer_stratum::{PoolConfig, StratumConfig, VariantKind};

    #[test]
    fn test_mask() {
        assert_eq!(mask("x"), "*");
        assert_eq!(mask(""), "");
    }

    #[test]
    fn test_format_login() {
        assert_eq!(format_login("short"), "short");
        assert_eq!(
            format_login("44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A"),
            "44AFFq5k...VGQBEP3A"
        );
    }

    #[test]
    fn test_json_hides_password() {
        let config = MinerConfig {
            pool: PoolConfig {
                name: "pool".to_string(),
                url: "pool.example.com:3333".to_string(),
                login: "wallet".to_string(),
                password: "secret".to_string(),
                variant: VariantKind::Eth,
            },
            stratum: StratumConfig::default(),
        };

        let value = to_json(&config).unwrap();
        assert_eq!(value["pool"]["password"], "******");
        assert_eq!(value["pool"]["variant"], "eth");
        assert_eq!(value["stratum"]["connection_timeout_secs"], 30);
    }
}
