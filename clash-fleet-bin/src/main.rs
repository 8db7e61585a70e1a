use std::{env, path::PathBuf};

use clap::Parser;
use clash_fleet::{Config, EventCollector, LogLevel, ProviderManager, setup_logging};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser, value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    #[clap(
        short,
        long,
        value_parser,
        value_name = "FILE",
        default_value = "config.yaml"
    )]
    config: PathBuf,

    /// check the configuration file and exit
    #[clap(short, long, action)]
    test: bool,

    /// overrides `log-level` of the configuration file
    #[clap(short, long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = match cli.directory {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let config_path = if cli.config.is_absolute() {
        cli.config
    } else {
        cwd.join(cli.config)
    };

    let config = Config::from_file(&config_path)?;
    let level = cli.log_level.unwrap_or(config.log_level);
    let cwd = cwd.to_string_lossy().to_string();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if cli.test {
        rt.block_on(check(&config, &cwd))?;
        println!(
            "configuration file {} test is successful",
            config_path.display()
        );
        return Ok(());
    }

    rt.block_on(run(config, cwd, level))
}

/// Builds every provider without fetching anything.
async fn check(config: &Config, cwd: &str) -> anyhow::Result<()> {
    let manager = ProviderManager::new(config, cwd).await?;
    manager.destroy_all().await;
    Ok(())
}

async fn run(config: Config, cwd: String, level: LogLevel) -> anyhow::Result<()> {
    let (log_tx, _) = broadcast::channel(100);
    setup_logging(
        level,
        EventCollector::new(vec![log_tx]),
        &cwd,
        config.log_file.clone(),
    );

    let manager = ProviderManager::new(&config, &cwd).await?;
    manager.initialize_all().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&manager.snapshot().await?)?
    );

    info!("clash-fleet is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    manager.destroy_all().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clash_fleet::Config;

    use super::check;

    #[tokio::test]
    async fn test_check_config() {
        let good: Config = r#"
proxies:
  - name: blocked
    type: reject
proxy-providers:
  local:
    type: file
    path: ./local.yaml
"#
        .parse()
        .unwrap();
        check(&good, "/tmp").await.unwrap();

        let unknown_kind: Config = "proxies:\n  - {name: x, type: warp}\n".parse().unwrap();
        assert!(check(&unknown_kind, "/tmp").await.is_err());

        let reserved: Config = r#"
proxy-providers:
  default:
    type: file
    path: ./default.yaml
"#
        .parse()
        .unwrap();
        assert!(check(&reserved, "/tmp").await.is_err());

        let bad_provider: Config = r#"
proxy-providers:
  remote:
    type: http
    path: ./remote.yaml
"#
        .parse()
        .unwrap();
        assert!(check(&bad_provider, "/tmp").await.is_err());
    }
}
