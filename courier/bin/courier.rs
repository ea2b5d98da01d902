//! Runs one notification batch.
//!
//! The configuration is a RON document (see `courier_delivery::config`). A
//! separate queue file, also RON, can supply the messages to send; they are
//! appended to any `emails` listed in the configuration itself.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use courier_common::{log_sink::TracingLogSink, logging};
use courier_delivery::{Configuration, MessageQueueEntity, execute};

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Send queued email through the configured SMTP relay
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version)]
struct Cli {
    /// Configuration file, instead of searching the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RON file holding a list of queued messages
    #[arg(short, long)]
    queue: Option<PathBuf>,

    /// Write the processed queue here as RON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let mut config = Configuration::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_log_sink(Arc::new(TracingLogSink));

    if let Some(queue) = &cli.queue {
        config.emails.extend(load_queue(queue)?);
    }

    let result = execute(&config).await;

    println!(
        "sent: {}, test emails: {}, failed: {}",
        result.email_sent(),
        result.test_emails(),
        result.failed().count()
    );

    if let Some(output) = &cli.output {
        let rendered = ron::ser::to_string_pretty(&result.emails, ron::ser::PrettyConfig::default())?;
        std::fs::write(output, rendered)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    }

    if !result.is_success {
        anyhow::bail!("The batch did not complete");
    }

    Ok(())
}

fn load_queue(path: &Path) -> anyhow::Result<Vec<MessageQueueEntity>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read queue from {}", path.display()))?;

    ron::from_str(&content).with_context(|| format!("Invalid queue file {}", path.display()))
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - COURIER_CONFIG environment variable\n{paths_tried}"
    )
}
