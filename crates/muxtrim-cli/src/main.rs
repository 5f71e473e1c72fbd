//! muxtrim - trimmed Microsoft.UI.Xaml packages

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use muxtrim_cli::Cli;
use muxtrim_cli::ui::{ConsoleOutput, prompt_version};
use muxtrim_core::tools::Toolchain;
use muxtrim_core::trim::MakePri;
use muxtrim_core::{Pipeline, Reporter, TrimConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config =
        TrimConfig::discover(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    debug!(?config, "effective configuration");

    let output = Arc::new(ConsoleOutput::new());

    output.section("Locating tools");
    let toolchain = Toolchain::discover(&config.tools).context("Failed to locate build tools")?;
    output.success(&format!("makepri: {}", toolchain.makepri.display()));
    if let Some(msbuild) = &toolchain.msbuild {
        output.success(&format!("msbuild: {}", msbuild.display()));
    }

    let tool = MakePri::new(toolchain.makepri.clone());
    let pipeline = Pipeline::new(config, Arc::clone(&output), tool);

    let version = match pipeline.config().version.clone() {
        Some(version) => version,
        None => {
            let versions = pipeline.versions().await;
            if !versions.from_network {
                output.warning("Package index unavailable; offering the fallback version");
            }
            let default = versions
                .latest()
                .unwrap_or(pipeline.config().fallback_version.as_str())
                .to_string();

            if cli.yes {
                default
            } else {
                prompt_version(
                    io::stdin().lock(),
                    io::stdout(),
                    &pipeline.config().package_id,
                    &default,
                )
                .context("Failed to read version")?
            }
        }
    };

    let report = match pipeline.run(&version).await {
        Ok(report) => report,
        Err(e) => {
            output.error(&format!("Trimming {version} failed"));
            return Err(anyhow::Error::new(e).context("Failed to build trimmed package"));
        }
    };

    let stats = report.total_stats();
    output.info(&format!(
        "{} index files, {} resources blanked, {} already blank",
        report.trimmed.len(),
        stats.blanked,
        stats.already_blank
    ));
    output.info(&format!("sha256 {}", report.output.sha256));

    Ok(())
}
