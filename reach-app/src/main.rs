mod app;
mod cli;
mod participant;

use anyhow::{Context, Result};
use clap::Parser;
use reach_experiment::{JsonFileSink, ProtocolConfig};
use tracing_subscriber::EnvFilter;

use app::App;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => ProtocolConfig::load(path)
            .with_context(|| format!("loading protocol config {}", path.display()))?,
        None => ProtocolConfig::default(),
    };

    match cli.command {
        Commands::Run {
            participant,
            seed,
            output,
            realtime,
            jnd,
            abort_after,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            tracing::info!(%participant, seed, realtime, output = %output.display(), "starting session");
            let options = app::RunOptions {
                participant,
                seed,
                jnd,
                abort_after,
            };
            let sink = JsonFileSink::open(&output, config.upload_set_size)
                .with_context(|| format!("opening records file {}", output.display()))?;
            if realtime {
                App::new(config, options, reach_timing::HighPrecisionClock::new(), sink)?.run()
            } else {
                App::new(config, options, reach_timing::ManualClock::new(0), sink)?.run()
            }
        }
        Commands::InitConfig { output } => {
            config
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(path = %output.display(), "protocol config written");
            Ok(())
        }
        Commands::Summary { input } => {
            let sink = JsonFileSink::open(&input, config.upload_set_size)
                .with_context(|| format!("opening records file {}", input.display()))?;
            app::print_summary(sink.records());
            Ok(())
        }
    }
}
