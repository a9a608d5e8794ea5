use anyhow::Result;
use clap::Parser;
use incallui::config::{Cli, Config};
use incallui::presentation::{NotificationDriver, ScreenDriver};
use incallui::simulator::{self, LogSink, Scenario, ScriptedBackend};
use incallui::{InCallUi, ServiceState};
use std::fs::File;
use std::sync::Arc;
use tokio::select;
use tracing::{info, level_filters::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli
        .conf
        .map(|conf| Config::load(&conf).expect("Failed to load config"))
        .unwrap_or_default();

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    let _guard = if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file).expect("Failed to create log file");
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
        Some(guard)
    } else {
        log_fmt.try_init().ok();
        None
    };

    let scenario = match cli.scenario {
        Some(path) => Scenario::load(&path)?,
        None => {
            info!("no scenario given, nothing to replay");
            return Ok(());
        }
    };

    let config = Arc::new(config);
    let backend = Arc::new(ScriptedBackend::new());
    let sink = Arc::new(LogSink);
    let ui = InCallUi::new(
        backend.clone(),
        config.clone(),
        ScreenDriver::new(sink.clone(), sink.clone(), sink.clone(), &config.screen),
        NotificationDriver::new(sink),
    );

    info!(steps = scenario.steps.len(), "replaying scenario");
    select! {
        result = simulator::replay(&scenario, &backend, &ui) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down");
        }
    }
    ui.on_service_state_changed(ServiceState::Stopped).await?;
    Ok(())
}
