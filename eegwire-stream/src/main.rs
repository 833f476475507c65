use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eegwire_stream::{
    Config, CsvSink, FrameSink, HostClock, LogSink, MockSource, NotificationSource, SinkConfig,
    SourceConfig, StreamSetup, StreamState, TcpSource, run_stream,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "eegwire")]
#[command(about = "Decode and time-align Muse headset notifications")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "eegwire.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,eegwire_stream=info,eegwire_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    let setup = StreamSetup {
        groups: config.group_specs(),
        control: config.control_source(),
        options: config.pipeline_options(),
        idle_timeout: config.idle_timeout(),
        channel_capacity: config.stream.channel_capacity,
    };

    info!(
        groups = ?setup.groups.iter().map(|spec| spec.id).collect::<Vec<_>>(),
        control = ?setup.control,
        resync = ?setup.options.resync,
        "Starting eegwire"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            signal_cancel.cancel();
        }
    });

    let clock = HostClock::new();

    match config.source {
        SourceConfig::Mock {
            jitter_ms,
            drop_probability,
        } => {
            info!(jitter_ms, drop_probability, "Using mock notification source");
            let source = MockSource::new(
                setup.groups.clone(),
                setup.control,
                jitter_ms,
                drop_probability,
                clock,
            );
            with_sink(source, &config.sink, setup, cancel).await?;
        }
        SourceConfig::Tcp { addr } => {
            info!(%addr, "Using TCP notification source");
            let source = TcpSource::new(addr, clock);
            with_sink(source, &config.sink, setup, cancel).await?;
        }
    }

    info!("eegwire shut down complete");
    Ok(())
}

async fn with_sink<N: NotificationSource>(
    source: N,
    sink: &SinkConfig,
    setup: StreamSetup,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    match sink {
        SinkConfig::Log => {
            info!("Logging frames");
            stream(source, LogSink, setup, cancel).await
        }
        SinkConfig::Csv { dir } => {
            info!(dir = ?dir, "Recording frames to CSV");
            let sink = CsvSink::create(dir, &setup.groups)?;
            stream(source, sink, setup, cancel).await
        }
    }
}

async fn stream<N: NotificationSource, S: FrameSink>(
    source: N,
    sink: S,
    setup: StreamSetup,
    cancel: CancellationToken,
) -> color_eyre::Result<()> {
    let stats = run_stream(source, Arc::new(sink), setup, StreamState::new(), cancel).await?;

    if let Some(reading) = stats.last_telemetry {
        info!(
            battery = reading.battery,
            temperature = reading.temperature,
            "Last telemetry"
        );
    }
    info!(
        uptime_secs = stats.uptime.as_secs_f64(),
        control_messages = stats.control_messages,
        "Session summary"
    );
    Ok(())
}
