//! Acquire binary - runs an emulated TTTR acquisition session
//!
//! Usage:
//!   cargo run --bin acquire -- --config config.toml
//!   cargo run --bin acquire -- --mode T3 --duration-ms 500 --streams 2

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tttr_daq::acquisition::{run_streams, Stream, StreamConfig};
use tttr_daq::common::{setup_shutdown, AcquireArgs};
use tttr_daq::config::{Config, StreamFileConfig};
use tttr_daq::decoder::RecordMode;
use tttr_daq::device::Emulator;
use tttr_daq::sink::{Dispatcher, HistogramSink, RawSink, TextSink};

fn build_dispatcher(
    config: &Config,
    stream: &StreamFileConfig,
    output_dir: &Path,
) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();
    let mode = config.acquisition.mode;

    if !stream.text_output.is_empty() {
        let sink = TextSink::create(
            output_dir.join(&stream.text_output),
            mode,
            stream.resolution_ps,
            stream.sync_period_s,
        )?;
        dispatcher.register(Box::new(sink));
    }
    if !stream.raw_output.is_empty() {
        dispatcher.register(Box::new(RawSink::create(
            output_dir.join(&stream.raw_output),
        )?));
    }
    if !stream.histogram_output.is_empty() {
        dispatcher.register(Box::new(HistogramSink::create(
            output_dir.join(&stream.histogram_output),
            stream.channels as usize,
        )?));
    }
    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tttr_daq=info".parse()?))
        .init();

    let args = AcquireArgs::parse();

    let mut config = if Path::new(&args.config_file).exists() {
        Config::load(&args.config_file)?
    } else {
        info!(config = %args.config_file, "config file not found, using defaults");
        Config::default()
    };

    // CLI overrides
    if let Some(duration_ms) = args.duration_ms {
        config.acquisition.duration_ms = duration_ms;
    }
    if let Some(mode) = &args.mode {
        config.acquisition.mode = match mode.to_uppercase().as_str() {
            "T2" => RecordMode::T2,
            "T3" => RecordMode::T3,
            other => anyhow::bail!("unknown record mode: {other}"),
        };
    }
    if let Some(n) = args.streams {
        config.streams = (0..n as u32)
            .map(|id| StreamFileConfig {
                id,
                text_output: format!("stream{id}.out"),
                ..StreamFileConfig::default()
            })
            .collect();
    }
    if config.streams.is_empty() {
        config.streams.push(StreamFileConfig::default());
    }

    let output_dir = PathBuf::from(args.output_dir.unwrap_or_else(|| ".".to_string()));
    std::fs::create_dir_all(&output_dir)?;

    let duration = Duration::from_millis(config.acquisition.duration_ms);
    let mut streams = Vec::new();
    for stream_cfg in &config.streams {
        let device = Emulator::new(config.emulator_config(stream_cfg));
        let dispatcher = build_dispatcher(&config, stream_cfg, &output_dir)?;
        let stream_config = StreamConfig {
            id: stream_cfg.id,
            mode: config.acquisition.mode,
            duration,
            read_max: config.acquisition.read_max,
            drain_rounds: config.acquisition.drain_rounds,
            drain_policy: config.acquisition.drain_policy,
        };
        streams.push(Stream::new(stream_config, device, dispatcher));
    }

    info!(
        mode = %config.acquisition.mode,
        streams = streams.len(),
        duration_ms = config.acquisition.duration_ms,
        "starting acquisition"
    );

    let (_shutdown_tx, shutdown_rx) = setup_shutdown();
    let summaries = run_streams(streams, shutdown_rx).await?;

    for summary in &summaries {
        info!(
            stream = summary.id,
            records = summary.records_processed,
            events = summary.events_dispatched,
            overflows = summary.overflows_absorbed,
            "session complete"
        );
    }
    Ok(())
}
