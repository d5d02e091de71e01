//! Acquisition loop and multi-stream coordination
//!
//! One [`Stream`] drives one hardware stream through its session state
//! machine (Idle, Armed, Running, Draining, Stopped), pulling record batches
//! from the device and pushing every record through decode, overflow
//! correction and sink dispatch, in batch order.
//!
//! Multi-stream operation runs one blocking worker per stream; each stream
//! owns its overflow accumulator, retry counter and sink set, so workers
//! share nothing. Per-stream event order is preserved; no ordering is
//! guaranteed across streams.

use crate::common::error::{AcquisitionError, AcquisitionResult};
use crate::common::ShutdownReceiver;
use crate::decoder::{correct, decode, OverflowState, RecordMode};
use crate::device::Device;
use crate::sink::Dispatcher;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extra empty-poll rounds granted after the acquisition time has elapsed,
/// because records may still be queued in hardware
pub const DRAIN_ROUNDS: u32 = 6;

/// Backoff between polls while the FIFO is empty and the acquisition time
/// has not yet elapsed, to avoid busy-spinning the transport
const POLL_BACKOFF: Duration = Duration::from_millis(1);

/// What happens to the drain retry counter when a non-empty batch arrives
/// mid-drain. The instrument vendor's reference loop never resets it once
/// incremented (`Fixed`); `ResetOnData` grants a fresh budget after every
/// partial drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrainPolicy {
    Fixed,
    ResetOnData,
}

/// Session state of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Armed,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Idle => "Idle",
            StreamState::Armed => "Armed",
            StreamState::Running => "Running",
            StreamState::Draining => "Draining",
            StreamState::Stopped => "Stopped",
        };
        write!(f, "{}", s)
    }
}

/// Per-stream acquisition settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub id: u32,
    pub mode: RecordMode,
    /// Requested acquisition duration, passed to the device on start
    pub duration: Duration,
    /// Records requested per FIFO read
    pub read_max: usize,
    pub drain_rounds: u32,
    pub drain_policy: DrainPolicy,
}

/// Counters for progress reporting (not used for correctness)
#[derive(Debug, Default)]
pub struct StreamMetrics {
    pub records_processed: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub overflows_absorbed: AtomicU64,
    pub batches_read: AtomicU64,
}

/// Final per-stream counters returned when a stream reaches Stopped
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub id: u32,
    pub records_processed: u64,
    pub events_dispatched: u64,
    pub overflows_absorbed: u64,
    pub batches_read: u64,
    /// True when the session ended on an external stop request rather than
    /// by draining out
    pub cancelled: bool,
}

/// One acquisition stream: device, decode state and sinks, driven through
/// the session state machine
pub struct Stream<D: Device> {
    config: StreamConfig,
    device: D,
    dispatcher: Dispatcher,
    overflow: OverflowState,
    state: StreamState,
    retry: u32,
    cancelled: bool,
    metrics: Arc<StreamMetrics>,
}

impl<D: Device> Stream<D> {
    pub fn new(config: StreamConfig, device: D, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            device,
            dispatcher,
            overflow: OverflowState::new(),
            state: StreamState::Idle,
            retry: 0,
            cancelled: false,
            metrics: Arc::new(StreamMetrics::default()),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        self.metrics.clone()
    }

    /// Run the full session to completion.
    ///
    /// The stop signal is checked at the top of every loop iteration; setting
    /// it causes an orderly transition to Stopped with no loss of
    /// already-decoded events. On every exit path, error or not, the device
    /// receives exactly one stop signal and the sinks are finalized.
    pub fn run(&mut self, stop: &AtomicBool) -> AcquisitionResult<StreamSummary> {
        let result = self.acquire(stop);

        self.state = StreamState::Stopped;
        let stop_result = self.device.stop_acquisition();
        let finish_result = self.dispatcher.finish();

        if let Err(e) = &result {
            if let Err(stop_err) = &stop_result {
                warn!(stream = self.config.id, error = %stop_err, "stop failed during cleanup");
            }
            if let Err(finish_err) = &finish_result {
                warn!(stream = self.config.id, error = %finish_err, "sink finalize failed during cleanup");
            }
            error!(stream = self.config.id, error = %e, "stream stopped on error");
        }
        result?;
        stop_result?;
        finish_result?;

        let summary = StreamSummary {
            id: self.config.id,
            records_processed: self.metrics.records_processed.load(Ordering::Relaxed),
            events_dispatched: self.metrics.events_dispatched.load(Ordering::Relaxed),
            overflows_absorbed: self.metrics.overflows_absorbed.load(Ordering::Relaxed),
            batches_read: self.metrics.batches_read.load(Ordering::Relaxed),
            cancelled: self.cancelled,
        };
        info!(
            stream = summary.id,
            records = summary.records_processed,
            events = summary.events_dispatched,
            overflows = summary.overflows_absorbed,
            cancelled = summary.cancelled,
            "stream stopped"
        );
        Ok(summary)
    }

    fn acquire(&mut self, stop: &AtomicBool) -> AcquisitionResult<()> {
        // Idle -> Armed: fresh session state
        self.overflow.reset();
        self.state = StreamState::Armed;

        // Armed -> Running: start signal with the requested duration
        self.device.start_acquisition(self.config.duration)?;
        self.retry = 0;
        self.state = StreamState::Running;
        info!(
            stream = self.config.id,
            mode = %self.config.mode,
            duration_ms = self.config.duration.as_millis() as u64,
            "acquisition started"
        );

        loop {
            if stop.load(Ordering::Relaxed) {
                info!(stream = self.config.id, "stop requested");
                self.cancelled = true;
                return Ok(());
            }

            let flags = self.device.poll_status()?;
            if flags.fifo_overrun {
                return Err(AcquisitionError::Overrun);
            }

            let batch = self.device.read_batch(self.config.read_max)?;
            if !batch.is_empty() {
                self.process_batch(batch.records())?;
                if self.state == StreamState::Draining
                    && self.config.drain_policy == DrainPolicy::ResetOnData
                {
                    self.retry = 0;
                }
                continue;
            }

            if !flags.acquisition_time_elapsed {
                // FIFO empty but the measurement is still running
                std::thread::sleep(POLL_BACKOFF);
                continue;
            }

            if self.state == StreamState::Running {
                debug!(stream = self.config.id, "acquisition time elapsed, draining");
                self.state = StreamState::Draining;
            }
            self.retry += 1;
            if self.retry >= self.config.drain_rounds {
                debug!(stream = self.config.id, "drain budget exhausted, done");
                return Ok(());
            }
        }
    }

    /// Decode, correct and dispatch every record of one batch, in order
    fn process_batch(&mut self, records: &[u32]) -> AcquisitionResult<()> {
        self.dispatcher.dispatch_batch(records)?;

        for &raw in records {
            let fields = decode(raw, self.config.mode);
            if fields.is_overflow() {
                self.metrics.overflows_absorbed.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(event) = correct(&mut self.overflow, fields) {
                self.dispatcher.dispatch(&event)?;
                self.metrics.events_dispatched.fetch_add(1, Ordering::Relaxed);
            }
            self.metrics.records_processed.fetch_add(1, Ordering::Relaxed);
        }

        self.metrics.batches_read.fetch_add(1, Ordering::Relaxed);
        debug!(
            stream = self.config.id,
            records = records.len(),
            total = self.metrics.records_processed.load(Ordering::Relaxed),
            "batch processed"
        );
        Ok(())
    }
}

/// Run several independent streams to completion, one blocking worker each.
///
/// Global completion requires every stream to have reached Stopped; the
/// first stream error is returned after all workers have finished their own
/// cleanup. The shutdown receiver fans out to every worker through a shared
/// stop flag.
pub async fn run_streams<D>(
    streams: Vec<Stream<D>>,
    mut shutdown: ShutdownReceiver,
) -> AcquisitionResult<Vec<StreamSummary>>
where
    D: Device + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));

    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        stop_on_signal.store(true, Ordering::Relaxed);
    });

    let handles: Vec<_> = streams
        .into_iter()
        .map(|mut stream| {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || stream.run(&stop))
        })
        .collect();

    let mut summaries = Vec::new();
    let mut first_err = None;
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(join_err) => {
                error!(error = %join_err, "stream worker panicked");
                if first_err.is_none() {
                    first_err =
                        Some(AcquisitionError::config(format!("stream worker panicked: {join_err}")));
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(summaries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::encode_t2;
    use crate::device::{DeviceError, RecordBatch, StatusFlags};
    use crate::sink::{EventSink, SinkError};
    use std::sync::Mutex;

    /// Scripted device: serves a fixed sequence of poll/read outcomes
    struct Scripted {
        batches: Vec<Vec<u32>>,
        elapsed_after_batches: usize,
        reads: usize,
        started: bool,
        stops: Arc<AtomicU64>,
        overrun_at_read: Option<usize>,
        fail_read_at: Option<usize>,
    }

    impl Scripted {
        fn new(batches: Vec<Vec<u32>>) -> Self {
            let elapsed_after_batches = batches.len();
            Self {
                batches,
                elapsed_after_batches,
                reads: 0,
                started: false,
                stops: Arc::new(AtomicU64::new(0)),
                overrun_at_read: None,
                fail_read_at: None,
            }
        }
    }

    impl Device for Scripted {
        fn start_acquisition(&mut self, _duration: Duration) -> Result<(), DeviceError> {
            self.started = true;
            Ok(())
        }

        fn read_batch(&mut self, _max: usize) -> Result<RecordBatch, DeviceError> {
            if let Some(n) = self.fail_read_at {
                if self.reads >= n {
                    return Err(DeviceError::new(-15, "communication error"));
                }
            }
            let batch = if self.reads < self.batches.len() {
                RecordBatch::from_records(self.batches[self.reads].clone())
            } else {
                RecordBatch::new()
            };
            self.reads += 1;
            Ok(batch)
        }

        fn poll_status(&mut self) -> Result<StatusFlags, DeviceError> {
            Ok(StatusFlags {
                fifo_overrun: matches!(self.overrun_at_read, Some(n) if self.reads >= n),
                acquisition_time_elapsed: self.reads >= self.elapsed_after_batches,
            })
        }

        fn stop_acquisition(&mut self) -> Result<(), DeviceError> {
            self.stops.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct CollectSink {
        times: Arc<Mutex<Vec<u64>>>,
    }

    impl EventSink for CollectSink {
        fn on_event(&mut self, event: &crate::decoder::DecodedEvent) -> Result<(), SinkError> {
            self.times.lock().unwrap().push(event.time);
            Ok(())
        }
    }

    fn t2_config() -> StreamConfig {
        StreamConfig {
            id: 0,
            mode: RecordMode::T2,
            duration: Duration::from_millis(10),
            read_max: 1024,
            drain_rounds: DRAIN_ROUNDS,
            drain_policy: DrainPolicy::Fixed,
        }
    }

    #[test]
    fn test_stream_runs_to_stopped() {
        let device = Scripted::new(vec![
            vec![encode_t2(10, 0, false), encode_t2(20, 1, false)],
            vec![encode_t2(30, 2, false)],
        ]);
        let stops = device.stops.clone();

        let times = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(CollectSink {
            times: times.clone(),
        }));

        let mut stream = Stream::new(t2_config(), device, dispatcher);
        let stop = AtomicBool::new(false);
        let summary = stream.run(&stop).unwrap();

        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(summary.records_processed, 3);
        assert_eq!(summary.events_dispatched, 3);
        assert_eq!(*times.lock().unwrap(), vec![10, 20, 30]);
        assert_eq!(stops.load(Ordering::Relaxed), 1, "stop issued exactly once");
    }

    #[test]
    fn test_overrun_is_fatal_but_cleaned_up() {
        let mut device = Scripted::new(vec![vec![encode_t2(10, 0, false)]]);
        device.overrun_at_read = Some(1);
        let stops = device.stops.clone();

        let mut stream = Stream::new(t2_config(), device, Dispatcher::new());
        let stop = AtomicBool::new(false);
        let err = stream.run(&stop).unwrap_err();
        assert!(matches!(err, AcquisitionError::Overrun));
        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_read_error_is_fatal_transport() {
        let mut device = Scripted::new(vec![]);
        device.fail_read_at = Some(0);
        let stops = device.stops.clone();

        let mut stream = Stream::new(t2_config(), device, Dispatcher::new());
        let stop = AtomicBool::new(false);
        let err = stream.run(&stop).unwrap_err();
        assert!(matches!(err, AcquisitionError::Transport(_)));
        assert_eq!(stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stop_request_is_orderly() {
        let device = Scripted::new(vec![]);
        let stops = device.stops.clone();
        let mut stream = Stream::new(t2_config(), device, Dispatcher::new());
        let stop = AtomicBool::new(true);
        let summary = stream.run(&stop).unwrap();
        assert!(summary.cancelled);
        assert_eq!(stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_empty_stream_drains_and_stops() {
        let device = Scripted::new(vec![]);
        let mut stream = Stream::new(t2_config(), device, Dispatcher::new());
        let stop = AtomicBool::new(false);
        let summary = stream.run(&stop).unwrap();
        assert!(!summary.cancelled);
        assert_eq!(summary.records_processed, 0);
        assert_eq!(stream.state(), StreamState::Stopped);
    }

    #[tokio::test]
    async fn test_run_streams_all_stop() {
        let (_tx, rx) = tokio::sync::broadcast::channel(1);
        let streams: Vec<Stream<Scripted>> = (0..3)
            .map(|id| {
                let device = Scripted::new(vec![vec![encode_t2(id as u32 + 1, 0, false)]]);
                let config = StreamConfig {
                    id,
                    ..t2_config()
                };
                Stream::new(config, device, Dispatcher::new())
            })
            .collect();

        let summaries = run_streams(streams, rx).await.unwrap();
        assert_eq!(summaries.len(), 3);
        for summary in &summaries {
            assert_eq!(summary.records_processed, 1);
        }
    }
}
