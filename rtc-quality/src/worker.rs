//! Background thread driving a [`MediaQualityAnalyzer`].
//!
//! The media path talks to the worker through cheap [`AnalyzerHandle`]s that
//! only append to a queue. The worker drains the queue on a fixed cadence,
//! runs the analyzer's tick and hands notifications and reports to a
//! [`QualityListener`] outside of any lock.

use bytes::Bytes;
use log::{debug, info, trace, warn};
use media::packet::{QualitySample, RtpStatus};
use media::reporter::RxStatusReporter;
use rtcp::extended_report::XrBlockTypes;
use sansio::Protocol;
use shared::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::analyzer::call_quality::CallQuality;
use crate::analyzer::config::{AnalyzerConfig, MediaQualityThreshold};
use crate::analyzer::status::MediaQualityStatus;
use crate::analyzer::{AnalyzerEvent, MediaQualityAnalyzer, OptionalInfo, QualityNotification};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Receiver of analyzer output. Called from the worker thread.
pub trait QualityListener: Send + Sync {
    fn on_call_quality(&self, quality: &CallQuality);

    fn on_media_quality_status(&self, status: &MediaQualityStatus);

    /// A report built for [`AnalyzerHandle::request_report`].
    fn on_rtcp_xr_report(&self, _report: Bytes, _block_types: XrBlockTypes) {}
}

enum Command {
    Event(AnalyzerEvent),
    Report(XrBlockTypes),
}

#[derive(Default)]
struct QueueState {
    commands: VecDeque<Command>,
    running: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    wakeup: Condvar,
    core: Mutex<MediaQualityAnalyzer>,
    exited: Mutex<bool>,
    exited_cv: Condvar,
    listener: Arc<dyn QualityListener>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Output {
    notifications: Vec<QualityNotification>,
    reports: Vec<(Bytes, XrBlockTypes)>,
}

impl Shared {
    fn apply(core: &mut MediaQualityAnalyzer, commands: Vec<Command>, output: &mut Output) {
        for command in commands {
            match command {
                Command::Event(event) => {
                    if let Err(err) = core.handle_read(event) {
                        warn!("failed to handle {event:?}: {err}");
                    }
                }
                Command::Report(block_types) => match core.handle_write(block_types) {
                    Ok(()) => {
                        while let Some(report) = core.poll_write() {
                            output.reports.push((report, block_types));
                        }
                    }
                    Err(err) => warn!("report {block_types:?} failed: {err}"),
                },
            }
        }
    }

    fn drain(core: &mut MediaQualityAnalyzer, output: &mut Output) {
        while let Some(notification) = core.poll_read() {
            output.notifications.push(notification);
        }
    }

    /// One worker iteration: queued commands, then the tick.
    fn process(&self, commands: Vec<Command>, now: Instant) {
        let mut output = Output::default();
        {
            let mut core = lock(&self.core);
            Self::apply(&mut core, commands, &mut output);
            if let Err(err) = core.handle_timeout(now) {
                warn!("analyzer tick failed: {err}");
            }
            Self::drain(&mut core, &mut output);
        }
        self.dispatch(output);
    }

    /// Applies whatever is still queued, emits the final call quality and
    /// resets the analyzer.
    fn flush(&self) {
        let commands: Vec<Command> = lock(&self.queue).commands.drain(..).collect();
        let mut output = Output::default();
        {
            let mut core = lock(&self.core);
            Self::apply(&mut core, commands, &mut output);
            if let Err(err) = core.close() {
                warn!("analyzer close failed: {err}");
            }
            Self::drain(&mut core, &mut output);
        }
        self.dispatch(output);
    }

    fn dispatch(&self, output: Output) {
        for notification in output.notifications {
            match notification {
                QualityNotification::CallQuality(quality) => {
                    self.listener.on_call_quality(&quality)
                }
                QualityNotification::MediaQualityStatus(status) => {
                    self.listener.on_media_quality_status(&status)
                }
            }
        }
        for (report, block_types) in output.reports {
            self.listener.on_rtcp_xr_report(report, block_types);
        }
    }

    fn run(self: Arc<Self>, poll_interval: Duration) {
        debug!("analyzer thread started");
        loop {
            let commands: Vec<Command> = {
                let queue = lock(&self.queue);
                if !queue.running {
                    break;
                }
                let (mut queue, _) = self
                    .wakeup
                    .wait_timeout_while(queue, poll_interval, |q| {
                        q.running && q.commands.is_empty()
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                if !queue.running {
                    break;
                }
                queue.commands.drain(..).collect()
            };
            self.process(commands, Instant::now());
        }

        *lock(&self.exited) = true;
        self.exited_cv.notify_all();
        debug!("analyzer thread exited");
    }
}

/// Owns the analyzer thread.
///
/// ```ignore
/// let mut worker = AnalyzerWorker::new(analyzer, listener);
/// let handle = worker.handle();
/// worker.start()?;
/// handle.send(AnalyzerEvent::RtcpReceived)?;
/// worker.stop()?;
/// ```
pub struct AnalyzerWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl fmt::Debug for AnalyzerWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerWorker")
            .field("running", &self.is_running())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl AnalyzerWorker {
    pub fn new(analyzer: MediaQualityAnalyzer, listener: Arc<dyn QualityListener>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState::default()),
                wakeup: Condvar::new(),
                core: Mutex::new(analyzer),
                exited: Mutex::new(true),
                exited_cv: Condvar::new(),
                listener,
            }),
            thread: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often the thread drains its queue and checks the tick deadline.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn handle(&self) -> AnalyzerHandle {
        AnalyzerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.queue).running
    }

    pub fn start(&mut self) -> Result<()> {
        {
            let mut queue = self.shared.queue.lock()?;
            if queue.running {
                return Err(Error::ErrAnalyzerAlreadyRunning);
            }
            queue.running = true;
        }
        *self.shared.exited.lock()? = false;
        self.shared.core.lock()?.start(Instant::now());

        let shared = Arc::clone(&self.shared);
        let poll_interval = self.poll_interval;
        let spawned = thread::Builder::new()
            .name("media-quality".to_owned())
            .spawn(move || shared.run(poll_interval));

        match spawned {
            Ok(thread) => {
                self.thread = Some(thread);
                info!("analyzer started");
                Ok(())
            }
            Err(err) => {
                lock(&self.shared.queue).running = false;
                *lock(&self.shared.exited) = true;
                Err(err.into())
            }
        }
    }

    /// Stops the thread, waiting up to one second for it to exit, then emits
    /// the final call quality and resets the analyzer.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut queue = self.shared.queue.lock()?;
            if !queue.running {
                return Ok(());
            }
            queue.running = false;
        }
        self.shared.wakeup.notify_all();

        let exited = {
            let guard = lock(&self.shared.exited);
            let (guard, _) = self
                .shared
                .exited_cv
                .wait_timeout_while(guard, STOP_TIMEOUT, |exited| !*exited)
                .unwrap_or_else(PoisonError::into_inner);
            *guard
        };

        if let Some(thread) = self.thread.take() {
            if exited {
                if thread.join().is_err() {
                    warn!("analyzer thread panicked");
                }
            } else {
                warn!("analyzer thread did not exit within {STOP_TIMEOUT:?}, detaching");
            }
        }

        self.shared.flush();
        info!("analyzer stopped");
        Ok(())
    }

    pub fn set_config(&self, config: AnalyzerConfig) -> Result<()> {
        self.shared.core.lock()?.set_config(config);
        Ok(())
    }

    pub fn set_threshold(&self, threshold: MediaQualityThreshold) -> Result<()> {
        self.shared.core.lock()?.set_threshold(threshold);
        Ok(())
    }

    pub fn call_quality(&self) -> Result<CallQuality> {
        Ok(self.shared.core.lock()?.call_quality())
    }
}

impl Drop for AnalyzerWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("failed to stop analyzer: {err}");
        }
    }
}

/// Producer side of an [`AnalyzerWorker`]. Cheap to clone and safe to call
/// from the media thread.
#[derive(Clone)]
pub struct AnalyzerHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for AnalyzerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerHandle").finish_non_exhaustive()
    }
}

impl AnalyzerHandle {
    /// Queues an event. Fails with `ErrAnalyzerStopped` when the worker is not
    /// running.
    pub fn send(&self, event: AnalyzerEvent) -> Result<()> {
        self.push(Command::Event(event))
    }

    /// Queues an RTCP XR report; the result is delivered to
    /// [`QualityListener::on_rtcp_xr_report`].
    pub fn request_report(&self, block_types: XrBlockTypes) -> Result<()> {
        if block_types.is_empty() {
            return Err(Error::ErrNoReportBlockRequested);
        }
        self.push(Command::Report(block_types))
    }

    fn push(&self, command: Command) -> Result<()> {
        let mut queue = self.shared.queue.lock()?;
        if !queue.running {
            return Err(Error::ErrAnalyzerStopped);
        }
        queue.commands.push_back(command);
        drop(queue);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn post(&self, event: AnalyzerEvent) {
        if let Err(err) = self.send(event) {
            trace!("dropped {event:?}: {err}");
        }
    }
}

impl RxStatusReporter for AnalyzerHandle {
    fn collect_packet(&self, sample: QualitySample) {
        self.post(AnalyzerEvent::RtpReceived(sample));
    }

    fn collect_rx_status(&self, seq: u16, status: RtpStatus, time: u32) {
        self.post(AnalyzerEvent::RxStatus { seq, status, time });
    }

    fn collect_loss_gap(&self, seq: u16, count: u32, time: u32) {
        self.post(AnalyzerEvent::Optional(OptionalInfo::PacketLossGap {
            seq,
            count,
            time,
        }));
    }

    fn collect_buffer_size(&self, current: u32, max: u32) {
        self.post(AnalyzerEvent::BufferSize { current, max });
    }
}
