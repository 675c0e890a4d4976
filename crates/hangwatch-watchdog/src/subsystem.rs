//! Subsystem initialization, allocation and teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hangwatch_eventlog::{DebugFlag, DebuggerHook, EventLog, NoDebugger};
use hangwatch_report::{
    DebugReportPipeline, DeviceId, DirectorySink, QueueStats, QueuedSink, ReportSink,
};
use hangwatch_timer::{DispatchMetrics, DispatcherConfig, TimerDispatcher};

use crate::clock::{ExecutionClock, TimeBasis, WallClock};
use crate::config::SubsystemConfig;
use crate::deadline::DeadlineWatchdog;
use crate::device::DeviceRegistry;
use crate::error::WatchdogResult;
use crate::object::{ObjectCore, Runtime, WatchdogKind};
use crate::progress::ProgressWatchdog;
use crate::watchdog::Watchdog;

/// Owns the timer dispatcher, event log, report pipeline and device registry
/// shared by every watchdog it allocates.
///
/// Completed reports reach the configured sink through a [`QueuedSink`], so
/// a slow sink never delays the dispatcher thread.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use hangwatch_report::{DeviceId, MemorySink};
/// use hangwatch_watchdog::prelude::*;
///
/// let sink = Arc::new(MemorySink::new());
/// let subsystem = Subsystem::builder(SubsystemConfig::default())
///     .sink(sink.clone())
///     .build()?;
///
/// let watchdog = subsystem.allocate_deadline(DeviceId::new(1), TimeBasis::Full, 0x1234)?;
/// watchdog.start(Duration::from_secs(30), |_| {})?;
/// watchdog.stop(false)?;
/// assert!(watchdog.free()?);
/// subsystem.shutdown();
/// # Ok::<(), WatchdogError>(())
/// ```
pub struct Subsystem {
    runtime: Arc<Runtime>,
    dispatcher: TimerDispatcher,
    registry: DeviceRegistry,
    sink: Arc<QueuedSink>,
}

impl Subsystem {
    /// Create a subsystem with a directory report sink, no debugger and the
    /// wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the dispatcher
    /// thread cannot be started.
    pub fn new(config: SubsystemConfig) -> WatchdogResult<Self> {
        Self::builder(config).build()
    }

    /// Start building a subsystem.
    #[must_use]
    pub fn builder(config: SubsystemConfig) -> SubsystemBuilder {
        SubsystemBuilder {
            config,
            dispatcher: DispatcherConfig::default(),
            sink: None,
            debugger: None,
            clock: None,
        }
    }

    /// Allocate a deadline watchdog holding one reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::ResourceExhausted`] at the live object
    /// limit, or a timer error after shutdown.
    pub fn allocate_deadline(
        &self,
        device: DeviceId,
        time_basis: TimeBasis,
        owner_tag: u64,
    ) -> WatchdogResult<DeadlineWatchdog> {
        self.runtime.reserve_slot(WatchdogKind::Deadline)?;
        let core = ObjectCore::new(
            Arc::clone(&self.runtime),
            WatchdogKind::Deadline,
            device,
            time_basis,
            owner_tag,
        );
        DeadlineWatchdog::bind(core, &self.dispatcher)
    }

    /// Allocate a progress watchdog holding one reference.
    ///
    /// A non-reentrant watchdog rejects nested section entry on one thread.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::ResourceExhausted`] at the live object
    /// limit, or a timer error after shutdown.
    pub fn allocate_progress(
        &self,
        device: DeviceId,
        time_basis: TimeBasis,
        owner_tag: u64,
        reentrant: bool,
    ) -> WatchdogResult<ProgressWatchdog> {
        self.runtime.reserve_slot(WatchdogKind::Progress)?;
        let core = ObjectCore::new(
            Arc::clone(&self.runtime),
            WatchdogKind::Progress,
            device,
            time_basis,
            owner_tag,
        );
        ProgressWatchdog::bind(core, reentrant, &self.dispatcher)
    }

    /// Allocate a watchdog of `kind`. Progress watchdogs are non-reentrant.
    ///
    /// # Errors
    ///
    /// See [`Subsystem::allocate_deadline`].
    pub fn allocate(
        &self,
        kind: WatchdogKind,
        device: DeviceId,
        time_basis: TimeBasis,
        owner_tag: u64,
    ) -> WatchdogResult<Watchdog> {
        Ok(match kind {
            WatchdogKind::Deadline => self
                .allocate_deadline(device, time_basis, owner_tag)?
                .into(),
            WatchdogKind::Progress => self
                .allocate_progress(device, time_basis, owner_tag, false)?
                .into(),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SubsystemConfig {
        &self.runtime.config
    }

    /// Shared event log.
    #[must_use]
    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.runtime.log
    }

    /// Shared report pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<DebugReportPipeline> {
        &self.runtime.pipeline
    }

    /// Device stack registry.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Bottom of the device stack the watchdog's owning device belongs to.
    #[must_use]
    pub fn lowest_device(&self, watchdog: &Watchdog) -> DeviceId {
        self.registry.lowest_device(watchdog.device())
    }

    /// Whether a debugger is attached. `refresh` re-probes the hook.
    pub fn debugger_present(&self, refresh: bool) -> bool {
        self.runtime.log.debugger().is_present(refresh)
    }

    /// Whether a debug flag is enabled.
    #[must_use]
    pub fn debug_flag(&self, flag: DebugFlag) -> bool {
        self.runtime.log.debugger().query_flag(flag)
    }

    /// Number of watchdogs not yet released.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.runtime.live.load(Ordering::Acquire)
    }

    /// Timer dispatch counters.
    #[must_use]
    pub fn dispatch_metrics(&self) -> DispatchMetrics {
        self.dispatcher.metrics()
    }

    /// Wait until every completed report went through the sink.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn flush_reports(&self, timeout: Duration) -> bool {
        self.sink.flush(timeout)
    }

    /// Report delivery counters.
    #[must_use]
    pub fn sink_stats(&self) -> QueueStats {
        self.sink.stats()
    }

    /// Whether [`Subsystem::shutdown`] was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.dispatcher.is_shut_down()
    }

    /// Stop the dispatcher, then deliver the reports still queued for the
    /// sink. Pending timers never fire and arming fails afterwards.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.dispatcher.is_shut_down() {
            return;
        }
        let live = self.live_objects();
        if live > 0 {
            tracing::warn!(live, "watchdog subsystem shut down with live objects");
        }
        self.dispatcher.shutdown();
        self.sink.shutdown();
        tracing::info!("watchdog subsystem shut down");
    }
}

impl Drop for Subsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subsystem")
            .field("config", &self.runtime.config)
            .field("live_objects", &self.live_objects())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Subsystem`].
pub struct SubsystemBuilder {
    config: SubsystemConfig,
    dispatcher: DispatcherConfig,
    sink: Option<Arc<dyn ReportSink>>,
    debugger: Option<Arc<dyn DebuggerHook>>,
    clock: Option<Arc<dyn ExecutionClock>>,
}

impl SubsystemBuilder {
    /// Set where completed reports are delivered. Delivery runs on a
    /// separate worker thread.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register the debugger integration.
    #[must_use]
    pub fn debugger(mut self, hook: Arc<dyn DebuggerHook>) -> Self {
        self.debugger = Some(hook);
        self
    }

    /// Set the execution time source for starvation checks.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn ExecutionClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the timer dispatcher configuration.
    #[must_use]
    pub fn dispatcher(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    /// Validate the configuration and start the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the dispatcher
    /// thread cannot be started.
    pub fn build(self) -> WatchdogResult<Subsystem> {
        self.config.validate()?;
        let debugger = self.debugger.unwrap_or_else(|| Arc::new(NoDebugger));
        let log = Arc::new(EventLog::with_debugger(self.config.event_log, debugger)?);
        let target = self.sink.unwrap_or_else(|| Arc::new(DirectorySink::new()));
        let sink = Arc::new(QueuedSink::spawn(target)?);
        let pipeline = DebugReportPipeline::new(
            self.config.report.clone(),
            Arc::clone(&log),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        )?;
        let dispatcher = TimerDispatcher::with_config(self.dispatcher)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(WallClock::new()));

        tracing::info!(
            max_objects = self.config.max_objects,
            miss_threshold = self.config.miss_threshold,
            log_capacity = self.config.event_log.capacity,
            "watchdog subsystem initialized"
        );
        Ok(Subsystem {
            runtime: Arc::new(Runtime {
                config: self.config,
                log,
                pipeline: Arc::new(pipeline),
                clock,
                live: AtomicUsize::new(0),
            }),
            dispatcher,
            registry: DeviceRegistry::new(),
            sink,
        })
    }
}

impl core::fmt::Debug for SubsystemBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubsystemBuilder")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("custom_sink", &self.sink.is_some())
            .field("custom_debugger", &self.debugger.is_some())
            .field("custom_clock", &self.clock.is_some())
            .finish()
    }
}
