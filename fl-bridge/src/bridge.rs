//! This module provides the [`Bridge`], which owns a telemetry source and a lighting driver and
//! keeps the lights in step with the telemetry.

use crate::{
    cancel::{cancel_signal, CancelToken, LoopHandle},
    config::BridgeConfig,
    dispatch::Dispatcher,
    export::{spawn_export_worker, ExportConfig},
    fuel::FuelUsageLog,
};
use fl_driver_trait::LightingDriver;
use fl_telemetry::{
    FeedExt, SampleHandler, SubscriptionId, TelemetryError, TelemetrySample, TelemetrySource,
};
use std::{
    convert::Infallible,
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
};
use tracing::{debug, error, info, instrument, warn};
use tracing_unwrap::ResultExt;

/// Lock one of the bridge's mutexes.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .expect_or_log("Should be able to lock bridge state")
}

/// The bridge between a [`TelemetrySource`] and a [`LightingDriver`].
///
/// The lights get updated from two places. The handler subscribed to the source runs on every
/// new session, and the dispatch loop started by [`start`](Self::start) runs on every sample.
/// Both go through the same [`Dispatcher`].
pub struct Bridge<D: LightingDriver + 'static> {
    source: Arc<dyn TelemetrySource>,
    dispatcher: Arc<Dispatcher<D>>,
    export: ExportConfig,
    fuel_log: Arc<FuelUsageLog>,

    /// The single subscription to the source, if there is one.
    handler: Mutex<Option<SubscriptionId>>,

    dispatch_loop: Mutex<Option<LoopHandle>>,
    fuel_loop: Mutex<Option<LoopHandle>>,
    export_worker: Mutex<Option<LoopHandle>>,

    disposed: AtomicBool,
}

impl<D: LightingDriver + 'static> Bridge<D> {
    /// Create a bridge and subscribe the [default handler](Self::default_handler).
    ///
    /// This doesn't check either connection. Use [`check_connections`](Self::check_connections)
    /// for that.
    pub fn new(source: Arc<dyn TelemetrySource>, driver: D, config: &BridgeConfig) -> Self {
        let bridge = Self {
            source,
            dispatcher: Arc::new(Dispatcher::new(
                driver,
                config.policy.clone(),
                config.modes,
            )),
            export: config.export.clone(),
            fuel_log: Arc::new(FuelUsageLog::default()),
            handler: Mutex::new(None),
            dispatch_loop: Mutex::new(None),
            fuel_loop: Mutex::new(None),
            export_worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        };
        bridge.set_handler(bridge.default_handler());
        bridge
    }

    /// Log the state of both connections and return true if they're both up.
    pub fn check_connections(&self) -> bool {
        let telemetry = self.source.is_connected();
        if telemetry {
            info!("Telemetry source is connected");
        } else {
            warn!("Telemetry source is not connected");
        }

        let driver = self.dispatcher.driver();
        let lights = driver.is_connected();
        if lights {
            info!(devices = driver.devices().len(), "Lighting driver is connected");
        } else {
            warn!("Lighting driver is not connected");
        }

        telemetry && lights
    }

    /// The dispatcher used by both the handler and the loop.
    pub fn dispatcher(&self) -> &Dispatcher<D> {
        &self.dispatcher
    }

    /// Every fuel reading taken by the fuel logging loop.
    pub fn fuel_log(&self) -> &Arc<FuelUsageLog> {
        &self.fuel_log
    }

    /// Has [`dispose`](Self::dispose) been called?
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// A handler that sends the sample to the lights. Errors are logged and dropped.
    pub fn default_handler(&self) -> SampleHandler {
        let dispatcher = Arc::clone(&self.dispatcher);
        Arc::new(move |sample: &TelemetrySample| {
            if let Err(error) = dispatcher.apply(sample) {
                error!(%error, ?error, "Failed to update lights for new session");
            }
        })
    }

    /// Replace the subscribed handler with this one. Does nothing once the bridge is disposed.
    pub fn set_handler(&self, handler: SampleHandler) {
        if self.is_disposed() {
            warn!("Tried to set the session handler of a disposed bridge");
            return;
        }

        let mut slot = lock(&self.handler);
        if let Some(id) = slot.take() {
            self.source.unsubscribe(id);
        }
        *slot = Some(self.source.subscribe(handler));
        debug!("Subscribed new session handler");
    }

    /// Unsubscribe the handler without replacing it.
    pub fn clear_handler(&self) {
        if let Some(id) = lock(&self.handler).take() {
            self.source.unsubscribe(id);
            debug!("Unsubscribed new session handler");
        }
    }

    /// Is there a handler subscribed?
    pub fn has_handler(&self) -> bool {
        lock(&self.handler).is_some()
    }

    /// Open a feed from the source with every normalisation stage applied.
    fn normalised_feed(
        &self,
    ) -> Result<impl Iterator<Item = TelemetrySample> + Send + 'static, TelemetryError> {
        Ok(self
            .source
            .data_feed()?
            .with_corrected_percentages()
            .with_corrected_distances()
            .with_pit_stop_counts())
    }

    /// Start the loop that sends every sample to the lights.
    ///
    /// This does nothing if the loop is already running. The only error is failing to open the
    /// feed.
    pub fn start(&self) -> Result<(), TelemetryError> {
        if self.is_disposed() {
            warn!("Tried to start the dispatch loop of a disposed bridge");
            return Ok(());
        }

        let mut slot = lock(&self.dispatch_loop);
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            debug!("Dispatch loop is already running");
            return Ok(());
        }

        let feed = self.normalised_feed()?;
        let dispatcher = Arc::clone(&self.dispatcher);
        *slot = Some(spawn_feed_loop("dispatch-loop", feed, move |sample| {
            dispatcher.apply(sample)
        }));

        info!("Started dispatch loop");
        Ok(())
    }

    /// Ask the dispatch loop to stop. This doesn't wait for it.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.dispatch_loop).take() {
            handle.cancel();
            info!("Stopped dispatch loop");
        }
    }

    /// Is the dispatch loop running?
    pub fn is_running(&self) -> bool {
        lock(&self.dispatch_loop)
            .as_ref()
            .is_some_and(LoopHandle::is_running)
    }

    /// Start the loop that records the fuel use of every sample into the
    /// [fuel log](Self::fuel_log). Does nothing if it's already running.
    pub fn start_fuel_logging(&self) -> Result<(), TelemetryError> {
        if self.is_disposed() {
            warn!("Tried to start fuel logging on a disposed bridge");
            return Ok(());
        }

        let mut slot = lock(&self.fuel_loop);
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            debug!("Fuel logging loop is already running");
            return Ok(());
        }

        let feed = self.normalised_feed()?;
        let log = Arc::clone(&self.fuel_log);
        *slot = Some(spawn_feed_loop("fuel-logging", feed, move |sample| {
            log.push(sample.fuel_use_per_hour);
            Ok::<(), Infallible>(())
        }));

        info!("Started fuel logging");
        Ok(())
    }

    /// Ask the fuel logging loop to stop. This doesn't wait for it.
    pub fn stop_fuel_logging(&self) {
        if let Some(handle) = lock(&self.fuel_loop).take() {
            handle.cancel();
            info!("Stopped fuel logging");
        }
    }

    /// Start the worker that exports the fuel log. Does nothing if it's already running.
    pub fn start_export(&self) {
        if self.is_disposed() {
            warn!("Tried to start the export worker of a disposed bridge");
            return;
        }

        let mut slot = lock(&self.export_worker);
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            debug!("Export worker is already running");
            return;
        }

        *slot = Some(spawn_export_worker(
            self.export.clone(),
            Arc::clone(&self.fuel_log),
        ));
    }

    /// Ask the export worker to stop. If it's still waiting, nothing gets exported.
    pub fn stop_export(&self) {
        if let Some(handle) = lock(&self.export_worker).take() {
            handle.cancel();
            info!("Stopped export worker");
        }
    }

    /// Unsubscribe the handler, stop every loop, and release the lights.
    ///
    /// Only the first call does anything. This also gets called on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Disposing bridge");
        self.clear_handler();
        self.stop();
        self.stop_fuel_logging();
        self.stop_export();
        self.dispatcher.driver().release();
    }
}

impl<D: LightingDriver + 'static> Drop for Bridge<D> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Thread is panicking. Unable to dispose bridge cleanly");
        } else {
            self.dispose();
        }
    }
}

/// Spawn a thread which runs `on_sample` for every sample in the feed until it's cancelled, the
/// feed ends, or `on_sample` fails.
fn spawn_feed_loop<E, F>(
    name: &'static str,
    feed: impl Iterator<Item = TelemetrySample> + Send + 'static,
    on_sample: F,
) -> LoopHandle
where
    E: Error + 'static,
    F: FnMut(&TelemetrySample) -> Result<(), E> + Send + 'static,
{
    let (signal, token) = cancel_signal();
    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run_feed_loop(name, feed, token, on_sample))
        .expect_or_log("Should be able to spawn a loop thread");
    LoopHandle::new(signal, thread)
}

/// The body of a loop thread. Cancellation is checked on both sides of the blocking wait for a
/// sample and again after handling it, so at most one sample is handled after cancelling.
#[instrument(skip(feed, token, on_sample))]
fn run_feed_loop<E: Error>(
    name: &'static str,
    mut feed: impl Iterator<Item = TelemetrySample>,
    token: CancelToken,
    mut on_sample: impl FnMut(&TelemetrySample) -> Result<(), E>,
) {
    debug!("Loop started");

    loop {
        if token.is_cancelled() {
            debug!("Loop cancelled");
            break;
        }

        let Some(sample) = feed.next() else {
            info!("Telemetry feed ended");
            break;
        };

        if token.is_cancelled() {
            debug!("Loop cancelled");
            break;
        }

        if let Err(error) = on_sample(&sample) {
            error!(%error, ?error, "Loop failed; stopping it");
            break;
        }

        if token.is_cancelled() {
            debug!("Loop cancelled after dispatch");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fl_driver_trait::{CommandLog, DeviceInfo, DriverCommand, RecordingDriver};
    use fl_telemetry::{announce_new_sessions, DataFeed, SessionFlags, Subscribers};
    use std::{
        collections::VecDeque,
        sync::{
            atomic::AtomicUsize,
            mpsc::{self, Sender},
        },
        time::Duration,
    };

    /// A telemetry source whose feeds are fed by hand through channels.
    #[derive(Default)]
    struct ScriptedSource {
        subscribers: Arc<Subscribers>,
        feeds: Mutex<VecDeque<mpsc::Receiver<TelemetrySample>>>,
        opened: AtomicUsize,
        unsubscribed: AtomicUsize,
    }

    impl ScriptedSource {
        /// Queue up a feed for the next call to `data_feed` and return its sending end.
        fn add_feed(&self) -> Sender<TelemetrySample> {
            let (tx, rx) = mpsc::channel();
            self.feeds.lock().unwrap().push_back(rx);
            tx
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    impl TelemetrySource for ScriptedSource {
        fn is_connected(&self) -> bool {
            true
        }

        fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
            self.subscribers.subscribe(handler)
        }

        fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.unsubscribed.fetch_add(1, Ordering::SeqCst);
            self.subscribers.unsubscribe(id)
        }

        fn data_feed(&self) -> Result<DataFeed, TelemetryError> {
            let rx = self
                .feeds
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TelemetryError::Unavailable("no feed queued"))?;
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(announce_new_sessions(
                rx.into_iter(),
                Arc::clone(&self.subscribers),
            )))
        }
    }

    fn bridge() -> (Arc<ScriptedSource>, Bridge<RecordingDriver>, CommandLog) {
        let source = Arc::new(ScriptedSource::default());
        let (driver, log) = RecordingDriver::new(vec![
            DeviceInfo::with_zones("Keyboard", &[3, 2], 6),
            DeviceInfo::with_zones("Mouse", &[1], 5),
        ]);
        let bridge = Bridge::new(source.clone(), driver, &BridgeConfig::default());
        (source, bridge, log)
    }

    fn sample(session_flags: SessionFlags) -> TelemetrySample {
        TelemetrySample {
            session_num: 1,
            session_flags,
            ..Default::default()
        }
    }

    /// Commands for one sample on the test devices: three zones, each with a mode and a fill.
    const COMMANDS_PER_SAMPLE: usize = 6;

    fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("Condition never became true");
    }

    fn releases(log: &CommandLog) -> usize {
        log.commands()
            .iter()
            .filter(|command| **command == DriverCommand::Release)
            .count()
    }

    #[test]
    fn at_most_one_handler() {
        let (source, bridge, _log) = bridge();
        assert!(bridge.has_handler());
        assert_eq!(source.subscribers.len(), 1);

        bridge.set_handler(Arc::new(|_: &TelemetrySample| {}));
        bridge.set_handler(Arc::new(|_: &TelemetrySample| {}));
        assert_eq!(source.subscribers.len(), 1);
        assert_eq!(source.unsubscribed.load(Ordering::SeqCst), 2);

        bridge.clear_handler();
        bridge.clear_handler();
        assert!(!bridge.has_handler());
        assert!(source.subscribers.is_empty());
        assert_eq!(source.unsubscribed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn new_session_runs_the_default_handler() {
        let (source, bridge, log) = bridge();
        let tx = source.add_feed();
        bridge.start().unwrap();

        tx.send(sample(SessionFlags::YELLOW_WAVING)).unwrap();

        // Once from the handler for the new session, and once from the loop
        wait_for(|| log.len() == 2 * COMMANDS_PER_SAMPLE);
        let commands = log.take();
        assert_eq!(
            commands[..COMMANDS_PER_SAMPLE],
            commands[COMMANDS_PER_SAMPLE..]
        );
        assert_eq!(
            commands[1],
            DriverCommand::UpdateZoneLeds {
                device: 0,
                zone: 0,
                colours: vec![[255, 215, 0]; 3]
            }
        );
    }

    #[test]
    fn loop_dispatches_every_sample() {
        let (source, bridge, log) = bridge();
        bridge.clear_handler();
        let tx = source.add_feed();
        bridge.start().unwrap();
        assert!(bridge.is_running());

        tx.send(sample(SessionFlags::GREEN)).unwrap();
        tx.send(sample(SessionFlags::empty())).unwrap();
        wait_for(|| log.len() == 2 * COMMANDS_PER_SAMPLE);

        let commands = log.take();
        assert_eq!(
            commands[0],
            DriverCommand::SetMode {
                device: 0,
                mode: fl_driver_trait::ModeRequest::index(4)
            }
        );
        assert_eq!(
            commands[COMMANDS_PER_SAMPLE + 1],
            DriverCommand::UpdateZoneLeds {
                device: 0,
                zone: 0,
                colours: vec![[255, 0, 0]; 3]
            }
        );
    }

    #[test]
    fn starting_twice_is_a_no_op() {
        let (source, bridge, _log) = bridge();
        let _tx = source.add_feed();
        source.add_feed();

        bridge.start().unwrap();
        bridge.start().unwrap();
        assert_eq!(source.opened(), 1);
        assert!(bridge.is_running());
    }

    #[test]
    fn stop_before_start_and_twice() {
        let (source, bridge, log) = bridge();
        bridge.stop();
        bridge.stop();
        assert!(!bridge.is_running());

        let _tx = source.add_feed();
        bridge.start().unwrap();
        assert!(bridge.is_running());
        bridge.stop();
        bridge.stop();
        assert!(!bridge.is_running());

        let _tx = source.add_feed();
        bridge.start().unwrap();
        assert_eq!(source.opened(), 2);

        bridge.dispose();
        assert_eq!(releases(&log), 1);
    }

    #[test]
    fn no_dispatch_after_stop() {
        let (source, bridge, log) = bridge();
        bridge.clear_handler();
        let tx = source.add_feed();
        bridge.start().unwrap();

        tx.send(sample(SessionFlags::BLUE)).unwrap();
        wait_for(|| log.len() == COMMANDS_PER_SAMPLE);

        bridge.stop();
        for _ in 0..5 {
            // The loop ends when it sees the next sample, so sending may fail after that
            let _ = tx.send(sample(SessionFlags::WHITE));
        }
        thread::sleep(Duration::from_millis(100));

        assert_eq!(log.len(), COMMANDS_PER_SAMPLE);
    }

    #[test]
    fn failed_dispatch_ends_the_loop() {
        let (source, bridge, _log) = bridge();
        bridge.clear_handler();
        let tx = source.add_feed();
        bridge.start().unwrap();

        bridge.dispatcher().driver().release();
        tx.send(sample(SessionFlags::GREEN)).unwrap();
        wait_for(|| !bridge.is_running());

        // It can be started again with a fresh feed
        let _tx = source.add_feed();
        bridge.start().unwrap();
        assert_eq!(source.opened(), 2);
    }

    #[test]
    fn start_fails_without_a_feed() {
        let (_source, bridge, _log) = bridge();
        assert!(matches!(
            bridge.start(),
            Err(TelemetryError::Unavailable(_))
        ));
        assert!(!bridge.is_running());
    }

    #[test]
    fn fuel_logging_records_every_sample() {
        let (source, bridge, _log) = bridge();
        let tx = source.add_feed();
        bridge.start_fuel_logging().unwrap();
        bridge.start_fuel_logging().unwrap();
        assert_eq!(source.opened(), 1);

        for fuel_use_per_hour in [10., 11., 12.5] {
            tx.send(TelemetrySample {
                fuel_use_per_hour,
                ..Default::default()
            })
            .unwrap();
        }
        wait_for(|| bridge.fuel_log().len() == 3);
        assert_eq!(bridge.fuel_log().snapshot(), vec![10., 11., 12.5]);

        bridge.stop_fuel_logging();
        bridge.stop_fuel_logging();
    }

    #[test]
    fn dispose_is_idempotent() {
        let (source, bridge, log) = bridge();
        let _tx = source.add_feed();
        bridge.start().unwrap();
        bridge.start_export();

        bridge.dispose();
        bridge.dispose();
        assert!(bridge.is_disposed());
        assert!(!bridge.is_running());
        assert!(!bridge.has_handler());
        assert!(source.subscribers.is_empty());
        assert_eq!(releases(&log), 1);

        // Nothing starts again after disposal
        let _tx = source.add_feed();
        bridge.start().unwrap();
        assert!(!bridge.is_running());

        drop(bridge);
        assert_eq!(releases(&log), 1);
    }

    #[test]
    fn no_handler_after_dispose() {
        let (source, bridge, log) = bridge();
        bridge.dispose();

        bridge.set_handler(bridge.default_handler());
        assert!(!bridge.has_handler());
        assert!(source.subscribers.is_empty());

        // A session starting now must not reach the released driver
        let tx = source.add_feed();
        let mut feed = source.data_feed().unwrap();
        tx.send(sample(SessionFlags::GREEN)).unwrap();
        assert!(feed.next().is_some());
        assert_eq!(log.commands(), vec![DriverCommand::Release]);
    }

    #[test]
    fn default_handler_swallows_driver_errors() {
        let (_source, bridge, log) = bridge();
        bridge.dispatcher().driver().release();

        let handler = bridge.default_handler();
        handler(&sample(SessionFlags::YELLOW_WAVING));
        handler(&sample(SessionFlags::GREEN));

        assert_eq!(log.commands(), vec![DriverCommand::Release]);
    }

    #[test]
    fn drop_disposes() {
        let (source, bridge, log) = bridge();
        drop(bridge);
        assert!(source.subscribers.is_empty());
        assert_eq!(releases(&log), 1);
    }

    #[test]
    fn check_connections_test() {
        let (_source, bridge, _log) = bridge();
        assert!(bridge.check_connections());

        bridge.dispatcher().driver().release();
        assert!(!bridge.check_connections());
    }
}
