//! This module provides [`IracingSource`], which reads live telemetry from iRacing's shared
//! memory.

use crate::{
    announce_new_sessions, DataFeed, SampleHandler, SessionFlags, Subscribers, SubscriptionId,
    TelemetryError, TelemetrySample, TelemetrySource,
};
use iracing_telem::{flags::Flags, Client, DataUpdateResult, Session, Var};
use std::{sync::Arc, thread, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long to wait between checks for a running simulator.
const SESSION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait between reads of the telemetry buffer.
const DATA_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// How many unread samples can queue up before the reader thread waits.
const CHANNEL_CAPACITY: usize = 64;

/// A telemetry source backed by a running copy of iRacing.
///
/// Every call to [`data_feed`](TelemetrySource::data_feed) starts a reader thread which
/// forwards samples over a channel and stops once the feed has been dropped.
#[derive(Debug, Default)]
pub struct IracingSource {
    subscribers: Arc<Subscribers>,
}

impl IracingSource {
    /// Create a new source. This doesn't touch the simulator until a feed is opened.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetrySource for IracingSource {
    fn is_connected(&self) -> bool {
        let mut client = Client::new();
        // SAFETY: the session is dropped straight away and never read
        unsafe { client.session() }.is_some()
    }

    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
        self.subscribers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn data_feed(&self) -> Result<DataFeed, TelemetryError> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);

        thread::Builder::new()
            .name("iracing-reader".to_string())
            .spawn(move || read_samples(tx))?;

        let raw = std::iter::from_fn(move || rx.blocking_recv());
        Ok(Box::new(announce_new_sessions(
            raw,
            Arc::clone(&self.subscribers),
        )))
    }
}

/// The simulator variables that make up a [`TelemetrySample`].
struct SampleVars {
    session_num: Var,
    session_flags: Var,
    speed: Var,
    fuel_use_per_hour: Var,
    lap: Var,
    lap_dist_pct: Var,
    on_pit_road: Var,
}

impl SampleVars {
    /// Look up every variable in the session, or return the name of the first missing one.
    fn find(session: &Session) -> Result<Self, &'static str> {
        // SAFETY: looking up a variable only reads the session header
        let find = |name: &'static str| unsafe { session.find_var(name) }.ok_or(name);
        Ok(Self {
            session_num: find("SessionNum")?,
            session_flags: find("SessionFlags")?,
            speed: find("Speed")?,
            fuel_use_per_hour: find("FuelUsePerHour")?,
            lap: find("Lap")?,
            lap_dist_pct: find("LapDistPct")?,
            on_pit_road: find("OnPitRoad")?,
        })
    }

    /// Read the current values of every variable.
    ///
    /// # Safety
    ///
    /// The session must still be live, which is only known after `get_new_data` has
    /// returned [`DataUpdateResult::Updated`].
    unsafe fn read(&self, session: &Session) -> Result<TelemetrySample, iracing_telem::Error> {
        let flags: Flags = session.value(&self.session_flags)?;
        Ok(TelemetrySample {
            session_num: session.value(&self.session_num)?,
            session_flags: SessionFlags::from_bits_retain(flags.bits()),
            speed: session.value(&self.speed)?,
            fuel_use_per_hour: session.value(&self.fuel_use_per_hour)?,
            lap: session.value(&self.lap)?,
            lap_dist_pct: session.value(&self.lap_dist_pct)?,
            on_pit_road: session.value(&self.on_pit_road)?,
            ..Default::default()
        })
    }
}

/// Forward samples from the simulator until the receiving end of the channel is dropped.
fn read_samples(tx: mpsc::Sender<TelemetrySample>) {
    let mut client = Client::new();

    while !tx.is_closed() {
        // SAFETY: the session never leaves this thread and is dropped before the client
        let Some(mut session) = (unsafe { client.session() }) else {
            thread::sleep(SESSION_POLL_INTERVAL);
            continue;
        };
        info!("Connected to an iRacing session");

        let vars = match SampleVars::find(&session) {
            Ok(vars) => vars,
            Err(name) => {
                warn!(name, "iRacing session is missing a telemetry variable");
                thread::sleep(SESSION_POLL_INTERVAL);
                continue;
            }
        };

        loop {
            if tx.is_closed() {
                return;
            }

            // SAFETY: values are only read after a successful update
            match unsafe { session.get_new_data() } {
                DataUpdateResult::Updated => match unsafe { vars.read(&session) } {
                    Ok(sample) => {
                        if tx.blocking_send(sample).is_err() {
                            return;
                        }
                    }
                    Err(error) => warn!(?error, "Failed to read telemetry"),
                },
                DataUpdateResult::NoUpdate => {}
                DataUpdateResult::FailedToCopyRow => debug!("Fell behind the simulator"),
                DataUpdateResult::SessionExpired => {
                    info!("iRacing session ended");
                    break;
                }
            }

            thread::sleep(DATA_POLL_INTERVAL);
        }
    }
}
