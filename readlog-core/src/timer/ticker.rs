use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{elapsed, is_running, Elapsed};
use crate::clock::Clock;
use crate::types::ReadingSession;

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Live elapsed-time view of one session.
///
/// Call [`SessionTimer::sync`] at every lifecycle transition. The ticker runs
/// only while the session is active; pause, stop, [`reset`](Self::reset) and
/// drop all cancel it. Must be used inside a Tokio runtime.
pub struct SessionTimer {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    session: Option<ReadingSession>,
    tx: Arc<watch::Sender<Elapsed>>,
    ticker: Option<Ticker>,
}

impl SessionTimer {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(Elapsed::default());
        Self {
            clock,
            tick_interval,
            session: None,
            tx: Arc::new(tx),
            ticker: None,
        }
    }

    /// Receive every published elapsed value.
    pub fn subscribe(&self) -> watch::Receiver<Elapsed> {
        self.tx.subscribe()
    }

    /// Elapsed time as of now, computed on demand.
    pub fn elapsed(&self) -> Elapsed {
        match &self.session {
            Some(session) => elapsed(session, self.clock.now()),
            None => Elapsed::default(),
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Track a new snapshot of the session (or none).
    ///
    /// Publishes the current value immediately, then starts the ticker if
    /// the session is running and stops it otherwise.
    pub fn sync(&mut self, session: Option<&ReadingSession>) {
        self.stop_ticker();
        self.session = session.cloned();
        self.tx.send_replace(self.elapsed());

        if let Some(session) = self.session.as_ref().filter(|s| is_running(s)) {
            self.ticker = Some(self.spawn_ticker(session.clone()));
        }
    }

    /// Forget the session and publish zero.
    pub fn reset(&mut self) {
        self.stop_ticker();
        self.session = None;
        self.tx.send_replace(Elapsed::default());
    }

    /// Stop ticking and wait for the ticker task to exit.
    pub async fn shutdown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel.cancel();
            let _ = ticker.handle.await;
        }
    }

    fn spawn_ticker(&self, session: ReadingSession) -> Ticker {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = Arc::clone(&self.tx);
        let clock = Arc::clone(&self.clock);
        let period = self.tick_interval;

        tracing::debug!(session_id = %session.id, "Starting session ticker");

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tx.send_replace(elapsed(&session, clock.now()));
                    }
                }
            }
            tracing::debug!(session_id = %session.id, "Session ticker stopped");
        });

        Ticker { cancel, handle }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel.cancel();
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
