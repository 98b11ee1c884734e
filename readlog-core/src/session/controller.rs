//! Session lifecycle controller
//!
//! Drives each book's active session through start → pause ⇄ resume → stop
//! (plus quick-add) against a [`SessionStore`].
//!
//! State is kept per book in two layers: the `confirmed` session last
//! returned by the store, and a pending overlay naming the request in
//! flight. Confirmed state changes only when the store answers successfully;
//! a failed or timed-out request leaves it untouched. A second mutating
//! request for a book while one is pending is rejected with
//! [`Error::RequestInFlight`], never queued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::store::{
    PauseRequest, QuickAddRequest, ResumeRequest, SessionRecords, SessionStore, StartRequest,
    StopRequest,
};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::types::{ReadingSession, SessionFilter, SessionState, SyncStatus};

const EVENT_CAPACITY: usize = 64;

/// A request the controller sends to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Pause,
    Resume,
    Stop,
    QuickAdd,
    Refresh,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Stop => "stop",
            Operation::QuickAdd => "quick-add",
            Operation::Refresh => "refresh",
        }
    }
}

/// Invalidation notices published after the store confirms a change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The book's active-session view changed (`None` once stopped)
    ActiveSessionChanged {
        book_id: String,
        session: Option<ReadingSession>,
    },
    /// The book's page or status fields may have changed
    BookChanged { book_id: String },
    /// A record was added to the book's session history
    HistoryChanged { book_id: String },
}

#[derive(Debug, Clone)]
struct RetryKey {
    operation: Operation,
    /// The caller's input, before any defaults are resolved
    fingerprint: String,
    key: String,
    /// Start page resolved for the first attempt of a quick-add
    start_page: Option<u32>,
}

#[derive(Debug, Default)]
struct BookSlot {
    /// Whether `confirmed` reflects the store
    loaded: bool,
    confirmed: Option<ReadingSession>,
    pending: Option<Operation>,
    failed: bool,
    /// Key of a failed idempotent request, reused when it is retried
    retry_key: Option<RetryKey>,
}

type Slots = Mutex<HashMap<String, BookSlot>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, BookSlot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a book busy until the request settles or the future is dropped.
struct InFlight<'a> {
    slots: &'a Slots,
    book_id: String,
    settled: bool,
}

impl InFlight<'_> {
    fn succeed(mut self, apply: impl FnOnce(&mut BookSlot)) {
        let mut slots = lock(self.slots);
        let slot = slots.entry(self.book_id.clone()).or_default();
        slot.pending = None;
        slot.failed = false;
        slot.loaded = true;
        apply(slot);
        self.settled = true;
    }

    fn fail(mut self, retry_key: Option<RetryKey>, stale: bool) {
        let mut slots = lock(self.slots);
        let slot = slots.entry(self.book_id.clone()).or_default();
        slot.pending = None;
        slot.failed = true;
        if retry_key.is_some() {
            slot.retry_key = retry_key;
        }
        if stale {
            slot.loaded = false;
        }
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            if let Some(slot) = lock(self.slots).get_mut(&self.book_id) {
                slot.pending = None;
            }
        }
    }
}

/// Errors after which the local view of the book can no longer be trusted.
fn is_stale_view(err: &Error) -> bool {
    matches!(
        err,
        Error::AlreadyActive { .. }
            | Error::NoActiveSession(_)
            | Error::InvalidTransition { .. }
            | Error::SessionNotFound(_)
    )
}

fn open_session<'a>(book_id: &str, slot: &'a BookSlot) -> Result<&'a ReadingSession> {
    slot.confirmed
        .as_ref()
        .ok_or_else(|| Error::NoActiveSession(book_id.to_string()))
}

fn require_state(
    session: &ReadingSession,
    expected: SessionState,
    action: &'static str,
) -> Result<()> {
    if session.state == expected {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            session_id: session.id.clone(),
            action,
            state: session.state.to_string(),
        })
    }
}

/// Owns the active-session slot of every book it has touched.
pub struct SessionController<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    slots: Slots,
    events: broadcast::Sender<SessionEvent>,
}

impl<S> SessionController<S>
where
    S: SessionStore + SessionRecords,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            clock,
            request_timeout: config.request_timeout(),
            slots: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Receive invalidation notices for confirmed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The book's active session as last confirmed, with the overlay's sync
    /// status: `syncing` while a request is in flight, `pending` while a
    /// failed stop awaits its retry, `failed` after any other failure.
    pub fn active_session(&self, book_id: &str) -> Option<ReadingSession> {
        let slots = lock(&self.slots);
        let slot = slots.get(book_id)?;
        let mut session = slot.confirmed.clone()?;
        session.sync_status = if slot.pending.is_some() {
            SyncStatus::Syncing
        } else if slot.failed && slot.retry_key.is_some() {
            SyncStatus::Pending
        } else if slot.failed {
            SyncStatus::Failed
        } else {
            SyncStatus::Synced
        };
        Some(session)
    }

    /// Whether a request for the book is in flight.
    pub fn is_busy(&self, book_id: &str) -> bool {
        lock(&self.slots)
            .get(book_id)
            .map_or(false, |slot| slot.pending.is_some())
    }

    /// Replace the local view of the book with the store's active session.
    pub async fn refresh(&self, book_id: &str) -> Result<Option<ReadingSession>> {
        let (flight, ()) = self.begin(book_id, Operation::Refresh, |_| Ok(()))?;
        let active = self
            .request(Operation::Refresh, self.store.get_active_session(book_id))
            .await?;

        flight.succeed(|slot| slot.confirmed = active.clone());
        tracing::debug!(
            book_id,
            active = active.as_ref().map(|s| s.id.as_str()),
            "Refreshed active session"
        );
        Ok(active)
    }

    /// Begin a timed session. The start page defaults to the book's current
    /// page, then the last completed session's end page, then zero.
    pub async fn start(&self, book_id: &str, start_page: Option<u32>) -> Result<ReadingSession> {
        self.ensure_loaded(book_id).await?;
        let (flight, ()) = self.begin(book_id, Operation::Start, |slot| match &slot.confirmed {
            Some(active) => Err(Error::AlreadyActive {
                book_id: book_id.to_string(),
                session_id: active.id.clone(),
            }),
            None => Ok(()),
        })?;

        let start_page = match start_page {
            Some(page) => page,
            None => self.default_start_page(book_id).await?,
        };

        let request = StartRequest {
            book_id: book_id.to_string(),
            start_page,
            at: self.clock.now(),
            session_date: self.clock.today(),
        };
        let result = self
            .request(Operation::Start, self.store.start(request))
            .await;
        self.settle(flight, book_id, Operation::Start, result, None)
    }

    pub async fn pause(&self, book_id: &str, reason: Option<String>) -> Result<ReadingSession> {
        self.ensure_loaded(book_id).await?;
        let (flight, session_id) = self.begin(book_id, Operation::Pause, |slot| {
            let active = open_session(book_id, slot)?;
            require_state(active, SessionState::Active, "pause")?;
            Ok(active.id.clone())
        })?;

        let request = PauseRequest {
            session_id,
            reason,
            at: self.clock.now(),
        };
        let result = self
            .request(Operation::Pause, self.store.pause(request))
            .await;
        self.settle(flight, book_id, Operation::Pause, result, None)
    }

    pub async fn resume(&self, book_id: &str) -> Result<ReadingSession> {
        self.ensure_loaded(book_id).await?;
        let (flight, session_id) = self.begin(book_id, Operation::Resume, |slot| {
            let active = open_session(book_id, slot)?;
            require_state(active, SessionState::Paused, "resume")?;
            Ok(active.id.clone())
        })?;

        let request = ResumeRequest {
            session_id,
            at: self.clock.now(),
        };
        let result = self
            .request(Operation::Resume, self.store.resume(request))
            .await;
        self.settle(flight, book_id, Operation::Resume, result, None)
    }

    /// Complete the active session at `end_page`.
    pub async fn stop(&self, book_id: &str, end_page: u32) -> Result<ReadingSession> {
        self.ensure_loaded(book_id).await?;
        let (flight, session_id) = self.begin(book_id, Operation::Stop, |slot| {
            let active = open_session(book_id, slot)?;
            if end_page < active.start_page {
                return Err(Error::InvalidPage(format!(
                    "end page {} is before start page {}",
                    end_page, active.start_page
                )));
            }
            Ok(active.id.clone())
        })?;

        let fingerprint = format!("{}:{}", session_id, end_page);
        let retry = self.retry_key(book_id, Operation::Stop, fingerprint);
        let request = StopRequest {
            session_id,
            end_page,
            at: self.clock.now(),
            ended_on: self.clock.today(),
            request_key: retry.key.clone(),
        };
        let result = self.request(Operation::Stop, self.store.stop(request)).await;
        self.settle(flight, book_id, Operation::Stop, result, Some(retry))
    }

    /// Log `pages_read` pages without timing. The start page defaults as
    /// for [`start`](Self::start).
    pub async fn quick_add(
        &self,
        book_id: &str,
        pages_read: u32,
        start_page: Option<u32>,
    ) -> Result<ReadingSession> {
        if pages_read == 0 {
            return Err(Error::InvalidPage(
                "quick-add needs at least one page".to_string(),
            ));
        }

        self.ensure_loaded(book_id).await?;
        let (flight, ()) = self.begin(book_id, Operation::QuickAdd, |slot| match &slot.confirmed {
            Some(active) => Err(Error::AlreadyActive {
                book_id: book_id.to_string(),
                session_id: active.id.clone(),
            }),
            None => Ok(()),
        })?;

        // A lost quick-add may already have advanced the book, so a retry
        // keeps the start page of its first attempt
        let fingerprint = match start_page {
            Some(page) => format!("{}+{}", page, pages_read),
            None => format!("current+{}", pages_read),
        };
        let mut retry = self.retry_key(book_id, Operation::QuickAdd, fingerprint);
        let start_page = match start_page.or(retry.start_page) {
            Some(page) => page,
            None => self.default_start_page(book_id).await?,
        };
        retry.start_page = Some(start_page);

        let request = QuickAddRequest {
            book_id: book_id.to_string(),
            start_page,
            pages_read,
            at: self.clock.now(),
            session_date: self.clock.today(),
            request_key: retry.key.clone(),
        };
        let result = self
            .request(Operation::QuickAdd, self.store.quick_add(request))
            .await;
        self.settle(flight, book_id, Operation::QuickAdd, result, Some(retry))
    }

    async fn ensure_loaded(&self, book_id: &str) -> Result<()> {
        let loaded = lock(&self.slots)
            .get(book_id)
            .map_or(false, |slot| slot.loaded);
        if !loaded {
            self.refresh(book_id).await?;
        }
        Ok(())
    }

    async fn default_start_page(&self, book_id: &str) -> Result<u32> {
        let book = self
            .request(Operation::Start, self.store.get_book(book_id))
            .await?
            .ok_or_else(|| Error::BookNotFound(book_id.to_string()))?;
        if let Some(page) = book.current_page {
            return Ok(page);
        }

        let filter = SessionFilter {
            limit: Some(1),
            ..SessionFilter::completed_for(book_id)
        };
        let latest = self
            .request(Operation::Start, self.store.list_sessions(&filter))
            .await?;
        Ok(latest.first().and_then(|s| s.end_page).unwrap_or(0))
    }

    /// Claim the book for `operation` after `check` accepts its slot.
    fn begin<T>(
        &self,
        book_id: &str,
        operation: Operation,
        check: impl FnOnce(&BookSlot) -> Result<T>,
    ) -> Result<(InFlight<'_>, T)> {
        let mut slots = lock(&self.slots);
        let slot = slots.entry(book_id.to_string()).or_default();

        if let Some(pending) = slot.pending {
            tracing::warn!(
                book_id,
                in_flight = pending.as_str(),
                rejected = operation.as_str(),
                "Rejecting overlapping session request"
            );
            return Err(Error::RequestInFlight(book_id.to_string()));
        }

        let value = check(slot)?;
        slot.pending = Some(operation);
        Ok((
            InFlight {
                slots: &self.slots,
                book_id: book_id.to_string(),
                settled: false,
            },
            value,
        ))
    }

    fn retry_key(&self, book_id: &str, operation: Operation, fingerprint: String) -> RetryKey {
        let slots = lock(&self.slots);
        let previous = slots
            .get(book_id)
            .and_then(|slot| slot.retry_key.as_ref())
            .filter(|k| k.operation == operation && k.fingerprint == fingerprint);

        match previous {
            Some(previous) => {
                tracing::info!(book_id, key = %previous.key, "Retrying with previous request key");
                previous.clone()
            }
            None => RetryKey {
                operation,
                fingerprint,
                key: Uuid::new_v4().to_string(),
                start_page: None,
            },
        }
    }

    async fn request<T>(
        &self,
        operation: Operation,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.as_str(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn settle(
        &self,
        flight: InFlight<'_>,
        book_id: &str,
        operation: Operation,
        result: Result<ReadingSession>,
        retry: Option<RetryKey>,
    ) -> Result<ReadingSession> {
        let session = match result {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(
                    book_id,
                    operation = operation.as_str(),
                    error = %err,
                    "Session request failed"
                );
                flight.fail(retry, is_stale_view(&err));
                return Err(err);
            }
        };

        flight.succeed(|slot| {
            slot.retry_key = None;
            match operation {
                Operation::Stop => slot.confirmed = None,
                Operation::QuickAdd => {}
                _ => slot.confirmed = Some(session.clone()),
            }
        });

        tracing::info!(
            book_id,
            session_id = %session.id,
            operation = operation.as_str(),
            state = session.state.as_str(),
            "Session request confirmed"
        );

        match operation {
            Operation::Start => {
                self.emit_active(book_id, Some(session.clone()));
                self.emit(SessionEvent::BookChanged {
                    book_id: book_id.to_string(),
                });
            }
            Operation::Pause | Operation::Resume => {
                self.emit_active(book_id, Some(session.clone()));
            }
            Operation::Stop => {
                self.emit_active(book_id, None);
                self.emit_history(book_id);
            }
            Operation::QuickAdd => self.emit_history(book_id),
            Operation::Refresh => {}
        }

        Ok(session)
    }

    fn emit_active(&self, book_id: &str, session: Option<ReadingSession>) {
        self.emit(SessionEvent::ActiveSessionChanged {
            book_id: book_id.to_string(),
            session,
        });
    }

    fn emit_history(&self, book_id: &str) {
        self.emit(SessionEvent::BookChanged {
            book_id: book_id.to_string(),
        });
        self.emit(SessionEvent::HistoryChanged {
            book_id: book_id.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
