mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_adjacent, subtract_stays};
pub use error::EngineError;
pub use queries::ConflictScan;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;

use crate::directory::{Directory, OpenDirectory};
use crate::feed::BookingFeed;
use crate::journal::Journal;
use crate::model::*;

pub type SharedPropertyState = Arc<RwLock<PropertyState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and commits appends in groups:
/// take the first append, drain whatever else is already queued, write the
/// lot, fsync once, then acknowledge every sender with the shared result.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            JournalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_control(&mut journal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let started = std::time::Instant::now();
        let result = flush_batch(&mut journal, &batch);
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!(
                "journal flush of {} events failed, journal kept at {} bytes: {e}",
                batch.len(),
                journal.durable_len()
            );
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_control(&mut journal, cmd);
        }
    }
}

/// All or nothing: a batch that fails leaves no record staged or on disk.
fn flush_batch(journal: &mut Journal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    if let Err(e) = batch
        .iter()
        .try_for_each(|(event, _)| journal.append_buffered(event))
    {
        journal.discard_staged();
        return Err(e);
    }
    journal.flush_sync()
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Rewrite { events, response } => {
            let _ = response.send(journal.rewrite(&events));
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The availability engine.
///
/// Holds one lock per property. Every write takes that property's write lock
/// for the whole check, journal append and apply sequence; reads take the
/// read lock. Properties never share a lock.
///
/// The append and apply half of a write runs in a spawned task that owns the
/// lock guard. A caller that stops waiting does not stop the commit.
pub struct Engine {
    pub(super) properties: Arc<DashMap<PropertyId, SharedPropertyState>>,
    /// Booking id → owning property.
    pub(super) booking_index: Arc<DashMap<BookingId, PropertyId>>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) directory: Arc<dyn Directory>,
    pub feed: Arc<BookingFeed>,
    /// Serializes property registration against journal compaction.
    pub(super) registry: Arc<Mutex<()>>,
}

/// Apply an event to a property's table. Caller holds the write lock.
fn apply_to_property(
    ps: &mut PropertyState,
    event: &Event,
    booking_index: &DashMap<BookingId, PropertyId>,
) {
    match event {
        Event::BookingReserved { booking } | Event::BookingRestored { booking } => {
            booking_index.insert(booking.id, booking.property_id);
            ps.insert_booking(booking.clone());
        }
        Event::BookingConfirmed { id, at, .. } => {
            if let Some(b) = ps.booking_mut(*id) {
                b.status = BookingStatus::Confirmed;
                b.updated_at = *at;
            }
        }
        Event::BookingCancelled { id, at, .. } => {
            if let Some(b) = ps.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
                b.updated_at = *at;
            }
        }
        // Registration is handled at the map level.
        Event::PropertyRegistered { .. } => {}
    }
}

/// Apply a replayed event unless it adds an active booking over nights that
/// are already held. Returns `false` for a refused event.
fn replay_into_property(
    ps: &mut PropertyState,
    event: &Event,
    booking_index: &DashMap<BookingId, PropertyId>,
) -> bool {
    if let Event::BookingReserved { booking } | Event::BookingRestored { booking } = event
        && booking.is_active()
        && ps.overlapping(&booking.stay).next().is_some()
    {
        return false;
    }
    apply_to_property(ps, event, booking_index);
    true
}

/// Send one event to the group-commit writer and wait until it is durable.
async fn send_append(
    journal_tx: &mpsc::Sender<JournalCommand>,
    event: &Event,
) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    journal_tx
        .send(JournalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::StorageUnavailable("journal writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::StorageUnavailable("journal writer dropped response".into()))?
        .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
}

fn commit_task_failed(e: tokio::task::JoinError) -> EngineError {
    EngineError::StorageUnavailable(format!("commit task failed: {e}"))
}

impl Engine {
    /// Open the journal at `journal_path`, replay it and start the writer.
    /// Must be called inside a tokio runtime.
    pub fn new(journal_path: PathBuf, feed: Arc<BookingFeed>) -> io::Result<Self> {
        Self::with_directory(journal_path, feed, Arc::new(OpenDirectory))
    }

    pub fn with_directory(
        journal_path: PathBuf,
        feed: Arc<BookingFeed>,
        directory: Arc<dyn Directory>,
    ) -> io::Result<Self> {
        let replay = Journal::replay(&journal_path)?;
        if replay.discarded_bytes > 0 {
            warn!(
                "journal {}: discarding {} trailing bytes after last good record",
                journal_path.display(),
                replay.discarded_bytes
            );
        }
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            properties: Arc::new(DashMap::new()),
            booking_index: Arc::new(DashMap::new()),
            journal_tx,
            directory,
            feed,
            registry: Arc::new(Mutex::new(())),
        };

        // We own every Arc during replay, so try_write never contends. Never
        // block here: this may run inside an async context.
        for event in &replay.events {
            match event {
                Event::PropertyRegistered { property } => {
                    engine
                        .properties
                        .entry(property.id)
                        .or_insert_with(|| Arc::new(RwLock::new(PropertyState::new(property.clone()))));
                }
                other => {
                    let Some(entry) = engine.properties.get(&other.property_id()) else {
                        warn!("journal event for unknown property {}", other.property_id());
                        continue;
                    };
                    let ps = entry.value().clone();
                    drop(entry);
                    let Ok(mut guard) = ps.try_write() else {
                        return Err(io::Error::other("replay: property lock contended"));
                    };
                    if !replay_into_property(&mut guard, other, &engine.booking_index) {
                        warn!(
                            "journal {}: skipping {:?} for property {}, nights already held",
                            journal_path.display(),
                            other,
                            other.property_id()
                        );
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::PROPERTIES).set(engine.properties.len() as f64);

        Ok(engine)
    }

    pub(super) fn property(&self, id: &PropertyId) -> Option<SharedPropertyState> {
        self.properties.get(id).map(|e| e.value().clone())
    }

    pub(super) fn property_for_booking(&self, booking_id: &BookingId) -> Option<PropertyId> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    /// Journal, then apply, then publish, in a task that owns `guard`.
    /// Nothing is applied if the journal fails. The guard comes back so the
    /// caller can read the result before releasing the property.
    pub(super) async fn persist_and_apply(
        &self,
        mut guard: OwnedRwLockWriteGuard<PropertyState>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<PropertyState>, EngineError> {
        let journal_tx = self.journal_tx.clone();
        let booking_index = self.booking_index.clone();
        let feed = self.feed.clone();
        tokio::spawn(async move {
            send_append(&journal_tx, &event).await?;
            apply_to_property(&mut guard, &event, &booking_index);
            feed.publish(&event);
            Ok::<_, EngineError>(guard)
        })
        .await
        .map_err(commit_task_failed)?
    }

    /// Booking → property, then the property's write lock.
    pub(super) async fn lock_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<OwnedRwLockWriteGuard<PropertyState>, EngineError> {
        let property_id = self
            .property_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        Ok(ps.write_owned().await)
    }
}
