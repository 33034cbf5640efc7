use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;

use super::conflict::{check_no_conflict, validate_request};
use super::{commit_task_failed, send_append, Engine, EngineError, JournalCommand};

impl Engine {
    /// Prices must be positive and at most `MAX_NIGHTLY_PRICE`, so the
    /// longest stay's total still fits in `Cents`.
    pub async fn register_property(&self, property: Property) -> Result<(), EngineError> {
        if property.nightly_price <= 0 || property.nightly_price > MAX_NIGHTLY_PRICE {
            return Err(EngineError::InvalidPrice);
        }
        let registry = self.registry.clone().lock_owned().await;
        if self.properties.len() >= MAX_PROPERTIES {
            return Err(EngineError::LimitExceeded("too many properties"));
        }
        if self.properties.contains_key(&property.id) {
            return Err(EngineError::AlreadyExists(property.id));
        }

        let id = property.id;
        let journal_tx = self.journal_tx.clone();
        let properties = self.properties.clone();
        let feed = self.feed.clone();
        tokio::spawn(async move {
            let event = Event::PropertyRegistered {
                property: property.clone(),
            };
            send_append(&journal_tx, &event).await?;
            properties.insert(id, Arc::new(RwLock::new(PropertyState::new(property))));
            feed.publish(&event);
            metrics::gauge!(PROPERTIES).set(properties.len() as f64);
            drop(registry);
            Ok::<_, EngineError>(())
        })
        .await
        .map_err(commit_task_failed)??;
        info!("registered property {id}");
        Ok(())
    }

    /// Reserve a stay submitted today.
    pub async fn reserve(
        &self,
        property_id: PropertyId,
        user_id: UserId,
        stay: Stay,
    ) -> Result<Booking, EngineError> {
        self.reserve_request(BookingRequest::new(property_id, user_id, stay))
            .await
    }

    /// Check and insert under the property's write lock. The new booking is
    /// `Pending`.
    pub async fn reserve_request(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let result = self.try_reserve(&req).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.kind(),
        };
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(b) => info!(booking = %b.id, property = %b.property_id, stay = %b.stay, "reserved"),
            Err(e) => debug!(property = %req.property_id, stay = %req.stay, "reservation rejected: {e}"),
        }
        result
    }

    async fn try_reserve(&self, req: &BookingRequest) -> Result<Booking, EngineError> {
        validate_request(req)?;
        let ps = self
            .property(&req.property_id)
            .ok_or(EngineError::PropertyNotFound(req.property_id))?;
        if !self.directory.user_exists(req.user_id).await? {
            return Err(EngineError::NotFound(req.user_id));
        }

        let guard = ps.write_owned().await;
        let locked_at = Instant::now();
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many bookings on property"));
        }
        if let Err(e) = check_no_conflict(&guard, &req.stay, None) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let total_price = req
            .stay
            .nights()
            .checked_mul(guard.property.nightly_price)
            .ok_or(EngineError::LimitExceeded("total price overflows"))?;
        let now = Utc::now();
        let booking = Booking {
            id: Ulid::new(),
            property_id: req.property_id,
            user_id: req.user_id,
            stay: req.stay,
            status: BookingStatus::Pending,
            total_price,
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingReserved {
            booking: booking.clone(),
        };
        let _guard = self.persist_and_apply(guard, event).await?;
        metrics::histogram!(LOCK_HOLD_SECONDS).record(locked_at.elapsed().as_secs_f64());
        Ok(booking)
    }

    /// `Pending -> Confirmed`, re-checking overlap against every other
    /// active booking first.
    pub async fn confirm(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        let guard = self.lock_booking(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                id: booking_id,
                status: booking.status,
            });
        }
        if let Err(e) = check_no_conflict(&guard, &booking.stay, Some(booking_id)) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingConfirmed {
            id: booking_id,
            property_id: booking.property_id,
            at: Utc::now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        metrics::counter!(CONFIRMATIONS_TOTAL).increment(1);
        info!(booking = %booking_id, "confirmed");
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// `{Pending, Confirmed} -> Cancelled`. Cancelling a cancelled booking
    /// returns it as is and writes nothing.
    pub async fn cancel(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        let guard = self.lock_booking(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        let event = Event::BookingCancelled {
            id: booking_id,
            property_id: booking.property_id,
            at: Utc::now(),
        };
        let guard = self.persist_and_apply(guard, event).await?;
        metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
        info!(booking = %booking_id, "cancelled");
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Rewrite the journal as one registration per property followed by every
    /// booking in its current state. Cancelled bookings are kept.
    ///
    /// Registration and all property read locks are held until the rewrite is
    /// durable, so no write can slip in between snapshot and swap. The locks
    /// move into the task that waits for the rewrite.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let registry = self.registry.clone().lock_owned().await;

        let mut ids: Vec<PropertyId> = self.properties.iter().map(|e| *e.key()).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(ps) = self.property(id) {
                guards.push(ps.read_owned().await);
            }
        }

        let mut events = Vec::with_capacity(guards.len());
        for guard in &guards {
            events.push(Event::PropertyRegistered {
                property: guard.property.clone(),
            });
            events.extend(guard.bookings.iter().map(|b| Event::BookingRestored {
                booking: b.clone(),
            }));
        }
        let count = events.len();

        let journal_tx = self.journal_tx.clone();
        tokio::spawn(async move {
            let (tx, rx) = oneshot::channel();
            journal_tx
                .send(JournalCommand::Rewrite { events, response: tx })
                .await
                .map_err(|_| EngineError::StorageUnavailable("journal writer shut down".into()))?;
            rx.await
                .map_err(|_| EngineError::StorageUnavailable("journal writer dropped response".into()))?
                .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
            drop(guards);
            drop(registry);
            Ok::<_, EngineError>(())
        })
        .await
        .map_err(commit_task_failed)??;
        metrics::counter!(JOURNAL_COMPACTIONS_TOTAL).increment(1);
        info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
