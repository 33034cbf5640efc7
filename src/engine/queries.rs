use tokio::sync::broadcast;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::validate_stay;
use super::{Engine, EngineError};

/// Active bookings overlapping a window, captured from one consistent
/// snapshot of a property.
///
/// Holds only the range-scan prefix (`check_in < window.check_out`); the
/// overlap filter runs lazily on each pass. Iterating it again restarts from
/// the first booking.
#[derive(Debug, Clone)]
pub struct ConflictScan {
    window: Stay,
    candidates: Vec<Booking>,
}

impl ConflictScan {
    pub fn window(&self) -> Stay {
        self.window
    }

    pub fn iter(&self) -> impl Iterator<Item = &Booking> + '_ {
        let window = self.window;
        self.candidates
            .iter()
            .filter(move |b| b.is_active() && b.stay.overlaps(&window))
    }

    pub fn ids(&self) -> Vec<BookingId> {
        self.iter().map(|b| b.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &'a ConflictScan {
    type Item = &'a Booking;
    type IntoIter = Box<dyn Iterator<Item = &'a Booking> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl Engine {
    /// True iff no pending or confirmed booking overlaps `stay`.
    pub async fn check_availability(
        &self,
        property_id: PropertyId,
        stay: Stay,
    ) -> Result<bool, EngineError> {
        validate_stay(&stay, MAX_QUERY_NIGHTS)?;
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let guard = ps.read().await;
        Ok(guard.overlapping(&stay).next().is_none())
    }

    pub async fn list_conflicts(
        &self,
        property_id: PropertyId,
        stay: Stay,
    ) -> Result<ConflictScan, EngineError> {
        validate_stay(&stay, MAX_QUERY_NIGHTS)?;
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let guard = ps.read().await;
        Ok(ConflictScan {
            window: stay,
            candidates: guard.candidates(&stay).to_vec(),
        })
    }

    /// Free sub-stays of `window`, dropping any shorter than `min_nights`.
    pub async fn free_windows(
        &self,
        property_id: PropertyId,
        window: Stay,
        min_nights: Option<i64>,
    ) -> Result<Vec<Stay>, EngineError> {
        validate_stay(&window, MAX_QUERY_NIGHTS)?;
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let guard = ps.read().await;
        let mut free = free_windows(&guard, &window);
        if let Some(min) = min_nights {
            free.retain(|s| s.nights() >= min);
        }
        Ok(free)
    }

    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        let property_id = self
            .property_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let guard = ps.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Full history of a property, cancelled bookings included, by check-in.
    pub async fn bookings(&self, property_id: PropertyId) -> Result<Vec<Booking>, EngineError> {
        let ps = self
            .property(&property_id)
            .ok_or(EngineError::PropertyNotFound(property_id))?;
        let guard = ps.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn properties(&self) -> Vec<Property> {
        let shared: Vec<_> = self.properties.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(shared.len());
        for ps in shared {
            out.push(ps.read().await.property.clone());
        }
        out.sort_by_key(|p| p.id);
        out
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn subscribe(&self, property_id: PropertyId) -> broadcast::Receiver<Event> {
        self.feed.subscribe(property_id)
    }
}
