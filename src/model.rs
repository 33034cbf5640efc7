use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type PropertyId = Ulid;
pub type BookingId = Ulid;
pub type UserId = Ulid;

/// Price in minor currency units (cents).
pub type Cents = i64;

/// Half-open stay `[check_in, check_out)`. One night per date in the range.
///
/// Construction does not validate ordering; the engine rejects
/// `check_in >= check_out` with `InvalidInterval` instead of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    pub fn is_well_formed(&self) -> bool {
        self.check_in < self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Checkout day equal to the other's check-in day is not an overlap.
    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl std::fmt::Display for Stay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Pending and confirmed bookings both hold their nights.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub owner_id: UserId,
    pub nightly_price: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub stay: Stay,
    pub status: BookingStatus,
    pub total_price: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A reservation attempt as submitted by a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub stay: Stay,
    /// Date the request was made; stays may not start before it.
    pub submitted_on: NaiveDate,
    /// Seed or imported data that is allowed to lie in the past.
    pub historical: bool,
}

impl BookingRequest {
    pub fn new(property_id: PropertyId, user_id: UserId, stay: Stay) -> Self {
        Self {
            property_id,
            user_id,
            stay,
            submitted_on: Utc::now().date_naive(),
            historical: false,
        }
    }

    pub fn submitted_on(mut self, date: NaiveDate) -> Self {
        self.submitted_on = date;
        self
    }

    pub fn historical(mut self) -> Self {
        self.historical = true;
        self
    }
}

/// Per-property booking table. This is what the per-property lock guards.
#[derive(Debug, Clone)]
pub struct PropertyState {
    pub property: Property,
    /// Every booking ever made on the property, cancelled included,
    /// sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl PropertyState {
    pub fn new(property: Property) -> Self {
        Self {
            property,
            bookings: Vec::new(),
        }
    }

    pub fn id(&self) -> PropertyId {
        self.property.id
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.stay.check_in <= booking.stay.check_in);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose prefix range `check_in < query.check_out` can overlap `query`.
    pub fn candidates(&self, query: &Stay) -> &[Booking] {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        &self.bookings[..right_bound]
    }

    /// Active bookings overlapping the query window.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        let query = *query;
        self.candidates(&query)
            .iter()
            .filter(move |b| b.is_active() && b.stay.check_out > query.check_in)
    }
}

/// Journal record. Flat; one variant per state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PropertyRegistered {
        property: Property,
    },
    BookingReserved {
        booking: Booking,
    },
    BookingConfirmed {
        id: BookingId,
        property_id: PropertyId,
        at: DateTime<Utc>,
    },
    BookingCancelled {
        id: BookingId,
        property_id: PropertyId,
        at: DateTime<Utc>,
    },
    /// Written by compaction: a booking in its final state.
    BookingRestored {
        booking: Booking,
    },
}

impl Event {
    pub fn property_id(&self) -> PropertyId {
        match self {
            Event::PropertyRegistered { property } => property.id,
            Event::BookingReserved { booking } | Event::BookingRestored { booking } => {
                booking.property_id
            }
            Event::BookingConfirmed { property_id, .. }
            | Event::BookingCancelled { property_id, .. } => *property_id,
        }
    }
}

#[cfg(test)]
pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
