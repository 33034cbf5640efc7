use chrono::NaiveDate;

/// Longest stay accepted in a single booking.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Highest nightly price a property may register with; the longest stay at
/// this price still fits in `Cents`.
pub const MAX_NIGHTLY_PRICE: i64 = i64::MAX / MAX_STAY_NIGHTS;

/// Widest window accepted by availability queries.
pub const MAX_QUERY_NIGHTS: i64 = 3 * 366;

/// Most properties one engine will register.
pub const MAX_PROPERTIES: usize = 1_000_000;

/// Most bookings (cancelled included) kept on one property.
pub const MAX_BOOKINGS_PER_PROPERTY: usize = 100_000;

/// Earliest date the engine accepts anywhere in a stay.
pub const MIN_VALID_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid MIN_VALID_DATE"),
};

/// Latest date the engine accepts anywhere in a stay.
pub const MAX_VALID_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2200, 12, 31) {
    Some(d) => d,
    None => panic!("invalid MAX_VALID_DATE"),
};

/// Largest journal record the replayer will allocate for.
pub const MAX_RECORD_BYTES: usize = 1 << 20;
