//! Booking availability and conflict detection for short-term rentals.
//!
//! The [`engine::Engine`] owns one rule: for a given property, no two pending
//! or confirmed bookings may share a night. Stays are half-open
//! `[check_in, check_out)`, so a guest may check in on the day the previous
//! guest checks out.

pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod feed;
pub mod journal;
pub mod limits;
pub mod model;
pub mod observability;
