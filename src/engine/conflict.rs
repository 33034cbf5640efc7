use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Shape and range checks shared by every operation that takes a stay.
pub(crate) fn validate_stay(stay: &Stay, max_nights: i64) -> Result<(), EngineError> {
    if !stay.is_well_formed() {
        return Err(EngineError::InvalidInterval(format!(
            "check-in {} must be before check-out {}",
            stay.check_in, stay.check_out
        )));
    }
    if stay.check_in < MIN_VALID_DATE || stay.check_out > MAX_VALID_DATE {
        return Err(EngineError::InvalidInterval(format!(
            "{stay} outside supported range"
        )));
    }
    if stay.nights() > max_nights {
        return Err(EngineError::InvalidInterval(format!(
            "{stay} longer than {max_nights} nights"
        )));
    }
    Ok(())
}

/// Validity of a reservation: well-formed, bounded and not backdated
/// unless the request is historical.
pub(crate) fn validate_request(req: &BookingRequest) -> Result<(), EngineError> {
    validate_stay(&req.stay, MAX_STAY_NIGHTS)?;
    if !req.historical && req.stay.check_in < req.submitted_on {
        return Err(EngineError::InvalidInterval(format!(
            "check-in {} is before submission date {}",
            req.stay.check_in, req.submitted_on
        )));
    }
    Ok(())
}

/// Every active booking overlapping `stay`, optionally ignoring one booking
/// (the one being confirmed).
pub(crate) fn find_conflicts(
    ps: &PropertyState,
    stay: &Stay,
    ignore: Option<BookingId>,
) -> Vec<BookingId> {
    ps.overlapping(stay)
        .filter(|b| Some(b.id) != ignore)
        .map(|b| b.id)
        .collect()
}

pub(crate) fn check_no_conflict(
    ps: &PropertyState,
    stay: &Stay,
    ignore: Option<BookingId>,
) -> Result<(), EngineError> {
    let conflicts = find_conflicts(ps, stay, ignore);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict(conflicts))
    }
}
