use crate::model::*;

// ── Free-window computation ──────────────────────────────────────

/// Maximal free sub-stays of `window`: the window minus every active
/// booking on the property, clamped to the window.
pub fn free_windows(ps: &PropertyState, window: &Stay) -> Vec<Stay> {
    let mut taken: Vec<Stay> = ps
        .overlapping(window)
        .map(|b| {
            Stay::new(
                b.stay.check_in.max(window.check_in),
                b.stay.check_out.min(window.check_out),
            )
        })
        .collect();
    taken.sort_by_key(|s| s.check_in);
    let taken = merge_adjacent(&taken);
    subtract_stays(&[*window], &taken)
}

/// Merge sorted stays that overlap or touch into single stays.
pub fn merge_adjacent(sorted: &[Stay]) -> Vec<Stay> {
    let mut merged: Vec<Stay> = Vec::with_capacity(sorted.len());
    for s in sorted {
        if let Some(last) = merged.last_mut()
            && s.check_in <= last.check_out
        {
            last.check_out = last.check_out.max(s.check_out);
            continue;
        }
        merged.push(*s);
    }
    merged
}

/// Subtract sorted, merged `to_remove` from sorted `base`.
pub fn subtract_stays(base: &[Stay], to_remove: &[Stay]) -> Vec<Stay> {
    let mut result = Vec::new();
    let mut j = 0;
    for b in base {
        let mut cursor = b.check_in;
        while j < to_remove.len() && to_remove[j].check_out <= cursor {
            j += 1;
        }
        let mut k = j;
        while k < to_remove.len() && to_remove[k].check_in < b.check_out {
            let r = &to_remove[k];
            if r.check_in > cursor {
                result.push(Stay::new(cursor, r.check_in));
            }
            cursor = cursor.max(r.check_out);
            k += 1;
        }
        if cursor < b.check_out {
            result.push(Stay::new(cursor, b.check_out));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ulid::Ulid;

    use super::*;
    use crate::model::date;

    fn jan(from: u32, to: u32) -> Stay {
        Stay::new(date(2025, 1, from), date(2025, 1, to))
    }

    fn state_with(stays: &[(Stay, BookingStatus)]) -> PropertyState {
        let mut ps = PropertyState::new(Property {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            nightly_price: 9_000,
        });
        let now = Utc::now();
        for (stay, status) in stays {
            ps.insert_booking(Booking {
                id: Ulid::new(),
                property_id: ps.id(),
                user_id: Ulid::new(),
                stay: *stay,
                status: *status,
                total_price: 0,
                created_at: now,
                updated_at: now,
            });
        }
        ps
    }

    #[test]
    fn empty_property_is_entirely_free() {
        let ps = state_with(&[]);
        assert_eq!(free_windows(&ps, &jan(1, 31)), vec![jan(1, 31)]);
    }

    #[test]
    fn bookings_punch_holes() {
        let ps = state_with(&[
            (jan(5, 8), BookingStatus::Confirmed),
            (jan(12, 15), BookingStatus::Pending),
        ]);
        assert_eq!(
            free_windows(&ps, &jan(1, 20)),
            vec![jan(1, 5), jan(8, 12), jan(15, 20)]
        );
    }

    #[test]
    fn cancelled_bookings_do_not_block() {
        let ps = state_with(&[(jan(5, 8), BookingStatus::Cancelled)]);
        assert_eq!(free_windows(&ps, &jan(1, 10)), vec![jan(1, 10)]);
    }

    #[test]
    fn back_to_back_bookings_leave_no_gap() {
        let ps = state_with(&[
            (jan(10, 15), BookingStatus::Confirmed),
            (jan(15, 20), BookingStatus::Confirmed),
        ]);
        assert_eq!(free_windows(&ps, &jan(8, 22)), vec![jan(8, 10), jan(20, 22)]);
    }

    #[test]
    fn booking_covering_window_leaves_nothing() {
        let ps = state_with(&[(jan(1, 31), BookingStatus::Pending)]);
        assert!(free_windows(&ps, &jan(10, 12)).is_empty());
    }

    #[test]
    fn merge_adjacent_joins_touching() {
        let merged = merge_adjacent(&[jan(1, 3), jan(3, 5), jan(4, 9), jan(12, 13)]);
        assert_eq!(merged, vec![jan(1, 9), jan(12, 13)]);
    }

    #[test]
    fn subtract_removes_overlaps() {
        let out = subtract_stays(&[jan(1, 10), jan(20, 25)], &[jan(3, 4), jan(9, 21)]);
        assert_eq!(out, vec![jan(1, 3), jan(4, 9), jan(21, 25)]);
    }
}
