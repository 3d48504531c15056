//! Shipment status derived from its packages.

use fl_schemas::{OrderStatus, PackageStatus};

use crate::order::{OrderEvent, ORDER_TRANSITIONS};
use crate::table::TransitionError;

/// Event name used when a derived status cannot be reached from the current one.
pub const DERIVED_EVENT: &str = "DERIVED_FROM_PACKAGES";

/// Collapse package statuses into the single status the shipment should show.
///
/// Priority, first match wins:
/// 1. any COMPENSATION
/// 2. any IN_TROUBLES
/// 3. all CANCELLED
/// 4. every non-cancelled package RETURNING
/// 5. every non-cancelled package RETURNED
/// 6. every non-cancelled package DELIVERED or RETURNED, at least one DELIVERED
/// 7. some DELIVERED or RETURNED: ONGOING_DELIVERED
/// 8. furthest progressive status among non-cancelled packages
///
/// Returns `None` for a shipment without packages.
pub fn aggregate_package_statuses(statuses: &[PackageStatus]) -> Option<PackageStatus> {
    if statuses.is_empty() {
        return None;
    }

    let count = |s: PackageStatus| statuses.iter().filter(|x| **x == s).count();
    let total = statuses.len();
    let cancelled = count(PackageStatus::Cancelled);
    let delivered = count(PackageStatus::Delivered);
    let returning = count(PackageStatus::Returning);
    let returned = count(PackageStatus::Returned);

    if count(PackageStatus::Compensation) > 0 {
        return Some(PackageStatus::Compensation);
    }
    if count(PackageStatus::InTroubles) > 0 {
        return Some(PackageStatus::InTroubles);
    }
    if cancelled == total {
        return Some(PackageStatus::Cancelled);
    }

    let active = total - cancelled;
    if returning == active {
        return Some(PackageStatus::Returning);
    }
    if returned == active {
        return Some(PackageStatus::Returned);
    }
    if delivered + returned == active && delivered > 0 {
        return Some(PackageStatus::Delivered);
    }
    if delivered > 0 || returned > 0 {
        return Some(PackageStatus::OngoingDelivered);
    }

    let furthest = statuses
        .iter()
        .filter(|s| **s != PackageStatus::Cancelled)
        .filter_map(|s| s.progress_rank().map(|r| (r, *s)))
        .max_by_key(|(r, _)| *r)
        .map(|(_, s)| s)
        .unwrap_or(PackageStatus::Pending);
    Some(furthest)
}

/// Decide which order event, if any, brings `current` in line with `packages`.
///
/// - `Ok(None)`: nothing to do. The status already matches, the shipment is
///   terminal, the derived status belongs to the commercial flow (PENDING /
///   ON_PLANNING), or the derived status would move backwards along the
///   progressive chain.
/// - `Err`: the derived status is not reachable from `current`; the package
///   change that produced it must be rejected.
pub fn derive_order_event(
    current: OrderStatus,
    packages: &[PackageStatus],
) -> Result<Option<OrderEvent>, TransitionError> {
    let Some(derived) = aggregate_package_statuses(packages) else {
        return Ok(None);
    };
    let target = derived.as_order_status();

    if target == current || current.is_terminal() {
        return Ok(None);
    }
    if matches!(target, OrderStatus::Pending | OrderStatus::OnPlanning) {
        return Ok(None);
    }
    if let (Some(have), Some(want)) = (current.progress_rank(), target.progress_rank()) {
        if want < have {
            return Ok(None);
        }
    }

    match ORDER_TRANSITIONS.event_between(current, target) {
        Some(ev) => Ok(Some(ev)),
        None => Err(TransitionError::new(current, target, DERIVED_EVENT)),
    }
}
