//! Row decoding. Column lists live next to the decoder that reads them.

use std::str::FromStr;

use anyhow::{Context, Result};
use fl_schemas::{
    CompensationAssessment, HeldPackage, Issue, OffRouteEvent, Package, Shipment, Trip,
    UnknownStatus, VehicleReservation,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

fn status<S: FromStr<Err = UnknownStatus>>(row: &PgRow, col: &str) -> Result<S> {
    let raw: String = row.try_get(col).with_context(|| format!("read {col}"))?;
    Ok(raw.parse::<S>()?)
}

pub(crate) const SHIPMENT_COLS: &str = "id, status, version, created_at, updated_at";

pub(crate) fn shipment(row: &PgRow) -> Result<Shipment> {
    Ok(Shipment {
        id: row.try_get::<Uuid, _>("id")?.into(),
        status: status(row, "status")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) const PACKAGE_COLS: &str = "id, shipment_id, trip_id, status, version, updated_at";

pub(crate) fn package(row: &PgRow) -> Result<Package> {
    Ok(Package {
        id: row.try_get::<Uuid, _>("id")?.into(),
        shipment_id: row.try_get::<Uuid, _>("shipment_id")?.into(),
        trip_id: row.try_get::<Option<Uuid>, _>("trip_id")?.map(Into::into),
        status: status(row, "status")?,
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) const TRIP_COLS: &str =
    "id, shipment_id, vehicle_id, driver_ids, trip_date, status, version, created_at, closed_at";

pub(crate) fn trip(row: &PgRow) -> Result<Trip> {
    let drivers: Vec<Uuid> = row.try_get("driver_ids")?;
    Ok(Trip {
        id: row.try_get::<Uuid, _>("id")?.into(),
        shipment_id: row.try_get::<Uuid, _>("shipment_id")?.into(),
        vehicle_id: row.try_get::<Uuid, _>("vehicle_id")?.into(),
        driver_ids: drivers.into_iter().map(Into::into).collect(),
        trip_date: row.try_get("trip_date")?,
        status: status(row, "status")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

pub(crate) const RESERVATION_COLS: &str =
    "id, vehicle_id, trip_date, shipment_id, status, expires_at, created_at, updated_at";

pub(crate) fn reservation(row: &PgRow) -> Result<VehicleReservation> {
    Ok(VehicleReservation {
        id: row.try_get::<Uuid, _>("id")?.into(),
        vehicle_id: row.try_get::<Uuid, _>("vehicle_id")?.into(),
        trip_date: row.try_get("trip_date")?,
        shipment_id: row.try_get::<Uuid, _>("shipment_id")?.into(),
        status: status(row, "status")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) const OFFROUTE_COLS: &str = r#"
    id, trip_id, status, started_at, last_seen_at, last_lat, last_lng, distance_m,
    previous_distance_m, yellow_sent_at, red_sent_at, contacted_at, contacted_by,
    contact_notes, can_contact_driver, grace_expires_at, extension_count, resolved_at,
    resolution, issue_id, version
"#;

pub(crate) fn offroute_event(row: &PgRow) -> Result<OffRouteEvent> {
    let extensions: i32 = row.try_get("extension_count")?;
    Ok(OffRouteEvent {
        id: row.try_get::<Uuid, _>("id")?.into(),
        trip_id: row.try_get::<Uuid, _>("trip_id")?.into(),
        status: status(row, "status")?,
        started_at: row.try_get("started_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        last_lat: row.try_get("last_lat")?,
        last_lng: row.try_get("last_lng")?,
        distance_m: row.try_get("distance_m")?,
        previous_distance_m: row.try_get("previous_distance_m")?,
        yellow_sent_at: row.try_get("yellow_sent_at")?,
        red_sent_at: row.try_get("red_sent_at")?,
        contacted_at: row.try_get("contacted_at")?,
        contacted_by: row.try_get("contacted_by")?,
        contact_notes: row.try_get("contact_notes")?,
        can_contact_driver: row.try_get("can_contact_driver")?,
        grace_expires_at: row.try_get("grace_expires_at")?,
        extension_count: u32::try_from(extensions).context("negative extension_count")?,
        resolved_at: row.try_get("resolved_at")?,
        resolution: row.try_get("resolution")?,
        issue_id: row.try_get::<Option<Uuid>, _>("issue_id")?.map(Into::into),
        version: row.try_get("version")?,
    })
}

pub(crate) const ISSUE_COLS: &str = r#"
    id, shipment_id, trip_id, category, status, reporter, description, held_packages,
    off_route_event_id, resolution_note, created_at, resolved_at, version
"#;

pub(crate) fn issue(row: &PgRow) -> Result<Issue> {
    let Json(held_packages): Json<Vec<HeldPackage>> = row.try_get("held_packages")?;
    Ok(Issue {
        id: row.try_get::<Uuid, _>("id")?.into(),
        shipment_id: row.try_get::<Uuid, _>("shipment_id")?.into(),
        trip_id: row.try_get::<Option<Uuid>, _>("trip_id")?.map(Into::into),
        category: status(row, "category")?,
        status: status(row, "status")?,
        reporter: status(row, "reporter")?,
        description: row.try_get("description")?,
        held_packages,
        off_route_event_id: row
            .try_get::<Option<Uuid>, _>("off_route_event_id")?
            .map(Into::into),
        resolution_note: row.try_get("resolution_note")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
        version: row.try_get("version")?,
    })
}

pub(crate) const ASSESSMENT_COLS: &str =
    "id, issue_id, status, input, decision, adjusted_payout, adjust_reason, updated_at, version";

pub(crate) fn assessment(row: &PgRow) -> Result<CompensationAssessment> {
    let input: Option<Json<_>> = row.try_get("input")?;
    let decision: Option<Json<_>> = row.try_get("decision")?;
    Ok(CompensationAssessment {
        id: row.try_get::<Uuid, _>("id")?.into(),
        issue_id: row.try_get::<Uuid, _>("issue_id")?.into(),
        status: status(row, "status")?,
        input: input.map(|Json(v)| v),
        decision: decision.map(|Json(v)| v),
        adjusted_payout: row.try_get("adjusted_payout")?,
        adjust_reason: row.try_get("adjust_reason")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}
