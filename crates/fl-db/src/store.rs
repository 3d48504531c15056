use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fl_lifecycle::{LifecycleStore, ReservationOp, UnitOfWork, Write};
use fl_reservation::{NewReservation, ReservationStore, ReserveOutcome};
use fl_schemas::{
    CompensationAssessment, Issue, IssueId, IssueSnapshot, OffRouteEvent, OffRouteEventId,
    Package, PackageId, ReservationId, ReservationStatus, Shipment, ShipmentId, ShipmentSnapshot,
    StoreError, Trip, TripId, VehicleId, VehicleReservation, Versioned,
};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::is_unique_constraint_violation;
use crate::rows::{
    self, ASSESSMENT_COLS, ISSUE_COLS, OFFROUTE_COLS, PACKAGE_COLS, RESERVATION_COLS, SHIPMENT_COLS,
    TRIP_COLS,
};

const UQ_RESERVATION_ACTIVE: &str = "uq_vehicle_reservation_active";

/// Off-route statuses that no longer count as an open deviation.
const OFFROUTE_TERMINAL: &str = "('RESOLVED_SAFE','ISSUE_CREATED','BACK_ON_ROUTE')";

/// A reservation that still holds its slot at `$now`.
const LIVE_HOLD: &str =
    "(status = 'CONSUMED' or (status = 'RESERVED' and (expires_at is null or expires_at > $now)))";

/// Postgres-backed [`LifecycleStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn live_hold(now_param: &str) -> String {
    LIVE_HOLD.replace("$now", now_param)
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

#[async_trait]
impl ReservationStore for PgStore {
    async fn try_reserve(
        &self,
        req: NewReservation,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut tx = self.pool.begin().await.context("begin try_reserve")?;

        // Lapsed holds never block; cancel them under this transaction first
        // and hand them back so their shipments get the expiry handling.
        let sql = format!(
            "update vehicle_reservations \
                set status = 'CANCELLED', updated_at = $3 \
              where vehicle_id = $1 and trip_date = $2 \
                and status = 'RESERVED' and expires_at is not null and expires_at <= $3 \
             returning {RESERVATION_COLS}"
        );
        let lapsed = sqlx::query(&sql)
            .bind(req.vehicle_id.as_uuid())
            .bind(req.trip_date)
            .bind(now)
            .fetch_all(&mut *tx)
            .await
            .context("cancel lapsed holds in slot failed")?;
        let displaced = lapsed
            .iter()
            .map(rows::reservation)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let sql = format!(
            "select {RESERVATION_COLS} from vehicle_reservations \
             where vehicle_id = $1 and trip_date = $2 and status in ('RESERVED','CONSUMED') \
             for update"
        );
        let holder = sqlx::query(&sql)
            .bind(req.vehicle_id.as_uuid())
            .bind(req.trip_date)
            .fetch_optional(&mut *tx)
            .await
            .context("select slot holder failed")?;
        if let Some(row) = holder {
            let holder = rows::reservation(&row)?;
            tx.commit().await.context("commit try_reserve")?;
            return Ok(outcome_for(holder, req.shipment_id));
        }

        let row = VehicleReservation {
            id: ReservationId::new(),
            vehicle_id: req.vehicle_id,
            trip_date: req.trip_date,
            shipment_id: req.shipment_id,
            status: ReservationStatus::Reserved,
            expires_at: req.expires_at,
            created_at: now,
            updated_at: now,
        };
        let inserted = sqlx::query(
            r#"
            insert into vehicle_reservations
              (id, vehicle_id, trip_date, shipment_id, status, expires_at, created_at, updated_at)
            values ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.vehicle_id.as_uuid())
        .bind(row.trip_date)
        .bind(row.shipment_id.as_uuid())
        .bind(row.status.as_str())
        .bind(row.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await.context("commit try_reserve")?;
                Ok(ReserveOutcome::Reserved {
                    reservation: row,
                    displaced,
                })
            }
            Err(err) if is_unique_constraint_violation(&err, UQ_RESERVATION_ACTIVE) => {
                // A concurrent insert won the slot after our read.
                drop(tx);
                info!(vehicle_id = %req.vehicle_id, trip_date = %req.trip_date, "reservation race lost");
                match self
                    .active_holder(req.vehicle_id, req.trip_date, None, now)
                    .await?
                {
                    Some(holder) => Ok(outcome_for(holder, req.shipment_id)),
                    None => Err(StoreError::Backend(anyhow!(
                        "slot {} {} contended and released; retry",
                        req.vehicle_id,
                        req.trip_date
                    ))),
                }
            }
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("insert vehicle_reservations failed"),
            )),
        }
    }

    async fn consume(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.context("acquire")?;
        Ok(consume_on(&mut *conn, shipment, now).await?)
    }

    async fn release(&self, shipment: ShipmentId, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.context("acquire")?;
        Ok(release_on(&mut *conn, shipment, now).await?)
    }

    async fn release_one(&self, id: ReservationId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            update vehicle_reservations
               set status = 'CANCELLED', updated_at = $2
             where id = $1 and status in ('RESERVED','CONSUMED')
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("release_one failed")?;
        Ok(res.rows_affected() > 0)
    }

    async fn clear_deadline(
        &self,
        shipment: ShipmentId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await.context("acquire")?;
        Ok(clear_deadline_on(&mut *conn, shipment, now).await?)
    }

    async fn active_holder(
        &self,
        vehicle: VehicleId,
        trip_date: NaiveDate,
        exclude: Option<ShipmentId>,
        now: DateTime<Utc>,
    ) -> Result<Option<VehicleReservation>, StoreError> {
        let sql = format!(
            "select {RESERVATION_COLS} from vehicle_reservations \
             where vehicle_id = $1 and trip_date = $2 \
               and ($3::uuid is null or shipment_id <> $3) \
               and {} \
             limit 1",
            live_hold("$4")
        );
        let row = sqlx::query(&sql)
            .bind(vehicle.as_uuid())
            .bind(trip_date)
            .bind(exclude.map(|s| s.as_uuid()))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .context("active_holder failed")?;
        Ok(row.as_ref().map(rows::reservation).transpose()?)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<VehicleReservation>, StoreError> {
        let sql = format!(
            "update vehicle_reservations \
                set status = 'CANCELLED', updated_at = $1 \
              where status = 'RESERVED' and expires_at is not null and expires_at <= $1 \
             returning {RESERVATION_COLS}"
        );
        let found = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .context("expire_due failed")?;
        let expired = found
            .iter()
            .map(rows::reservation)
            .collect::<anyhow::Result<Vec<_>>>()?;
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired unpaid vehicle holds");
        }
        Ok(expired)
    }

    async fn list_for_shipment(
        &self,
        shipment: ShipmentId,
    ) -> Result<Vec<VehicleReservation>, StoreError> {
        let sql = format!(
            "select {RESERVATION_COLS} from vehicle_reservations \
             where shipment_id = $1 order by created_at, id"
        );
        let found = sqlx::query(&sql)
            .bind(shipment.as_uuid())
            .fetch_all(&self.pool)
            .await
            .context("list reservations for shipment failed")?;
        Ok(found
            .iter()
            .map(rows::reservation)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }
}

fn outcome_for(holder: VehicleReservation, requester: ShipmentId) -> ReserveOutcome {
    if holder.shipment_id == requester {
        ReserveOutcome::AlreadyHeld(holder)
    } else {
        ReserveOutcome::Conflict { holder }
    }
}

async fn consume_on(
    conn: &mut PgConnection,
    shipment: ShipmentId,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let res = sqlx::query(
        r#"
        update vehicle_reservations
           set status = 'CONSUMED', expires_at = null, updated_at = $2
         where shipment_id = $1 and status = 'RESERVED'
           and (expires_at is null or expires_at > $2)
        "#,
    )
    .bind(shipment.as_uuid())
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("consume reservations failed")?;
    Ok(res.rows_affected())
}

async fn release_on(
    conn: &mut PgConnection,
    shipment: ShipmentId,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let res = sqlx::query(
        r#"
        update vehicle_reservations
           set status = 'CANCELLED', updated_at = $2
         where shipment_id = $1 and status in ('RESERVED','CONSUMED')
        "#,
    )
    .bind(shipment.as_uuid())
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("release reservations failed")?;
    Ok(res.rows_affected())
}

async fn clear_deadline_on(
    conn: &mut PgConnection,
    shipment: ShipmentId,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let res = sqlx::query(
        r#"
        update vehicle_reservations
           set expires_at = null, updated_at = $2
         where shipment_id = $1 and status = 'RESERVED'
           and expires_at is not null and expires_at > $2
        "#,
    )
    .bind(shipment.as_uuid())
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("clear reservation deadline failed")?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Entity writes
// ---------------------------------------------------------------------------

/// Insert / version-guarded update for one table.
#[async_trait]
trait Persist: Versioned + Send + Sync {
    const TABLE: &'static str;

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()>;

    /// Rows affected by `... where id = $1 and version = expected`.
    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64>;
}

#[async_trait]
impl Persist for Shipment {
    const TABLE: &'static str = "shipments";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            insert into shipments (id, status, version, created_at, updated_at)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await
        .context("insert shipments failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            update shipments set status = $2, version = $3, updated_at = $4
             where id = $1 and version = $5
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.updated_at)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update shipments failed")?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl Persist for Package {
    const TABLE: &'static str = "packages";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            insert into packages (id, shipment_id, trip_id, status, version, updated_at)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.shipment_id.as_uuid())
        .bind(self.trip_id.map(|t| t.as_uuid()))
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await
        .context("insert packages failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            update packages set trip_id = $2, status = $3, version = $4, updated_at = $5
             where id = $1 and version = $6
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.trip_id.map(|t| t.as_uuid()))
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.updated_at)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update packages failed")?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl Persist for Trip {
    const TABLE: &'static str = "trips";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        let drivers: Vec<Uuid> = self.driver_ids.iter().map(|d| d.as_uuid()).collect();
        sqlx::query(
            r#"
            insert into trips
              (id, shipment_id, vehicle_id, driver_ids, trip_date, status, version, created_at, closed_at)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.shipment_id.as_uuid())
        .bind(self.vehicle_id.as_uuid())
        .bind(drivers)
        .bind(self.trip_date)
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.created_at)
        .bind(self.closed_at)
        .execute(&mut *conn)
        .await
        .context("insert trips failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            update trips set status = $2, version = $3, closed_at = $4
             where id = $1 and version = $5
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.version)
        .bind(self.closed_at)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update trips failed")?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl Persist for Issue {
    const TABLE: &'static str = "issues";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            insert into issues
              (id, shipment_id, trip_id, category, status, reporter, description, held_packages,
               off_route_event_id, resolution_note, created_at, resolved_at, version)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.shipment_id.as_uuid())
        .bind(self.trip_id.map(|t| t.as_uuid()))
        .bind(self.category.as_str())
        .bind(self.status.as_str())
        .bind(self.reporter.as_str())
        .bind(&self.description)
        .bind(Json(&self.held_packages))
        .bind(self.off_route_event_id.map(|e| e.as_uuid()))
        .bind(&self.resolution_note)
        .bind(self.created_at)
        .bind(self.resolved_at)
        .bind(self.version)
        .execute(&mut *conn)
        .await
        .context("insert issues failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            update issues
               set status = $2, held_packages = $3, resolution_note = $4, resolved_at = $5,
                   version = $6
             where id = $1 and version = $7
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(Json(&self.held_packages))
        .bind(&self.resolution_note)
        .bind(self.resolved_at)
        .bind(self.version)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update issues failed")?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl Persist for OffRouteEvent {
    const TABLE: &'static str = "off_route_events";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        let extensions = i32::try_from(self.extension_count).context("extension_count overflow")?;
        sqlx::query(
            r#"
            insert into off_route_events
              (id, trip_id, status, started_at, last_seen_at, last_lat, last_lng, distance_m,
               previous_distance_m, yellow_sent_at, red_sent_at, contacted_at, contacted_by,
               contact_notes, can_contact_driver, grace_expires_at, extension_count, resolved_at,
               resolution, issue_id, version)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.trip_id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.started_at)
        .bind(self.last_seen_at)
        .bind(self.last_lat)
        .bind(self.last_lng)
        .bind(self.distance_m)
        .bind(self.previous_distance_m)
        .bind(self.yellow_sent_at)
        .bind(self.red_sent_at)
        .bind(self.contacted_at)
        .bind(&self.contacted_by)
        .bind(&self.contact_notes)
        .bind(self.can_contact_driver)
        .bind(self.grace_expires_at)
        .bind(extensions)
        .bind(self.resolved_at)
        .bind(&self.resolution)
        .bind(self.issue_id.map(|i| i.as_uuid()))
        .bind(self.version)
        .execute(&mut *conn)
        .await
        .context("insert off_route_events failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let extensions = i32::try_from(self.extension_count).context("extension_count overflow")?;
        let res = sqlx::query(
            r#"
            update off_route_events
               set status = $2, last_seen_at = $3, last_lat = $4, last_lng = $5, distance_m = $6,
                   previous_distance_m = $7, yellow_sent_at = $8, red_sent_at = $9,
                   contacted_at = $10, contacted_by = $11, contact_notes = $12,
                   can_contact_driver = $13, grace_expires_at = $14, extension_count = $15,
                   resolved_at = $16, resolution = $17, issue_id = $18, version = $19
             where id = $1 and version = $20
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.last_seen_at)
        .bind(self.last_lat)
        .bind(self.last_lng)
        .bind(self.distance_m)
        .bind(self.previous_distance_m)
        .bind(self.yellow_sent_at)
        .bind(self.red_sent_at)
        .bind(self.contacted_at)
        .bind(&self.contacted_by)
        .bind(&self.contact_notes)
        .bind(self.can_contact_driver)
        .bind(self.grace_expires_at)
        .bind(extensions)
        .bind(self.resolved_at)
        .bind(&self.resolution)
        .bind(self.issue_id.map(|i| i.as_uuid()))
        .bind(self.version)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update off_route_events failed")?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl Persist for CompensationAssessment {
    const TABLE: &'static str = "compensation_assessments";

    async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            insert into compensation_assessments
              (id, issue_id, status, input, decision, adjusted_payout, adjust_reason, updated_at, version)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.issue_id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.input.as_ref().map(Json))
        .bind(self.decision.as_ref().map(Json))
        .bind(self.adjusted_payout)
        .bind(&self.adjust_reason)
        .bind(self.updated_at)
        .bind(self.version)
        .execute(&mut *conn)
        .await
        .context("insert compensation_assessments failed")?;
        Ok(())
    }

    async fn update(&self, conn: &mut PgConnection, expected: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            update compensation_assessments
               set status = $2, input = $3, decision = $4, adjusted_payout = $5,
                   adjust_reason = $6, updated_at = $7, version = $8
             where id = $1 and version = $9
            "#,
        )
        .bind(self.id.as_uuid())
        .bind(self.status.as_str())
        .bind(self.input.as_ref().map(Json))
        .bind(self.decision.as_ref().map(Json))
        .bind(self.adjusted_payout)
        .bind(&self.adjust_reason)
        .bind(self.updated_at)
        .bind(self.version)
        .bind(expected)
        .execute(&mut *conn)
        .await
        .context("update compensation_assessments failed")?;
        Ok(res.rows_affected())
    }
}

async fn write_all<T: Persist>(
    conn: &mut PgConnection,
    writes: &[Write<T>],
) -> Result<(), StoreError> {
    for w in writes {
        match w {
            Write::Insert(record) => record.insert(conn).await?,
            Write::Update {
                record,
                expected_version,
            } => {
                if record.update(conn, *expected_version).await? == 0 {
                    let sql = format!("select exists (select 1 from {} where id = $1)", T::TABLE);
                    let exists: bool = sqlx::query_scalar(&sql)
                        .bind(record.key())
                        .fetch_one(&mut *conn)
                        .await
                        .with_context(|| format!("{} exists check failed", T::TABLE))?;
                    return Err(if exists {
                        StoreError::stale(T::ENTITY, record.key(), *expected_version)
                    } else {
                        StoreError::not_found(T::ENTITY, record.key())
                    });
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lifecycle store
// ---------------------------------------------------------------------------

impl PgStore {
    async fn fetch_one_by_id<T: Send>(
        &self,
        cols: &str,
        table: &str,
        entity: &'static str,
        id: Uuid,
        decode: fn(&sqlx::postgres::PgRow) -> anyhow::Result<T>,
    ) -> Result<T, StoreError> {
        let sql = format!("select {cols} from {table} where id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("load {entity} failed"))?
            .ok_or_else(|| StoreError::not_found(entity, id))?;
        Ok(decode(&row)?)
    }

    async fn fetch_many<T: Send>(
        &self,
        sql: &str,
        key: Option<Uuid>,
        what: &str,
        decode: fn(&sqlx::postgres::PgRow) -> anyhow::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut q = sqlx::query(sql);
        if let Some(key) = key {
            q = q.bind(key);
        }
        let found = q
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("{what} failed"))?;
        Ok(found.iter().map(decode).collect::<anyhow::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl LifecycleStore for PgStore {
    async fn load_shipment(&self, id: ShipmentId) -> Result<ShipmentSnapshot, StoreError> {
        let shipment = self
            .fetch_one_by_id(SHIPMENT_COLS, "shipments", "shipment", id.as_uuid(), rows::shipment)
            .await?;
        let sql = format!("select {PACKAGE_COLS} from packages where shipment_id = $1 order by id");
        let packages = self
            .fetch_many(&sql, Some(id.as_uuid()), "load packages", rows::package)
            .await?;
        Ok(ShipmentSnapshot { shipment, packages })
    }

    async fn load_package(&self, id: PackageId) -> Result<Package, StoreError> {
        self.fetch_one_by_id(PACKAGE_COLS, "packages", "package", id.as_uuid(), rows::package)
            .await
    }

    async fn load_trip(&self, id: TripId) -> Result<Trip, StoreError> {
        self.fetch_one_by_id(TRIP_COLS, "trips", "trip", id.as_uuid(), rows::trip)
            .await
    }

    async fn trips_for_shipment(&self, id: ShipmentId) -> Result<Vec<Trip>, StoreError> {
        let sql = format!(
            "select {TRIP_COLS} from trips where shipment_id = $1 order by created_at, id"
        );
        self.fetch_many(&sql, Some(id.as_uuid()), "trips for shipment", rows::trip)
            .await
    }

    async fn active_offroute_event(
        &self,
        trip: TripId,
    ) -> Result<Option<OffRouteEvent>, StoreError> {
        let sql = format!(
            "select {OFFROUTE_COLS} from off_route_events \
             where trip_id = $1 and status not in {OFFROUTE_TERMINAL}"
        );
        let row = sqlx::query(&sql)
            .bind(trip.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .context("active off-route event failed")?;
        Ok(row.as_ref().map(rows::offroute_event).transpose()?)
    }

    async fn load_offroute_event(&self, id: OffRouteEventId) -> Result<OffRouteEvent, StoreError> {
        self.fetch_one_by_id(
            OFFROUTE_COLS,
            "off_route_events",
            "off_route_event",
            id.as_uuid(),
            rows::offroute_event,
        )
        .await
    }

    async fn active_offroute_events(&self) -> Result<Vec<OffRouteEvent>, StoreError> {
        let sql = format!(
            "select {OFFROUTE_COLS} from off_route_events \
             where status not in {OFFROUTE_TERMINAL} order by started_at, id"
        );
        self.fetch_many(&sql, None, "active off-route events", rows::offroute_event)
            .await
    }

    async fn load_issue(&self, id: IssueId) -> Result<IssueSnapshot, StoreError> {
        let issue = self
            .fetch_one_by_id(ISSUE_COLS, "issues", "issue", id.as_uuid(), rows::issue)
            .await?;
        let sql = format!(
            "select {ASSESSMENT_COLS} from compensation_assessments where issue_id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .context("load assessment failed")?;
        let assessment = row.as_ref().map(rows::assessment).transpose()?;
        Ok(IssueSnapshot { issue, assessment })
    }

    async fn issues_for_shipment(&self, id: ShipmentId) -> Result<Vec<Issue>, StoreError> {
        let sql = format!(
            "select {ISSUE_COLS} from issues where shipment_id = $1 order by created_at, id"
        );
        self.fetch_many(&sql, Some(id.as_uuid()), "issues for shipment", rows::issue)
            .await
    }

    async fn commit(&self, uow: UnitOfWork) -> Result<(), StoreError> {
        if uow.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.context("begin commit")?;

        // Parents before children: packages reference trips, off-route
        // events reference issues.
        write_all(&mut *tx, &uow.shipments).await?;
        write_all(&mut *tx, &uow.trips).await?;
        write_all(&mut *tx, &uow.packages).await?;
        write_all(&mut *tx, &uow.issues).await?;
        write_all(&mut *tx, &uow.offroute_events).await?;
        write_all(&mut *tx, &uow.assessments).await?;

        for op in &uow.reservations {
            match *op {
                ReservationOp::Consume(s) => consume_on(&mut *tx, s, uow.at).await?,
                ReservationOp::Release(s) => release_on(&mut *tx, s, uow.at).await?,
                ReservationOp::ClearDeadline(s) => clear_deadline_on(&mut *tx, s, uow.at).await?,
            };
        }

        tx.commit().await.context("commit unit of work")?;
        debug!(
            at = %uow.at,
            shipments = uow.shipments.len(),
            packages = uow.packages.len(),
            issues = uow.issues.len(),
            "unit of work committed"
        );
        Ok(())
    }
}
