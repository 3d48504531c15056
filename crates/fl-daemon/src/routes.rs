//! Axum router and all HTTP handlers for fl-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are thin: they decode the request, call one
//! coordinator operation and encode its result. Every coordinator error goes
//! through [`ApiError`] so status codes are decided in one place.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use fl_lifecycle::{IssueReport, LifecycleError, LifecycleStore, TripAssignment};
use fl_schemas::{IssueId, PackageId, ShipmentId, TelemetrySample, TripId, VehicleId};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        AdjustRequest, AvailabilityQuery, AvailabilityResponse, CancelRequest,
        CreateShipmentRequest, DepositRequest, ErrorResponse, HealthResponse, OrderEventRequest,
        PackageEventRequest, ProposeRequest, ResolveRequest, StaffActionRequest,
        TripEventRequest,
    },
    state::{offroute_tick, reservation_sweep, uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        // shipments
        .route("/v1/shipments", post(create_shipment))
        .route("/v1/shipments/:id", get(get_shipment))
        .route("/v1/shipments/:id/order-events", post(order_event))
        .route("/v1/shipments/:id/deposit", post(confirm_deposit))
        .route("/v1/shipments/:id/cancel", post(cancel_shipment))
        .route("/v1/shipments/:id/reservations", get(shipment_reservations))
        .route("/v1/shipments/:id/trips", get(shipment_trips))
        .route("/v1/shipments/:id/issues", get(shipment_issues))
        .route("/v1/packages/:id/events", post(package_event))
        // trips and off-route
        .route("/v1/trips", post(assign_trip))
        .route("/v1/trips/:id/events", post(trip_event))
        .route("/v1/trips/:id/telemetry", post(telemetry))
        .route("/v1/trips/:id/offroute", get(active_offroute))
        .route("/v1/trips/:id/offroute/contact", post(offroute_contact))
        .route("/v1/trips/:id/offroute/confirm-safe", post(offroute_confirm_safe))
        .route("/v1/trips/:id/offroute/extend", post(offroute_extend))
        .route("/v1/trips/:id/offroute/contact-failed", post(offroute_contact_failed))
        // issues and compensation
        .route("/v1/issues", post(open_issue))
        .route("/v1/issues/:id", get(get_issue))
        .route("/v1/issues/:id/compensation/propose", post(propose_compensation))
        .route("/v1/issues/:id/compensation/adjust", post(adjust_compensation))
        .route("/v1/issues/:id/resolve", post(resolve_issue))
        // vehicles
        .route("/v1/vehicles/:id/availability", get(vehicle_availability))
        // operator triggers for the background loops
        .route("/v1/admin/offroute-tick", post(admin_offroute_tick))
        .route("/v1/admin/reservation-sweep", post(admin_reservation_sweep))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Coordinator error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub LifecycleError);

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, code, holder) = match &err {
            LifecycleError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            LifecycleError::ReservationConflict { holder, .. } => {
                (StatusCode::CONFLICT, "RESERVATION_CONFLICT", Some(*holder))
            }
            LifecycleError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", None)
            }
            LifecycleError::StaleWrite { .. } => (StatusCode::CONFLICT, "STALE_WRITE", None),
            LifecycleError::Compensation(_) => (StatusCode::CONFLICT, "COMPENSATION", None),
            LifecycleError::IssueRequired { .. } => (StatusCode::CONFLICT, "ISSUE_REQUIRED", None),
            LifecycleError::Escalation(_) => (StatusCode::CONFLICT, "ESCALATION", None),
            LifecycleError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION", None)
            }
            LifecycleError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", None),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, "request failed in the store");
            // Backend detail stays in the log.
            "internal store error".to_string()
        } else {
            err.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
                holder_shipment_id: holder,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// GET /v1/health  /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();

    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// Shipments
// ---------------------------------------------------------------------------

pub(crate) async fn create_shipment(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<Response, ApiError> {
    let snap = st.coordinator.register_shipment(req.package_count).await?;
    Ok((StatusCode::CREATED, Json(snap)).into_response())
}

pub(crate) async fn get_shipment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
) -> ApiResult<fl_schemas::ShipmentSnapshot> {
    Ok(Json(st.coordinator.shipment(id).await?))
}

pub(crate) async fn order_event(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
    Json(req): Json<OrderEventRequest>,
) -> ApiResult<fl_lifecycle::ApplyResult> {
    Ok(Json(st.coordinator.on_order_event(id, req.event).await?))
}

/// Deposit with the vehicle slots to hold until full payment.
pub(crate) async fn confirm_deposit(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
    Json(req): Json<DepositRequest>,
) -> ApiResult<fl_lifecycle::ApplyResult> {
    Ok(Json(st.coordinator.confirm_deposit(id, &req.slots).await?))
}

pub(crate) async fn cancel_shipment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<fl_lifecycle::ApplyResult> {
    Ok(Json(st.coordinator.cancel_shipment(id, &req.reason).await?))
}

pub(crate) async fn shipment_reservations(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
) -> ApiResult<Vec<fl_schemas::VehicleReservation>> {
    let rows = st
        .coordinator
        .guard()
        .list_for_shipment(id)
        .await
        .map_err(LifecycleError::from)?;
    Ok(Json(rows))
}

pub(crate) async fn shipment_trips(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
) -> ApiResult<Vec<fl_schemas::Trip>> {
    let trips = st
        .coordinator
        .store()
        .trips_for_shipment(id)
        .await
        .map_err(LifecycleError::from)?;
    Ok(Json(trips))
}

pub(crate) async fn shipment_issues(
    State(st): State<Arc<AppState>>,
    Path(id): Path<ShipmentId>,
) -> ApiResult<Vec<fl_schemas::Issue>> {
    Ok(Json(st.coordinator.issues_for_shipment(id).await?))
}

pub(crate) async fn package_event(
    State(st): State<Arc<AppState>>,
    Path(id): Path<PackageId>,
    Json(req): Json<PackageEventRequest>,
) -> ApiResult<fl_lifecycle::ApplyResult> {
    Ok(Json(st.coordinator.on_package_event(id, req.event).await?))
}

// ---------------------------------------------------------------------------
// Trips and off-route escalation
// ---------------------------------------------------------------------------

pub(crate) async fn assign_trip(
    State(st): State<Arc<AppState>>,
    Json(req): Json<TripAssignment>,
) -> Result<Response, ApiError> {
    let (trip, result) = st.coordinator.assign_trip(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "trip": trip, "result": result })),
    )
        .into_response())
}

pub(crate) async fn trip_event(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(req): Json<TripEventRequest>,
) -> ApiResult<fl_lifecycle::ApplyResult> {
    Ok(Json(st.coordinator.on_trip_event(id, req.event).await?))
}

/// Telemetry for another trip than the path names is rejected.
pub(crate) async fn telemetry(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(sample): Json<TelemetrySample>,
) -> ApiResult<fl_lifecycle::TelemetryOutcome> {
    if sample.trip_id != id {
        return Err(LifecycleError::validation(format!(
            "sample is for trip {}, not {id}",
            sample.trip_id
        ))
        .into());
    }
    Ok(Json(st.coordinator.ingest_telemetry(sample).await?))
}

pub(crate) async fn active_offroute(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
) -> ApiResult<Option<fl_schemas::OffRouteEvent>> {
    Ok(Json(st.coordinator.active_offroute_event(id).await?))
}

pub(crate) async fn offroute_contact(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(req): Json<StaffActionRequest>,
) -> ApiResult<fl_schemas::OffRouteEvent> {
    let ev = st
        .coordinator
        .record_contact(id, &req.staff, req.note.as_deref())
        .await?;
    Ok(Json(ev))
}

pub(crate) async fn offroute_confirm_safe(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(req): Json<StaffActionRequest>,
) -> ApiResult<fl_schemas::OffRouteEvent> {
    let ev = st
        .coordinator
        .confirm_safe(id, &req.staff, req.note.as_deref())
        .await?;
    Ok(Json(ev))
}

pub(crate) async fn offroute_extend(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(req): Json<StaffActionRequest>,
) -> ApiResult<fl_schemas::OffRouteEvent> {
    Ok(Json(st.coordinator.extend_grace(id, &req.staff).await?))
}

pub(crate) async fn offroute_contact_failed(
    State(st): State<Arc<AppState>>,
    Path(id): Path<TripId>,
    Json(req): Json<StaffActionRequest>,
) -> ApiResult<fl_schemas::OffRouteEvent> {
    let ev = st
        .coordinator
        .report_contact_failure(id, &req.staff, req.note.as_deref())
        .await?;
    Ok(Json(ev))
}

// ---------------------------------------------------------------------------
// Issues and compensation
// ---------------------------------------------------------------------------

pub(crate) async fn open_issue(
    State(st): State<Arc<AppState>>,
    Json(report): Json<IssueReport>,
) -> Result<Response, ApiError> {
    let snap = st.coordinator.open_issue(report).await?;
    Ok((StatusCode::CREATED, Json(snap)).into_response())
}

pub(crate) async fn get_issue(
    State(st): State<Arc<AppState>>,
    Path(id): Path<IssueId>,
) -> ApiResult<fl_schemas::IssueSnapshot> {
    Ok(Json(st.coordinator.issue(id).await?))
}

pub(crate) async fn propose_compensation(
    State(st): State<Arc<AppState>>,
    Path(id): Path<IssueId>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<fl_schemas::CompensationAssessment> {
    Ok(Json(st.coordinator.propose_compensation(id, req.input).await?))
}

pub(crate) async fn adjust_compensation(
    State(st): State<Arc<AppState>>,
    Path(id): Path<IssueId>,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<fl_schemas::CompensationAssessment> {
    let a = st
        .coordinator
        .adjust_compensation(id, req.payout, &req.reason)
        .await?;
    Ok(Json(a))
}

pub(crate) async fn resolve_issue(
    State(st): State<Arc<AppState>>,
    Path(id): Path<IssueId>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<fl_lifecycle::ResolutionOutcome> {
    let outcome = st
        .coordinator
        .resolve_issue(id, req.resolution, req.note)
        .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// GET /v1/vehicles/:id/availability
// ---------------------------------------------------------------------------

pub(crate) async fn vehicle_availability(
    State(st): State<Arc<AppState>>,
    Path(id): Path<VehicleId>,
    Query(q): Query<AvailabilityQuery>,
) -> ApiResult<AvailabilityResponse> {
    let available = st
        .coordinator
        .guard()
        .is_available(id, q.date, q.exclude, st.coordinator.now())
        .await
        .map_err(LifecycleError::from)?;
    Ok(Json(AvailabilityResponse {
        vehicle_id: id,
        trip_date: q.date,
        available,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/admin/*
// ---------------------------------------------------------------------------

/// Run one off-route pass now instead of waiting for the next tick.
pub(crate) async fn admin_offroute_tick(
    State(st): State<Arc<AppState>>,
) -> ApiResult<fl_lifecycle::TickReport> {
    let report = offroute_tick(&st).await?;
    info!(advanced = report.advanced, "admin/offroute-tick");
    Ok(Json(report))
}

pub(crate) async fn admin_reservation_sweep(
    State(st): State<Arc<AppState>>,
) -> ApiResult<fl_lifecycle::SweepReport> {
    let report = reservation_sweep(&st).await?;
    info!(expired = report.expired.len(), "admin/reservation-sweep");
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::Notification(_) => "notification",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
