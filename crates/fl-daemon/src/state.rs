//! Shared runtime state for fl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The background loops
//! (heartbeat, off-route tick, reservation sweep) live here too.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fl_compensation::CompensationPolicy;
use fl_config::FreightlineConfig;
use fl_lifecycle::{
    Clock, LifecycleError, LifecycleSettings, LifecycleStore, NotificationDispatcher,
    ShipmentLifecycleCoordinator, SweepReport, SystemClock, TickReport,
};
use fl_offroute::OffRouteConfig;
use fl_schemas::Notification;
use fl_testkit::MemoryStore;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    Notification(Notification),
    LogLine { level: String, msg: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Returned by GET /v1/status and carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "memory" | "postgres"
    pub backend: String,
    pub config_hash: Option<String>,
    pub last_tick: Option<TickReport>,
    pub last_sweep: Option<SweepReport>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub coordinator: Arc<ShipmentLifecycleCoordinator>,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl AppState {
    /// Wire a coordinator over `store` whose notifications go out on the bus.
    pub fn new<S: LifecycleStore + 'static>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
        backend: &str,
        config_hash: Option<String>,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let notifier = Arc::new(BusNotifier::new(bus.clone()));
        let coordinator = Arc::new(ShipmentLifecycleCoordinator::new(
            store, notifier, clock, settings,
        ));

        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            backend: backend.to_string(),
            config_hash,
            last_tick: None,
            last_sweep: None,
        };

        Self {
            bus,
            build: BuildInfo {
                service: "fl-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            coordinator,
            status: Arc::new(RwLock::new(initial_status)),
        }
    }

    /// Empty in-memory backend on the wall clock with default settings.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            LifecycleSettings::default(),
            "memory",
            None,
        )
    }
}

/// Coordinator tunables from the typed config.
pub fn lifecycle_settings(cfg: &FreightlineConfig) -> LifecycleSettings {
    let o = &cfg.offroute;
    LifecycleSettings {
        offroute: OffRouteConfig::from_secs(
            o.yellow_after_secs,
            o.red_after_secs,
            o.grace_period_secs,
            o.extension_secs,
            o.max_extensions,
        ),
        compensation: CompensationPolicy {
            legal_cap_multiplier: cfg.compensation.legal_cap_multiplier,
        },
        payment_lead: chrono::Duration::seconds(cfg.reservation.payment_lead_secs),
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Publishes coordinator notifications on the SSE bus.
pub struct BusNotifier {
    bus: broadcast::Sender<BusMsg>,
}

impl BusNotifier {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationDispatcher for BusNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        debug!(role = %notification.role, kind = %notification.kind, "notification");
        // No subscriber means no one is watching, not a failed delivery.
        let _ = self.bus.send(BusMsg::Notification(notification));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Background loops
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Emit a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            // Ignored while nobody is subscribed.
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// One off-route evaluation pass; records the report on the status snapshot.
pub async fn offroute_tick(state: &AppState) -> Result<TickReport, LifecycleError> {
    match state.coordinator.run_offroute_tick().await {
        Ok(report) => {
            if report.advanced > 0 || report.failed > 0 {
                info!(
                    evaluated = report.evaluated,
                    advanced = report.advanced,
                    issues_opened = report.issues_opened,
                    failed = report.failed,
                    "off-route tick"
                );
            }
            state.status.write().await.last_tick = Some(report.clone());
            Ok(report)
        }
        Err(err) => {
            error!(error = %err, "off-route tick failed");
            // Best effort; SSE listeners are optional.
            let _ = state.bus.send(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!("off-route tick failed: {err}"),
            });
            Err(err)
        }
    }
}

/// One reservation sweep; records the report on the status snapshot.
pub async fn reservation_sweep(state: &AppState) -> Result<SweepReport, LifecycleError> {
    match state.coordinator.sweep_reservations().await {
        Ok(report) => {
            if !report.expired.is_empty() {
                warn!(
                    expired = report.expired.len(),
                    cancelled_shipments = report.cancelled_shipments.len(),
                    failed = report.failed,
                    "reservation sweep"
                );
            }
            state.status.write().await.last_sweep = Some(report.clone());
            Ok(report)
        }
        Err(err) => {
            error!(error = %err, "reservation sweep failed");
            // Best effort; SSE listeners are optional.
            let _ = state.bus.send(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!("reservation sweep failed: {err}"),
            });
            Err(err)
        }
    }
}

/// Re-evaluate open off-route events every `interval`.
pub fn spawn_offroute_tick(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Failures are logged inside; the next tick retries.
            let _ = offroute_tick(&state).await;
        }
    });
}

/// Expire unpaid vehicle holds every `interval`.
pub fn spawn_reservation_sweep(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _ = reservation_sweep(&state).await;
        }
    });
}
