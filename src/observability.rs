use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "amenity_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "amenity_query_duration_seconds";

/// Counter: reservation requests rejected for overlapping an active one.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "amenity_reservation_conflicts_total";

/// Counter: reservations settled by the background reaper.
pub const RESERVATIONS_REAPED_TOTAL: &str = "amenity_reservations_reaped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "amenity_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "amenity_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "amenity_connections_rejected_total";

/// Gauge: number of areas in the catalog.
pub const AREAS_ACTIVE: &str = "amenity_areas_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "amenity_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "amenity_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertArea { .. } => "insert_area",
        Command::UpdateArea { .. } => "update_area",
        Command::DeleteArea { .. } => "delete_area",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::SetReservationStatus { .. } => "set_reservation_status",
        Command::RescheduleReservation { .. } => "reschedule_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectAreas { .. } => "select_areas",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectUpcoming { .. } => "select_upcoming",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectAvailabilityCheck { .. } => "select_availability_check",
        Command::SelectQuote { .. } => "select_quote",
        Command::SelectOccupiedDates { .. } => "select_occupied_dates",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
        Command::UnlistenAll => "unlisten_all",
    }
}
