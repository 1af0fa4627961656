use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "agenda_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "agenda_query_duration_seconds";

/// Counter: appointments booked.
pub const BOOKINGS_TOTAL: &str = "agenda_bookings_total";

/// Counter: business-rule refusals. Labels: reason.
pub const REFUSALS_TOTAL: &str = "agenda_refusals_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "agenda_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "agenda_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "agenda_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "agenda_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "agenda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "agenda_wal_flush_batch_size";

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
        Command::InsertProfessional { .. } => "insert_professional",
        Command::UpdateProfessional { .. } => "update_professional",
        Command::DeleteProfessional { .. } => "delete_professional",
        Command::InsertSpecialty { .. } => "insert_specialty",
        Command::UpdateSpecialty { .. } => "update_specialty",
        Command::AssignSpecialty { .. } => "assign_specialty",
        Command::UnassignSpecialty { .. } => "unassign_specialty",
        Command::InsertAccount { .. } => "insert_account",
        Command::UpdateAccount { .. } => "update_account",
        Command::ReplaceWeeklyAvailability { .. } => "replace_weekly_availability",
        Command::ClearWeeklyAvailability { .. } => "clear_weekly_availability",
        Command::InsertDateOverride { .. } => "insert_date_override",
        Command::DeleteDateOverride { .. } => "delete_date_override",
        Command::InsertBlockedDay { .. } => "insert_blocked_day",
        Command::DeleteBlockedDay { .. } => "delete_blocked_day",
        Command::InsertAppointment { .. } => "insert_appointment",
        Command::UpdateAppointmentStatus { .. } => "update_appointment_status",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::InsertSpecialtyBlock { .. } => "insert_specialty_block",
        Command::DeleteSpecialtyBlock { .. } => "delete_specialty_block",
        Command::SelectAvailableDates { .. } => "select_available_dates",
        Command::SelectAvailableSlots { .. } => "select_available_slots",
        Command::SelectMonthlyLimit { .. } => "select_monthly_limit",
        Command::SelectSelectableSpecialties { .. } => "select_selectable_specialties",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::SelectProfessionals => "select_professionals",
        Command::SelectSpecialties => "select_specialties",
    }
}
