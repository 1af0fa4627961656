use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::AgendaAuthSource;
use crate::engine::{Engine, EngineError, Refusal, policy};
use crate::model::*;
use crate::observability;
use crate::sql::{self, AppointmentFilter, Command, SuspensionChange};
use crate::tenant::TenantManager;

pub struct AgendaHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<AgendaQueryParser>,
}

impl AgendaHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(AgendaQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Run each statement of a simple query in order, stopping at the first
    /// failure. Statements before it stay applied.
    async fn run_batch(&self, engine: &Engine, query: &str) -> PgWireResult<Vec<Response>> {
        let commands = sql::parse_batch(query).map_err(sql_err)?;
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.extend(self.run(engine, cmd).await?);
        }
        Ok(responses)
    }

    /// Execute one statement and record its metrics.
    async fn run(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result.map_err(engine_err)
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> Result<Vec<Response>, EngineError> {
        let now = policy::now_local();
        match cmd {
            Command::InsertProfessional { id, name } => {
                engine.create_professional(id, name).await?;
                Ok(inserted(1))
            }
            Command::UpdateProfessional { id, name, active } => {
                engine.update_professional(id, name, active).await?;
                Ok(updated(1))
            }
            Command::DeleteProfessional { id } => {
                engine.delete_professional(id).await?;
                Ok(deleted(1))
            }
            Command::InsertSpecialty {
                id,
                name,
                duration_minutes,
            } => {
                engine.create_specialty(id, name, duration_minutes).await?;
                Ok(inserted(1))
            }
            Command::UpdateSpecialty {
                id,
                name,
                duration_minutes,
                active,
            } => {
                engine
                    .update_specialty(id, name, duration_minutes, active)
                    .await?;
                Ok(updated(1))
            }
            Command::AssignSpecialty {
                professional_id,
                specialty_id,
            } => {
                engine.assign_specialty(professional_id, specialty_id).await?;
                Ok(inserted(1))
            }
            Command::UnassignSpecialty {
                professional_id,
                specialty_id,
            } => {
                engine
                    .unassign_specialty(professional_id, specialty_id)
                    .await?;
                Ok(deleted(1))
            }
            Command::InsertAccount { id, name } => {
                engine.create_account(id, name).await?;
                Ok(inserted(1))
            }
            Command::UpdateAccount {
                id,
                suspension,
                blocked,
            } => {
                match suspension {
                    Some(SuspensionChange::Lift) => engine.lift_suspension(id).await?,
                    Some(SuspensionChange::Default) => {
                        engine.suspend_account(id, None, now).await?;
                    }
                    Some(SuspensionChange::Until(until)) => {
                        engine.suspend_account(id, Some(until), now).await?;
                    }
                    None => {}
                }
                match blocked {
                    Some(true) => engine.block_account(id).await?,
                    Some(false) => engine.unblock_account(id).await?,
                    None => {}
                }
                Ok(updated(1))
            }
            Command::ReplaceWeeklyAvailability {
                professional_id,
                rows,
            } => {
                let count = rows.len();
                engine
                    .replace_weekly_availability(professional_id, rows)
                    .await?;
                Ok(inserted(count))
            }
            Command::ClearWeeklyAvailability { professional_id } => {
                engine
                    .replace_weekly_availability(professional_id, Vec::new())
                    .await?;
                Ok(deleted(1))
            }
            Command::InsertDateOverride {
                id,
                professional_id,
                date,
                range,
            } => {
                engine
                    .add_date_override(id, professional_id, date, range)
                    .await?;
                Ok(inserted(1))
            }
            Command::DeleteDateOverride { id } => {
                engine.remove_date_override(id).await?;
                Ok(deleted(1))
            }
            Command::InsertBlockedDay {
                id,
                professional_id,
                date,
                reason,
            } => {
                engine
                    .add_blocked_day(id, professional_id, date, reason)
                    .await?;
                Ok(inserted(1))
            }
            Command::DeleteBlockedDay { id } => {
                engine.remove_blocked_day(id).await?;
                Ok(deleted(1))
            }
            Command::InsertAppointment {
                id,
                user_id,
                professional_id,
                specialty_id,
                date,
                time,
                notes,
            } => {
                engine
                    .book_appointment(
                        id,
                        user_id,
                        professional_id,
                        specialty_id,
                        date,
                        time,
                        notes,
                        now,
                    )
                    .await?;
                Ok(inserted(1))
            }
            Command::UpdateAppointmentStatus {
                id,
                status,
                cancelled_by,
                accept_penalty,
            } => {
                match status {
                    AppointmentStatus::Cancelled => {
                        let outcome = engine
                            .cancel_appointment(id, cancelled_by, accept_penalty, now)
                            .await?;
                        if let Some(block) = outcome.penalty {
                            tracing::debug!(
                                appointment = %id,
                                until = ?block.blocked_until,
                                "cancellation penalty applied"
                            );
                        }
                    }
                    AppointmentStatus::Completed => engine.complete_appointment(id).await?,
                    AppointmentStatus::NoShow => engine.mark_no_show(id).await?,
                    AppointmentStatus::Scheduled => {
                        return Err(EngineError::InvalidInput(
                            "appointments cannot return to scheduled",
                        ));
                    }
                }
                Ok(updated(1))
            }
            Command::DeleteAppointment { id } => {
                engine.delete_appointment(id).await?;
                Ok(deleted(1))
            }
            Command::InsertSpecialtyBlock {
                user_id,
                specialty_id,
                blocked_until,
                reason,
            } => {
                engine
                    .block_specialty(user_id, specialty_id, blocked_until, reason, now)
                    .await?;
                Ok(inserted(1))
            }
            Command::DeleteSpecialtyBlock {
                user_id,
                specialty_id,
            } => {
                engine.lift_specialty_block(user_id, specialty_id).await?;
                Ok(deleted(1))
            }
            Command::SelectAvailableDates {
                professional_id,
                specialty_id,
            } => {
                let dates = engine
                    .available_dates(professional_id, specialty_id, now.date())
                    .await?;
                let schema = Arc::new(ResultKind::AvailableDates.schema());
                let rows = dates.into_iter().map(|date| -> PgWireResult<DataRow> {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&date.to_string())?;
                    Ok(encoder.take_row())
                });
                Ok(query_response(schema.clone(), rows))
            }
            Command::SelectAvailableSlots {
                professional_id,
                date,
            } => {
                let slots = engine.available_slots(professional_id, date, now).await?;
                let schema = Arc::new(ResultKind::AvailableSlots.schema());
                let rows = slots.into_iter().map(|time| -> PgWireResult<DataRow> {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&time.format("%H:%M").to_string())?;
                    Ok(encoder.take_row())
                });
                Ok(query_response(schema.clone(), rows))
            }
            Command::SelectMonthlyLimit {
                user_id,
                specialty_id,
                date,
            } => {
                let conflict = engine
                    .monthly_conflict(user_id, specialty_id, date.unwrap_or(now.date()))
                    .await?;
                let schema = Arc::new(ResultKind::MonthlyLimit.schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                let row = (|| -> PgWireResult<DataRow> {
                    encoder.encode_field(&conflict.is_some())?;
                    encoder.encode_field(&conflict.map(|c| c.appointment_id.to_string()))?;
                    encoder.encode_field(&conflict.map(|c| c.date.to_string()))?;
                    Ok(encoder.take_row())
                })();
                Ok(query_response(schema, std::iter::once(row)))
            }
            Command::SelectSelectableSpecialties { user_id } => {
                let options = engine.selectable_specialties(user_id, now).await?;
                let schema = Arc::new(ResultKind::SelectableSpecialties.schema());
                let rows: Vec<PgWireResult<DataRow>> = options
                    .iter()
                    .flat_map(|option| {
                        option
                            .professionals
                            .iter()
                            .map(move |(pid, pname)| (option, pid, pname))
                    })
                    .map(|(option, pid, pname)| -> PgWireResult<DataRow> {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&option.specialty_id.to_string())?;
                        encoder.encode_field(&option.name)?;
                        encoder.encode_field(&pid.to_string())?;
                        encoder.encode_field(pname)?;
                        encoder.encode_field(&option.suspended)?;
                        encoder.encode_field(&option.suspended_until.map(format_timestamp))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectAppointments { filter } => {
                let appointments = match filter {
                    AppointmentFilter::User(id) => engine.appointments_for_user(id).await?,
                    AppointmentFilter::Professional(id) => {
                        engine.appointments_for_professional(id).await?
                    }
                };
                let schema = Arc::new(ResultKind::Appointments.schema());
                let rows = appointments.into_iter().map(|a| -> PgWireResult<DataRow> {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&a.id.to_string())?;
                    encoder.encode_field(&a.user_id.to_string())?;
                    encoder.encode_field(&a.professional_id.to_string())?;
                    encoder.encode_field(&a.specialty_id.to_string())?;
                    encoder.encode_field(&a.date.to_string())?;
                    encoder.encode_field(&a.time.format("%H:%M").to_string())?;
                    encoder.encode_field(&a.status.as_str().to_string())?;
                    encoder.encode_field(&a.notes)?;
                    Ok(encoder.take_row())
                });
                Ok(query_response(schema.clone(), rows))
            }
            Command::SelectProfessionals => {
                let professionals = engine.list_professionals().await;
                let schema = Arc::new(ResultKind::Professionals.schema());
                let rows = professionals.into_iter().map(|p| -> PgWireResult<DataRow> {
                    let specialties: Vec<String> =
                        p.specialties.iter().map(|s| s.to_string()).collect();
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&p.id.to_string())?;
                    encoder.encode_field(&p.name)?;
                    encoder.encode_field(&p.active)?;
                    encoder.encode_field(&specialties.join(","))?;
                    Ok(encoder.take_row())
                });
                Ok(query_response(schema.clone(), rows))
            }
            Command::SelectSpecialties => {
                let specialties = engine.list_specialties();
                let schema = Arc::new(ResultKind::Specialties.schema());
                let rows = specialties.into_iter().map(|s| -> PgWireResult<DataRow> {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&s.id.to_string())?;
                    encoder.encode_field(&s.name)?;
                    encoder.encode_field(&(s.duration_minutes as i32))?;
                    encoder.encode_field(&s.active)?;
                    Ok(encoder.take_row())
                });
                Ok(query_response(schema.clone(), rows))
            }
        }
    }
}

fn inserted(rows: usize) -> Vec<Response> {
    vec![Response::Execution(Tag::new("INSERT").with_rows(rows))]
}

fn updated(rows: usize) -> Vec<Response> {
    vec![Response::Execution(Tag::new("UPDATE").with_rows(rows))]
}

fn deleted(rows: usize) -> Vec<Response> {
    vec![Response::Execution(Tag::new("DELETE").with_rows(rows))]
}

fn query_response(
    schema: Arc<Vec<FieldInfo>>,
    rows: impl IntoIterator<Item = PgWireResult<DataRow>>,
) -> Vec<Response> {
    let rows: Vec<_> = rows.into_iter().collect();
    vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))]
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Result schemas ───────────────────────────────────────────────

/// Row shape of each SELECT-able table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultKind {
    AvailableDates,
    AvailableSlots,
    MonthlyLimit,
    SelectableSpecialties,
    Appointments,
    Professionals,
    Specialties,
}

impl ResultKind {
    /// Guess the result shape from the statement text, for Describe before
    /// parameters are bound.
    fn of_statement(sql: &str) -> Option<Self> {
        let lower = sql.to_lowercase();
        if !lower.trim_start().starts_with("select") {
            return None;
        }
        let table = lower
            .split_once(" from ")?
            .1
            .split(|c: char| c.is_whitespace() || c == ';')
            .find(|s| !s.is_empty())?;
        match table.rsplit('.').next()? {
            "available_dates" => Some(Self::AvailableDates),
            "available_slots" => Some(Self::AvailableSlots),
            "monthly_limit" => Some(Self::MonthlyLimit),
            "selectable_specialties" => Some(Self::SelectableSpecialties),
            "appointments" => Some(Self::Appointments),
            "professionals" => Some(Self::Professionals),
            "specialties" => Some(Self::Specialties),
            _ => None,
        }
    }

    fn schema(self) -> Vec<FieldInfo> {
        let cols: &[(&str, Type)] = match self {
            Self::AvailableDates => &[("date", Type::DATE)],
            Self::AvailableSlots => &[("time", Type::TIME)],
            Self::MonthlyLimit => &[
                ("has_conflict", Type::BOOL),
                ("conflicting_appointment_id", Type::VARCHAR),
                ("conflicting_date", Type::DATE),
            ],
            Self::SelectableSpecialties => &[
                ("specialty_id", Type::VARCHAR),
                ("specialty_name", Type::VARCHAR),
                ("professional_id", Type::VARCHAR),
                ("professional_name", Type::VARCHAR),
                ("suspended", Type::BOOL),
                ("suspended_until", Type::TIMESTAMP),
            ],
            Self::Appointments => &[
                ("id", Type::VARCHAR),
                ("user_id", Type::VARCHAR),
                ("professional_id", Type::VARCHAR),
                ("specialty_id", Type::VARCHAR),
                ("date", Type::DATE),
                ("time", Type::TIME),
                ("status", Type::VARCHAR),
                ("notes", Type::VARCHAR),
            ],
            Self::Professionals => &[
                ("id", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("active", Type::BOOL),
                ("specialties", Type::VARCHAR),
            ],
            Self::Specialties => &[
                ("id", Type::VARCHAR),
                ("name", Type::VARCHAR),
                ("duration_minutes", Type::INT4),
                ("active", Type::BOOL),
            ],
        };
        cols.iter()
            .map(|(name, ty)| {
                FieldInfo::new((*name).into(), None, None, ty.clone(), FieldFormat::Text)
            })
            .collect()
    }
}

fn statement_schema(sql: &str) -> Vec<FieldInfo> {
    ResultKind::of_statement(sql).map_or_else(Vec::new, ResultKind::schema)
}

#[async_trait]
impl SimpleQueryHandler for AgendaHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        self.run_batch(&engine, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AgendaQueryParser;

#[async_trait]
impl QueryParser for AgendaQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)?])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AgendaHandler {
    type Statement = String;
    type QueryParser = AgendaQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(&portal.statement.statement, &portal.parameters)?;
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(&engine, cmd)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| fault("statement produced no response"))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)?];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
        )))
    }
}

/// Largest placeholder number a Bind message can carry values for.
const MAX_PARAMS: usize = u16::MAX as usize;

/// `$N` placeholders outside single-quoted literals: byte range and digits.
fn placeholders(sql: &str) -> Vec<(Range<usize>, &str)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    found.push((i..end, &sql[start..end]));
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    found
}

fn param_index(digits: &str) -> PgWireResult<usize> {
    digits
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=MAX_PARAMS).contains(n))
        .ok_or_else(|| user_error("42601", format!("invalid parameter reference ${digits}")))
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> PgWireResult<usize> {
    placeholders(sql)
        .into_iter()
        .try_fold(0, |max, (_, digits)| -> PgWireResult<usize> {
            Ok(max.max(param_index(digits)?))
        })
}

/// Substitute `$1, $2, …` with bound text parameters as quoted literals,
/// in one pass over the statement text.
fn substitute_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> PgWireResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    for (range, digits) in placeholders(sql) {
        out.push_str(&sql[copied..range.start]);
        let n = param_index(digits)?;
        match params.get(n - 1) {
            Some(Some(bytes)) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => return Err(user_error("08P01", format!("no value bound for ${n}"))),
        }
        copied = range.end;
    }
    out.push_str(&sql[copied..]);
    Ok(out)
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AgendaFactory {
    handler: Arc<AgendaHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AgendaAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AgendaFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = AgendaAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AgendaHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AgendaFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = AgendaFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn fault(message: &str) -> PgWireError {
    user_error("XX000", message.to_string())
}

/// SQLSTATE for an engine error. `SLOT_TAKEN` reuses the unique-violation
/// code so clients can treat it like a conflicting insert.
fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Refused(Refusal::SlotTaken) => "23505",
        EngineError::WalError(_) => "XX000",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    match &e {
        EngineError::Refused(r) => {
            metrics::counter!(observability::REFUSALS_TOTAL, "reason" => r.code()).increment(1);
            tracing::debug!(reason = r.code(), "refused: {r}");
        }
        EngineError::WalError(msg) => {
            tracing::error!("WAL fault: {msg}");
            return fault("internal error, retry later");
        }
        _ => {}
    }
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
