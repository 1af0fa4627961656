use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Change to an account's suspension requested through `UPDATE accounts`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuspensionChange {
    /// `suspended_until = NULL`: lift the suspension and all specialty blocks.
    Lift,
    /// `suspended_until = 'default'`: two months from now.
    Default,
    Until(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppointmentFilter {
    User(Ulid),
    Professional(Ulid),
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertProfessional {
        id: Ulid,
        name: String,
    },
    UpdateProfessional {
        id: Ulid,
        name: Option<String>,
        active: Option<bool>,
    },
    DeleteProfessional {
        id: Ulid,
    },
    InsertSpecialty {
        id: Ulid,
        name: String,
        duration_minutes: u32,
    },
    UpdateSpecialty {
        id: Ulid,
        name: Option<String>,
        duration_minutes: Option<u32>,
        active: Option<bool>,
    },
    AssignSpecialty {
        professional_id: Ulid,
        specialty_id: Ulid,
    },
    UnassignSpecialty {
        professional_id: Ulid,
        specialty_id: Ulid,
    },
    InsertAccount {
        id: Ulid,
        name: String,
    },
    UpdateAccount {
        id: Ulid,
        suspension: Option<SuspensionChange>,
        blocked: Option<bool>,
    },
    /// Every row of a multi-row INSERT replaces the professional's whole weekly pattern.
    ReplaceWeeklyAvailability {
        professional_id: Ulid,
        rows: Vec<(u8, TimeRange)>,
    },
    ClearWeeklyAvailability {
        professional_id: Ulid,
    },
    InsertDateOverride {
        id: Ulid,
        professional_id: Ulid,
        date: NaiveDate,
        range: TimeRange,
    },
    DeleteDateOverride {
        id: Ulid,
    },
    InsertBlockedDay {
        id: Ulid,
        professional_id: Option<Ulid>,
        date: NaiveDate,
        reason: Option<String>,
    },
    DeleteBlockedDay {
        id: Ulid,
    },
    InsertAppointment {
        id: Ulid,
        user_id: Ulid,
        professional_id: Ulid,
        specialty_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
    },
    UpdateAppointmentStatus {
        id: Ulid,
        status: AppointmentStatus,
        cancelled_by: Actor,
        accept_penalty: bool,
    },
    DeleteAppointment {
        id: Ulid,
    },
    InsertSpecialtyBlock {
        user_id: Ulid,
        specialty_id: Ulid,
        blocked_until: Option<NaiveDateTime>,
        reason: Option<String>,
    },
    DeleteSpecialtyBlock {
        user_id: Ulid,
        specialty_id: Option<Ulid>,
    },
    SelectAvailableDates {
        professional_id: Ulid,
        specialty_id: Ulid,
    },
    SelectAvailableSlots {
        professional_id: Ulid,
        date: NaiveDate,
    },
    /// `date` picks the month to check; today's month when absent.
    SelectMonthlyLimit {
        user_id: Ulid,
        specialty_id: Ulid,
        date: Option<NaiveDate>,
    },
    SelectSelectableSpecialties {
        user_id: Ulid,
    },
    SelectAppointments {
        filter: AppointmentFilter,
    },
    SelectProfessionals,
    SelectSpecialties,
}

/// Parse exactly one statement. Extended-protocol Parse messages carry one.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let mut commands = parse_batch(sql)?;
    if commands.len() > 1 {
        return Err(SqlError::Unsupported(
            "multiple statements in a prepared statement".into(),
        ));
    }
    commands.pop().ok_or(SqlError::Empty)
}

/// Parse a `;`-separated simple query. Nothing is returned unless every
/// statement parses.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row, addressed by column name. Without a column list the
/// table's default column order applies.
struct Row<'a> {
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> Option<&'a Expr> {
        let pos = self.columns.iter().position(|c| c == column)?;
        self.values.get(pos)
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(column))
    }
}

fn default_columns(table: &str) -> &'static [&'static str] {
    match table {
        "professionals" | "accounts" => &["id", "name"],
        "specialties" => &["id", "name", "duration_minutes"],
        "professional_specialties" => &["professional_id", "specialty_id"],
        "weekly_availability" => &["professional_id", "day_of_week", "start_time", "end_time"],
        "date_overrides" => &["id", "professional_id", "date", "start_time", "end_time"],
        "blocked_days" => &["id", "professional_id", "date", "reason"],
        "appointments" => &[
            "id",
            "user_id",
            "professional_id",
            "specialty_id",
            "date",
            "time",
            "notes",
        ],
        "specialty_blocks" => &["user_id", "specialty_id", "blocked_until", "reason"],
        _ => &[],
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        default_columns(&table).iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    let all_rows = extract_all_insert_rows(insert)?;
    let rows: Vec<Row<'_>> = all_rows
        .iter()
        .map(|values| Row {
            columns: columns.clone(),
            values,
        })
        .collect();

    if table == "weekly_availability" {
        return parse_weekly_rows(&rows);
    }
    if rows.len() > 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let row = &rows[0];

    match table.as_str() {
        "professionals" => Ok(Command::InsertProfessional {
            id: parse_ulid(row.required("id")?)?,
            name: parse_string(row.required("name")?)?,
        }),
        "specialties" => Ok(Command::InsertSpecialty {
            id: parse_ulid(row.required("id")?)?,
            name: parse_string(row.required("name")?)?,
            duration_minutes: match row.get("duration_minutes") {
                Some(e) => parse_u32(e)?,
                None => 60,
            },
        }),
        "professional_specialties" => Ok(Command::AssignSpecialty {
            professional_id: parse_ulid(row.required("professional_id")?)?,
            specialty_id: parse_ulid(row.required("specialty_id")?)?,
        }),
        "accounts" => Ok(Command::InsertAccount {
            id: parse_ulid(row.required("id")?)?,
            name: parse_string(row.required("name")?)?,
        }),
        "date_overrides" => Ok(Command::InsertDateOverride {
            id: parse_ulid(row.required("id")?)?,
            professional_id: parse_ulid(row.required("professional_id")?)?,
            date: parse_date(row.required("date")?)?,
            range: parse_range(row)?,
        }),
        "blocked_days" => Ok(Command::InsertBlockedDay {
            id: parse_ulid(row.required("id")?)?,
            professional_id: row.get("professional_id").map(parse_ulid_or_null).transpose()?.flatten(),
            date: parse_date(row.required("date")?)?,
            reason: row.get("reason").map(parse_string_or_null).transpose()?.flatten(),
        }),
        "appointments" => Ok(Command::InsertAppointment {
            id: parse_ulid(row.required("id")?)?,
            user_id: parse_ulid(row.required("user_id")?)?,
            professional_id: parse_ulid(row.required("professional_id")?)?,
            specialty_id: parse_ulid(row.required("specialty_id")?)?,
            date: parse_date(row.required("date")?)?,
            time: parse_time(row.required("time")?)?,
            notes: row.get("notes").map(parse_string_or_null).transpose()?.flatten(),
        }),
        "specialty_blocks" => Ok(Command::InsertSpecialtyBlock {
            user_id: parse_ulid(row.required("user_id")?)?,
            specialty_id: parse_ulid(row.required("specialty_id")?)?,
            blocked_until: row
                .get("blocked_until")
                .map(parse_timestamp_or_null)
                .transpose()?
                .flatten(),
            reason: row.get("reason").map(parse_string_or_null).transpose()?.flatten(),
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_weekly_rows(rows: &[Row<'_>]) -> Result<Command, SqlError> {
    let mut professional_id = None;
    let mut parsed = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let at_row = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
        let pid = parse_ulid(row.required("professional_id")?).map_err(at_row)?;
        if *professional_id.get_or_insert(pid) != pid {
            return Err(SqlError::Parse(
                "weekly_availability rows must share one professional_id".into(),
            ));
        }
        let day = parse_u32(row.required("day_of_week")?).map_err(at_row)?;
        let day = u8::try_from(day).map_err(|_| SqlError::Parse(format!("row {i}: bad day_of_week {day}")))?;
        parsed.push((day, parse_range(row).map_err(at_row)?));
    }
    Ok(Command::ReplaceWeeklyAvailability {
        professional_id: professional_id.ok_or(SqlError::MissingColumn("professional_id"))?,
        rows: parsed,
    })
}

fn parse_range(row: &Row<'_>) -> Result<TimeRange, SqlError> {
    let start = parse_time(row.required("start_time")?)?;
    let end = parse_time(row.required("end_time")?)?;
    TimeRange::try_new(start, end)
        .ok_or_else(|| SqlError::Parse(format!("start_time {start} must be before end_time {end}")))
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let filters = where_filters(selection)?;
    let id = parse_ulid(filter(&filters, "id")?)?;

    let mut set: Vec<(String, &Expr)> = Vec::with_capacity(assignments.len());
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            _ => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.push((column, &a.value));
    }
    let value = |column: &str| set.iter().find(|(c, _)| c == column).map(|(_, e)| *e);

    match table.as_str() {
        "professionals" => Ok(Command::UpdateProfessional {
            id,
            name: value("name").map(parse_string).transpose()?,
            active: value("active").map(parse_bool).transpose()?,
        }),
        "specialties" => Ok(Command::UpdateSpecialty {
            id,
            name: value("name").map(parse_string).transpose()?,
            duration_minutes: value("duration_minutes").map(parse_u32).transpose()?,
            active: value("active").map(parse_bool).transpose()?,
        }),
        "accounts" => Ok(Command::UpdateAccount {
            id,
            suspension: value("suspended_until").map(parse_suspension).transpose()?,
            blocked: value("blocked").map(parse_bool).transpose()?,
        }),
        "appointments" => {
            let status = value("status").ok_or(SqlError::MissingColumn("status"))?;
            let status: AppointmentStatus = parse_string(status)?
                .parse()
                .map_err(SqlError::Parse)?;
            let cancelled_by = match value("cancelled_by") {
                Some(e) => parse_string(e)?.parse().map_err(SqlError::Parse)?,
                None => Actor::User,
            };
            Ok(Command::UpdateAppointmentStatus {
                id,
                status,
                cancelled_by,
                accept_penalty: value("accept_penalty").map(parse_bool).transpose()?.unwrap_or(false),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_suspension(expr: &Expr) -> Result<SuspensionChange, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(SuspensionChange::Lift);
    }
    let s = parse_string(expr)?;
    if s.eq_ignore_ascii_case("default") {
        return Ok(SuspensionChange::Default);
    }
    Ok(SuspensionChange::Until(timestamp_from_str(&s)?))
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = where_filters(&delete.selection)?;
    let id = || parse_ulid(filter(&filters, "id")?);

    match table.as_str() {
        "professionals" => Ok(Command::DeleteProfessional { id: id()? }),
        "professional_specialties" => Ok(Command::UnassignSpecialty {
            professional_id: parse_ulid(filter(&filters, "professional_id")?)?,
            specialty_id: parse_ulid(filter(&filters, "specialty_id")?)?,
        }),
        "weekly_availability" => Ok(Command::ClearWeeklyAvailability {
            professional_id: parse_ulid(filter(&filters, "professional_id")?)?,
        }),
        "date_overrides" => Ok(Command::DeleteDateOverride { id: id()? }),
        "blocked_days" => Ok(Command::DeleteBlockedDay { id: id()? }),
        "appointments" => Ok(Command::DeleteAppointment { id: id()? }),
        "specialty_blocks" => Ok(Command::DeleteSpecialtyBlock {
            user_id: parse_ulid(filter(&filters, "user_id")?)?,
            specialty_id: optional_filter(&filters, "specialty_id").map(parse_ulid).transpose()?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_filters(&select.selection)?;
    let ulid_filter = |col: &'static str| parse_ulid(filter(&filters, col)?);

    match table.as_str() {
        "available_dates" => Ok(Command::SelectAvailableDates {
            professional_id: ulid_filter("professional_id")?,
            specialty_id: ulid_filter("specialty_id")?,
        }),
        "available_slots" => Ok(Command::SelectAvailableSlots {
            professional_id: ulid_filter("professional_id")?,
            date: parse_date(filter(&filters, "date")?)?,
        }),
        "monthly_limit" => Ok(Command::SelectMonthlyLimit {
            user_id: ulid_filter("user_id")?,
            specialty_id: ulid_filter("specialty_id")?,
            date: optional_filter(&filters, "date").map(parse_date).transpose()?,
        }),
        "selectable_specialties" => Ok(Command::SelectSelectableSpecialties {
            user_id: ulid_filter("user_id")?,
        }),
        "appointments" => {
            let filter = if let Some(e) = optional_filter(&filters, "user_id") {
                AppointmentFilter::User(parse_ulid(e)?)
            } else if let Some(e) = optional_filter(&filters, "professional_id") {
                AppointmentFilter::Professional(parse_ulid(e)?)
            } else {
                return Err(SqlError::MissingFilter("user_id or professional_id"));
            };
            Ok(Command::SelectAppointments { filter })
        }
        "professionals" => Ok(Command::SelectProfessionals),
        "specialties" => Ok(Command::SelectSpecialties),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE ─────────────────────────────────────────────────────

/// Collect `column = value` pairs from a conjunction. Anything else is unsupported.
fn where_filters(selection: &Option<Expr>) -> Result<Vec<(String, &Expr)>, SqlError> {
    let mut out = Vec::new();
    if let Some(expr) = selection {
        collect_filters(expr, &mut out)?;
    }
    Ok(out)
}

fn collect_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_filters(left, out)?;
                collect_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
        },
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
}

fn optional_filter<'a>(filters: &[(String, &'a Expr)], column: &str) -> Option<&'a Expr> {
    filters.iter().find(|(c, _)| c == column).map(|(_, e)| *e)
}

fn filter<'a>(filters: &[(String, &'a Expr)], column: &'static str) -> Result<&'a Expr, SqlError> {
    optional_filter(filters, column).ok_or(SqlError::MissingFilter(column))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

/// Literal behind an expression, looking through `'…'::type` casts and parentheses.
fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        Expr::Cast { expr, .. } | Expr::Nested(expr) => extract_value(expr),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_ulid(expr).map(Some),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
        Some(other) => Err(SqlError::Parse(format!("expected number, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(other) => Err(SqlError::Parse(format!("expected bool, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| SqlError::Parse(format!("bad date {s}: {e}")))
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    NaiveTime::parse_from_str(&s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
        .map_err(|e| SqlError::Parse(format!("bad time {s}: {e}")))
}

fn timestamp_from_str(s: &str) -> Result<NaiveDateTime, SqlError> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s}")))
}

fn parse_timestamp_or_null(expr: &Expr) -> Result<Option<NaiveDateTime>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => timestamp_from_str(&parse_string(expr)?).map(Some),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
