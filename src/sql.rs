use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Positional column order for `INSERT INTO areas VALUES (...)` without a column list.
const AREA_COLUMNS: &[&str] = &[
    "id",
    "name",
    "description",
    "capacity",
    "hourly_rate",
    "opens",
    "closes",
    "enabled",
    "min_minutes",
    "max_minutes",
];

/// Positional column order for `INSERT INTO reservations VALUES (...)`.
const RESERVATION_COLUMNS: &[&str] = &[
    "id",
    "area_id",
    "unit",
    "requester",
    "phone",
    "email",
    "date",
    "start",
    "end",
    "headcount",
    "purpose",
];

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertArea {
        id: Ulid,
        config: AreaConfig,
    },
    UpdateArea {
        id: Ulid,
        patch: AreaPatch,
    },
    DeleteArea {
        id: Ulid,
    },
    InsertReservation {
        request: ReservationRequest,
    },
    SetReservationStatus {
        id: Ulid,
        status: ReservationStatus,
        notes: Option<String>,
    },
    RescheduleReservation {
        id: Ulid,
        date: Option<NaiveDate>,
        start: Option<Minute>,
        end: Option<Minute>,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectAreas {
        id: Option<Ulid>,
    },
    SelectReservations {
        filter: ReservationFilter,
    },
    SelectUpcoming {
        unit: u32,
        from: Option<NaiveDate>,
    },
    SelectSlots {
        area_id: Ulid,
        date: NaiveDate,
    },
    SelectAvailability {
        area_id: Ulid,
        date: NaiveDate,
        min_duration: Option<Minute>,
    },
    SelectAvailabilityCheck {
        area_id: Ulid,
        date: NaiveDate,
        span: Span,
    },
    SelectQuote {
        area_id: Ulid,
        span: Span,
    },
    SelectOccupiedDates {
        area_id: Ulid,
        month: Option<(i32, u32)>,
    },
    Listen {
        channel: String,
    },
    Unlisten {
        channel: String,
    },
    UnlistenAll,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(cmd) = parse_listen(trimmed) {
        return Ok(cmd);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [one] => one,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection.as_ref()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a SELECT reads from, used to describe result columns before the
/// statement runs. `$n` placeholders are fine here.
pub fn select_table(sql: &str) -> Option<String> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    match stmts.first()? {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => table_factor_name(&select.from.first()?.relation).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn parse_listen(sql: &str) -> Option<Command> {
    let after = |keyword: &str| {
        let head = sql.get(..keyword.len())?;
        let rest = sql.get(keyword.len()..)?;
        (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace))
            .then(|| rest.trim().trim_matches('"').to_string())
    };
    if let Some(name) = after("UNLISTEN") {
        return Some(if name == "*" {
            Command::UnlistenAll
        } else {
            Command::Unlisten { channel: name }
        });
    }
    after("LISTEN").map(|channel| Command::Listen { channel })
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = if insert.columns.is_empty() {
        let positional = match table.as_str() {
            "areas" => AREA_COLUMNS,
            "reservations" => RESERVATION_COLUMNS,
            _ => return Err(SqlError::UnknownTable(table)),
        };
        if values.len() > positional.len() {
            return Err(SqlError::WrongArity("insert", positional.len(), values.len()));
        }
        positional.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("insert", columns.len(), values.len()));
    }
    let row: Vec<(&str, &Expr)> = columns.iter().map(String::as_str).zip(values.iter()).collect();

    match table.as_str() {
        "areas" => parse_area_row(&row),
        "reservations" => parse_reservation_row(&row),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_area_row(row: &[(&str, &Expr)]) -> Result<Command, SqlError> {
    let mut id = None;
    let mut name = None;
    let mut patch = AreaPatch::default();
    for &(column, expr) in row {
        match column {
            "id" => id = Some(parse_ulid(expr)?),
            "name" => name = Some(parse_text(column, expr)?),
            _ => apply_area_column(&mut patch, column, expr)?,
        }
    }
    let id = id.ok_or(SqlError::MissingColumn("id"))?;
    let mut config = AreaConfig::new(name.ok_or(SqlError::MissingColumn("name"))?);
    patch.apply(&mut config);
    Ok(Command::InsertArea { id, config })
}

/// Set one area column on a patch. Shared by INSERT and UPDATE.
fn apply_area_column(patch: &mut AreaPatch, column: &str, expr: &Expr) -> Result<(), SqlError> {
    match column {
        "name" => patch.name = Some(parse_text(column, expr)?),
        "description" => patch.description = Some(optional_text(expr)?),
        "capacity" => patch.capacity = Some(parse_u32(column, expr)?),
        "hourly_rate" => patch.hourly_rate = Some(parse_money(column, expr)?),
        "opens" => patch.opens = Some(parse_time(column, expr)?),
        "closes" => patch.closes = Some(parse_time(column, expr)?),
        "enabled" => patch.enabled = Some(parse_bool(column, expr)?),
        "min_minutes" => patch.min_minutes = Some(parse_u32(column, expr)?),
        "max_minutes" => patch.max_minutes = Some(parse_u32(column, expr)?),
        other => return Err(SqlError::UnknownColumn(other.to_string())),
    }
    Ok(())
}

fn parse_reservation_row(row: &[(&str, &Expr)]) -> Result<Command, SqlError> {
    let (mut id, mut area_id, mut unit, mut name) = (None, None, None, None);
    let (mut phone, mut email, mut purpose) = (None, None, None);
    let (mut date, mut start, mut end) = (None, None, None);
    let mut headcount = 1;
    for &(column, expr) in row {
        match column {
            "id" => id = Some(parse_ulid(expr)?),
            "area_id" => area_id = Some(parse_ulid(expr)?),
            "unit" => unit = Some(parse_u32(column, expr)?),
            "requester" => name = Some(parse_text(column, expr)?),
            "phone" => phone = optional_text(expr)?,
            "email" => email = optional_text(expr)?,
            "date" => date = Some(parse_date_expr(column, expr)?),
            "start" => start = Some(parse_time(column, expr)?),
            "end" => end = Some(parse_time(column, expr)?),
            "headcount" => headcount = parse_u32(column, expr)?,
            "purpose" => purpose = optional_text(expr)?,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    Ok(Command::InsertReservation {
        request: ReservationRequest {
            id: id.ok_or(SqlError::MissingColumn("id"))?,
            area_id: area_id.ok_or(SqlError::MissingColumn("area_id"))?,
            unit: unit.ok_or(SqlError::MissingColumn("unit"))?,
            contact: Contact {
                name: name.ok_or(SqlError::MissingColumn("requester"))?,
                phone,
                email,
            },
            date: date.ok_or(SqlError::MissingColumn("date"))?,
            span: Span::new(
                start.ok_or(SqlError::MissingColumn("start"))?,
                end.ok_or(SqlError::MissingColumn("end"))?,
            ),
            headcount,
            purpose,
        },
    })
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_id(selection)?;
    let mut set = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.push((column, &assignment.value));
    }

    match table.as_str() {
        "areas" => {
            let mut patch = AreaPatch::default();
            for (column, expr) in &set {
                apply_area_column(&mut patch, column, expr)?;
            }
            if patch.is_empty() {
                return Err(SqlError::Unsupported("UPDATE without columns".into()));
            }
            Ok(Command::UpdateArea { id, patch })
        }
        "reservations" => parse_reservation_update(id, &set),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_reservation_update(id: Ulid, set: &[(String, &Expr)]) -> Result<Command, SqlError> {
    let (mut status, mut notes) = (None, None);
    let (mut date, mut start, mut end) = (None, None, None);
    for (column, expr) in set {
        match column.as_str() {
            "status" => {
                let text = parse_text(column, expr)?;
                status = Some(ReservationStatus::parse(&text).ok_or_else(|| SqlError::BadValue {
                    column: column.clone(),
                    value: text,
                })?);
            }
            "notes" => notes = optional_text(expr)?,
            "date" => date = Some(parse_date_expr(column, expr)?),
            "start" => start = Some(parse_time(column, expr)?),
            "end" => end = Some(parse_time(column, expr)?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    let reschedule = date.is_some() || start.is_some() || end.is_some();
    match status {
        Some(_) if reschedule => Err(SqlError::Unsupported(
            "status and schedule must be changed in separate statements".into(),
        )),
        Some(status) => Ok(Command::SetReservationStatus { id, status, notes }),
        None if reschedule && notes.is_none() => Ok(Command::RescheduleReservation { id, date, start, end }),
        None => Err(SqlError::Unsupported(
            "reservations accept SET status [, notes] or SET date/start/end".into(),
        )),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(delete.selection.as_ref())?;

    match table.as_str() {
        "areas" => Ok(Command::DeleteArea { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let from = select
        .from
        .first()
        .ok_or_else(|| SqlError::Parse("SELECT without FROM".into()))?;
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }

    match table.as_str() {
        "areas" => {
            filters.allow(&["id"])?;
            Ok(Command::SelectAreas {
                id: filters.eq("id").map(parse_ulid).transpose()?,
            })
        }
        "reservations" => {
            filters.allow(&["area_id", "date", "unit", "status"])?;
            let status = match filters.eq("status") {
                Some(expr) => {
                    let text = parse_text("status", expr)?;
                    Some(ReservationStatus::parse(&text).ok_or(SqlError::BadValue {
                        column: "status".into(),
                        value: text,
                    })?)
                }
                None => None,
            };
            Ok(Command::SelectReservations {
                filter: ReservationFilter {
                    area_id: filters.eq("area_id").map(parse_ulid).transpose()?,
                    date: filters.eq("date").map(|e| parse_date_expr("date", e)).transpose()?,
                    unit: filters.eq("unit").map(|e| parse_u32("unit", e)).transpose()?,
                    status,
                },
            })
        }
        "upcoming" => {
            filters.allow(&["unit", "date"])?;
            let from = filters
                .with_op("date", &[BinaryOperator::GtEq, BinaryOperator::Eq])
                .map(|e| parse_date_expr("date", e))
                .transpose()?;
            Ok(Command::SelectUpcoming {
                unit: parse_u32("unit", filters.require("unit")?)?,
                from,
            })
        }
        "slots" => {
            filters.allow(&["area_id", "date"])?;
            Ok(Command::SelectSlots {
                area_id: parse_ulid(filters.require("area_id")?)?,
                date: parse_date_expr("date", filters.require("date")?)?,
            })
        }
        "availability" => {
            filters.allow(&["area_id", "date", "min_duration"])?;
            Ok(Command::SelectAvailability {
                area_id: parse_ulid(filters.require("area_id")?)?,
                date: parse_date_expr("date", filters.require("date")?)?,
                min_duration: filters
                    .eq("min_duration")
                    .map(|e| parse_u32("min_duration", e))
                    .transpose()?,
            })
        }
        "availability_check" => {
            filters.allow(&["area_id", "date", "start", "end"])?;
            Ok(Command::SelectAvailabilityCheck {
                area_id: parse_ulid(filters.require("area_id")?)?,
                date: parse_date_expr("date", filters.require("date")?)?,
                span: filters.span()?,
            })
        }
        "quotes" => {
            filters.allow(&["area_id", "start", "end"])?;
            Ok(Command::SelectQuote {
                area_id: parse_ulid(filters.require("area_id")?)?,
                span: filters.span()?,
            })
        }
        "occupied_dates" => {
            filters.allow(&["area_id", "year", "month"])?;
            let year = filters.eq("year").map(|e| parse_i64("year", e)).transpose()?;
            let month = filters.eq("month").map(|e| parse_u32("month", e)).transpose()?;
            let month = match (year, month) {
                (None, None) => None,
                (Some(y), Some(m)) if (1..=12).contains(&m) => {
                    let y = i32::try_from(y).map_err(|_| SqlError::BadValue {
                        column: "year".into(),
                        value: y.to_string(),
                    })?;
                    Some((y, m))
                }
                (Some(_), Some(m)) => {
                    return Err(SqlError::BadValue {
                        column: "month".into(),
                        value: m.to_string(),
                    });
                }
                (Some(_), None) => return Err(SqlError::MissingFilter("month")),
                (None, Some(_)) => return Err(SqlError::MissingFilter("year")),
            };
            Ok(Command::SelectOccupiedDates {
                area_id: parse_ulid(filters.require("area_id")?)?,
                month,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col <op> value` terms of a WHERE clause joined by AND.
#[derive(Default)]
struct Filters<'a> {
    terms: Vec<(String, BinaryOperator, &'a Expr)>,
}

impl<'a> Filters<'a> {
    fn collect(&mut self, expr: &'a Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp { left, op, right } => {
                let column =
                    expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
                self.terms.push((column, op.clone(), right));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    /// Reject filters on columns the table doesn't have.
    fn allow(&self, columns: &[&str]) -> Result<(), SqlError> {
        match self.terms.iter().find(|(c, _, _)| !columns.contains(&c.as_str())) {
            Some((c, _, _)) => Err(SqlError::UnknownColumn(c.clone())),
            None => Ok(()),
        }
    }

    fn with_op(&self, column: &str, ops: &[BinaryOperator]) -> Option<&'a Expr> {
        self.terms
            .iter()
            .find(|(c, op, _)| c == column && ops.contains(op))
            .map(|(_, _, e)| *e)
    }

    fn eq(&self, column: &str) -> Option<&'a Expr> {
        self.with_op(column, &[BinaryOperator::Eq])
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.eq(column).ok_or(SqlError::MissingFilter(column))
    }

    fn span(&self) -> Result<Span, SqlError> {
        Ok(Span::new(
            parse_time("start", self.require("start")?)?,
            parse_time("end", self.require("end")?)?,
        ))
    }
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
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    let first = tables_with_joins
        .first()
        .ok_or_else(|| SqlError::Parse("DELETE without table".into()))?;
    table_factor_name(&first.relation)
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: Option<&Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        Some(Expr::Nested(inner)) => extract_where_id(Some(inner)),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

/// A literal as text; `None` for NULL.
fn literal(expr: &Expr) -> Result<Option<String>, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(Some(s.clone())),
            Value::Boolean(b) => Ok(Some(b.to_string())),
            other => Err(SqlError::Parse(format!("unsupported literal {other}"))),
        },
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => Ok(literal(expr)?.map(|s| format!("-{s}"))),
        other => Err(SqlError::Parse(format!("expected literal, got {other}"))),
    }
}

/// Non-NULL literal parsed with `f`.
fn parse_with<T>(column: &str, expr: &Expr, f: impl FnOnce(&str) -> Option<T>) -> Result<T, SqlError> {
    let text = literal(expr)?.ok_or_else(|| SqlError::NullValue(column.to_string()))?;
    f(&text).ok_or(SqlError::BadValue {
        column: column.to_string(),
        value: text,
    })
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_with("id", expr, |s| Ulid::from_string(s.trim()).ok())
}

fn parse_text(column: &str, expr: &Expr) -> Result<String, SqlError> {
    parse_with(column, expr, |s| Some(s.to_string()))
}

fn optional_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    literal(expr)
}

fn parse_u32(column: &str, expr: &Expr) -> Result<u32, SqlError> {
    parse_with(column, expr, |s| s.trim().parse().ok())
}

fn parse_i64(column: &str, expr: &Expr) -> Result<i64, SqlError> {
    parse_with(column, expr, |s| s.trim().parse().ok())
}

fn parse_time(column: &str, expr: &Expr) -> Result<Minute, SqlError> {
    parse_with(column, expr, parse_minute)
}

fn parse_date_expr(column: &str, expr: &Expr) -> Result<NaiveDate, SqlError> {
    parse_with(column, expr, parse_date)
}

fn parse_money(column: &str, expr: &Expr) -> Result<Cents, SqlError> {
    parse_with(column, expr, parse_cents)
}

fn parse_bool(column: &str, expr: &Expr) -> Result<bool, SqlError> {
    parse_with(column, expr, |s| match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    })
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    NullValue(String),
    BadValue { column: String, value: String },
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(c) => write!(f, "missing column: {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::NullValue(c) => write!(f, "{c} cannot be NULL"),
            SqlError::BadValue { column, value } => write!(f, "invalid value for {column}: {value}"),
        }
    }
}

impl std::error::Error for SqlError {}
