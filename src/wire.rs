use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::{stream, Sink, SinkExt};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::response::NotificationResponse;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use ulid::Ulid;

use crate::auth::AmenityAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::notify::{channel_name, parse_channel};
use crate::observability;
use crate::sql::{self, Command, SqlError};

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(AmenityFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

/// Query handler for a single connection. LISTEN subscriptions live here,
/// so they end with the connection.
pub struct AmenityHandler {
    engine: Arc<Engine>,
    query_parser: Arc<AmenityQueryParser>,
    listeners: Mutex<HashMap<Ulid, broadcast::Receiver<Event>>>,
}

impl AmenityHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(AmenityQueryParser),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Forward events queued on this connection's channels. Postgres clients
    /// pick these up alongside the next statement's response.
    async fn flush_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let mut pending = Vec::new();
        {
            let mut listeners = self.listeners.lock().await;
            let mut closed = Vec::new();
            for (area_id, rx) in listeners.iter_mut() {
                loop {
                    match rx.try_recv() {
                        Ok(event) => pending.push((*area_id, event)),
                        Err(broadcast::error::TryRecvError::Empty) => break,
                        Err(broadcast::error::TryRecvError::Lagged(n)) => {
                            tracing::warn!("listener on {} lagged, {n} notifications dropped", channel_name(area_id));
                        }
                        Err(broadcast::error::TryRecvError::Closed) => {
                            closed.push(*area_id);
                            break;
                        }
                    }
                }
            }
            for area_id in closed {
                listeners.remove(&area_id);
            }
        }

        for (area_id, event) in pending {
            let message = NotificationResponse::new(0, channel_name(&area_id), notification_payload(&event));
            client.send(PgWireBackendMessage::NotificationResponse(message)).await?;
        }
        Ok(())
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, query: &str, format: Option<&Format>) -> PgWireResult<Vec<Response>> {
        let started = Instant::now();
        let cmd = match sql::parse_sql(query) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "parse", "status" => "error").increment(1);
                return Err(sql_err(e));
            }
        };
        let label = observability::command_label(&cmd);
        let result = self.execute_command(cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command, format: Option<&Format>) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertArea { id, config } => {
                engine.create_area(id, config).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateArea { id, patch } => {
                engine.update_area(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteArea { id } => {
                engine.delete_area(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertReservation { request } => {
                engine.request_reservation(request).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetReservationStatus { id, status, notes } => {
                engine.transition(id, status, notes).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RescheduleReservation { id, date, start, end } => {
                engine
                    .reschedule_reservation(id, date, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteReservation { id } => {
                engine.delete_reservation(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectAreas { id } => {
                let areas = match id {
                    Some(id) => vec![engine.get_area(&id).await.map_err(engine_err)?],
                    None => engine.list_areas().await,
                };
                let schema = Arc::new(schema_for("areas", format));
                let rows = areas.iter().map(|a| encode_area(&schema, a)).collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectReservations { filter } => {
                let reservations = engine.list_reservations(&filter).await.map_err(engine_err)?;
                Ok(vec![reservations_response(&reservations, "reservations", format)])
            }
            Command::SelectUpcoming { unit, from } => {
                let from = from.unwrap_or_else(|| chrono::Local::now().date_naive());
                let reservations = engine.upcoming_for_unit(unit, from).await;
                Ok(vec![reservations_response(&reservations, "upcoming", format)])
            }
            Command::SelectSlots { area_id, date } => {
                let slots = engine.available_slots(&area_id, date).await.map_err(engine_err)?;
                let schema = Arc::new(schema_for("slots", format));
                let rows = slots
                    .iter()
                    .map(|slot| encode_window(&schema, area_id, date, slot, false))
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectAvailability {
                area_id,
                date,
                min_duration,
            } => {
                let windows = engine
                    .free_windows(&area_id, date, min_duration)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(schema_for("availability", format));
                let rows = windows
                    .iter()
                    .map(|w| encode_window(&schema, area_id, date, w, true))
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectAvailabilityCheck { area_id, date, span } => {
                let available = engine.is_available(&area_id, date, span).await.map_err(engine_err)?;
                let schema = Arc::new(schema_for("availability_check", format));
                let row = encode_check(&schema, area_id, date, &span, available);
                Ok(vec![query_response(schema, vec![row])])
            }
            Command::SelectQuote { area_id, span } => {
                let total = engine.compute_cost(&area_id, span).await.map_err(engine_err)?;
                let rate = engine.get_area(&area_id).await.map_err(engine_err)?.config.hourly_rate;
                let schema = Arc::new(schema_for("quotes", format));
                let row = encode_quote(&schema, area_id, &span, rate, total);
                Ok(vec![query_response(schema, vec![row])])
            }
            Command::SelectOccupiedDates { area_id, month } => {
                let dates = engine.occupied_dates(&area_id, month).await.map_err(engine_err)?;
                let schema = Arc::new(schema_for("occupied_dates", format));
                let id_str = area_id.to_string();
                let rows: Vec<Row> = dates
                    .iter()
                    .map(|d| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&id_str)?;
                        encoder.encode_field(&d.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::Listen { channel } => {
                let area_id = parse_channel(&channel).ok_or_else(|| bad_channel(&channel))?;
                engine.get_area(&area_id).await.map_err(engine_err)?;
                let mut listeners = self.listeners.lock().await;
                if !listeners.contains_key(&area_id) {
                    listeners.insert(area_id, engine.subscribe(area_id));
                }
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
            Command::Unlisten { channel } => {
                let area_id = parse_channel(&channel).ok_or_else(|| bad_channel(&channel))?;
                self.listeners.lock().await.remove(&area_id);
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
            Command::UnlistenAll => {
                self.listeners.lock().await.clear();
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
        }
    }
}

// ── Result encoding ──────────────────────────────────────────────

type Row = PgWireResult<pgwire::messages::data::DataRow>;

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<Row>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_area(schema: &Arc<Vec<FieldInfo>>, area: &AreaInfo) -> Row {
    let c = &area.config;
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&area.id.to_string())?;
    encoder.encode_field(&c.name)?;
    encoder.encode_field(&c.description)?;
    encoder.encode_field(&(c.capacity as i32))?;
    encoder.encode_field(&format_cents(c.hourly_rate))?;
    encoder.encode_field(&format_minute(c.opens))?;
    encoder.encode_field(&format_minute(c.closes))?;
    encoder.encode_field(&c.enabled)?;
    encoder.encode_field(&(c.min_minutes as i32))?;
    encoder.encode_field(&(c.max_minutes as i32))?;
    Ok(encoder.take_row())
}

fn encode_reservation(schema: &Arc<Vec<FieldInfo>>, r: &Reservation) -> Row {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&r.id.to_string())?;
    encoder.encode_field(&r.area_id.to_string())?;
    encoder.encode_field(&i64::from(r.unit))?;
    encoder.encode_field(&r.contact.name)?;
    encoder.encode_field(&r.contact.phone)?;
    encoder.encode_field(&r.contact.email)?;
    encoder.encode_field(&r.date.to_string())?;
    encoder.encode_field(&format_minute(r.span.start))?;
    encoder.encode_field(&format_minute(r.span.end))?;
    encoder.encode_field(&(r.headcount as i32))?;
    encoder.encode_field(&r.purpose)?;
    encoder.encode_field(&format_cents(r.total_cost))?;
    encoder.encode_field(&r.status.as_str())?;
    encoder.encode_field(&r.notes)?;
    encoder.encode_field(&r.created_at)?;
    encoder.encode_field(&r.updated_at)?;
    Ok(encoder.take_row())
}

fn reservations_response(reservations: &[Reservation], table: &str, format: Option<&Format>) -> Response {
    let schema = Arc::new(schema_for(table, format));
    let rows = reservations.iter().map(|r| encode_reservation(&schema, r)).collect();
    query_response(schema, rows)
}

fn encode_window(schema: &Arc<Vec<FieldInfo>>, area_id: Ulid, date: chrono::NaiveDate, span: &Span, minutes: bool) -> Row {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&area_id.to_string())?;
    encoder.encode_field(&date.to_string())?;
    encoder.encode_field(&format_minute(span.start))?;
    encoder.encode_field(&format_minute(span.end))?;
    if minutes {
        encoder.encode_field(&(span.duration_minutes() as i32))?;
    }
    Ok(encoder.take_row())
}

fn encode_check(schema: &Arc<Vec<FieldInfo>>, area_id: Ulid, date: chrono::NaiveDate, span: &Span, available: bool) -> Row {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&area_id.to_string())?;
    encoder.encode_field(&date.to_string())?;
    encoder.encode_field(&format_minute(span.start))?;
    encoder.encode_field(&format_minute(span.end))?;
    encoder.encode_field(&available)?;
    Ok(encoder.take_row())
}

fn encode_quote(schema: &Arc<Vec<FieldInfo>>, area_id: Ulid, span: &Span, rate: Cents, total: Cents) -> Row {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&area_id.to_string())?;
    encoder.encode_field(&format_minute(span.start))?;
    encoder.encode_field(&format_minute(span.end))?;
    encoder.encode_field(&(span.duration_minutes() as i32))?;
    encoder.encode_field(&format_cents(rate))?;
    encoder.encode_field(&format_cents(total))?;
    Ok(encoder.take_row())
}

/// Result columns of each readable table. Unknown tables have none.
fn schema_for(table: &str, format: Option<&Format>) -> Vec<FieldInfo> {
    use Type as T;
    let columns: &[(&str, Type)] = match table {
        "areas" => &[
            ("id", T::VARCHAR),
            ("name", T::VARCHAR),
            ("description", T::VARCHAR),
            ("capacity", T::INT4),
            ("hourly_rate", T::VARCHAR),
            ("opens", T::VARCHAR),
            ("closes", T::VARCHAR),
            ("enabled", T::BOOL),
            ("min_minutes", T::INT4),
            ("max_minutes", T::INT4),
        ],
        "reservations" | "upcoming" => &[
            ("id", T::VARCHAR),
            ("area_id", T::VARCHAR),
            ("unit", T::INT8),
            ("requester", T::VARCHAR),
            ("phone", T::VARCHAR),
            ("email", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start", T::VARCHAR),
            ("end", T::VARCHAR),
            ("headcount", T::INT4),
            ("purpose", T::VARCHAR),
            ("total_cost", T::VARCHAR),
            ("status", T::VARCHAR),
            ("notes", T::VARCHAR),
            ("created_at", T::INT8),
            ("updated_at", T::INT8),
        ],
        "slots" => &[
            ("area_id", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start", T::VARCHAR),
            ("end", T::VARCHAR),
        ],
        "availability" => &[
            ("area_id", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start", T::VARCHAR),
            ("end", T::VARCHAR),
            ("minutes", T::INT4),
        ],
        "availability_check" => &[
            ("area_id", T::VARCHAR),
            ("date", T::VARCHAR),
            ("start", T::VARCHAR),
            ("end", T::VARCHAR),
            ("available", T::BOOL),
        ],
        "quotes" => &[
            ("area_id", T::VARCHAR),
            ("start", T::VARCHAR),
            ("end", T::VARCHAR),
            ("minutes", T::INT4),
            ("hourly_rate", T::VARCHAR),
            ("total_cost", T::VARCHAR),
        ],
        "occupied_dates" => &[("area_id", T::VARCHAR), ("date", T::VARCHAR)],
        _ => &[],
    };
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            let field_format = format.map_or(FieldFormat::Text, |f| f.format_for(i));
            FieldInfo::new(name.to_string(), None, None, ty.clone(), field_format)
        })
        .collect()
}

fn statement_schema(sql: &str, format: Option<&Format>) -> Vec<FieldInfo> {
    sql::select_table(sql).map_or_else(Vec::new, |table| schema_for(&table, format))
}

/// JSON body of a NOTIFY message for `event`.
fn notification_payload(event: &Event) -> String {
    let mut payload = serde_json::json!({
        "kind": event.kind(),
        "area_id": event.area_id().to_string(),
    });
    let details = match event {
        Event::ReservationRequested { reservation: r } => serde_json::json!({
            "reservation_id": r.id.to_string(),
            "date": r.date.to_string(),
            "start": format_minute(r.span.start),
            "end": format_minute(r.span.end),
            "status": r.status.as_str(),
        }),
        Event::ReservationStatusChanged { id, date, status, .. } => serde_json::json!({
            "reservation_id": id.to_string(),
            "date": date.to_string(),
            "status": status.as_str(),
        }),
        Event::ReservationRescheduled { id, date, span, .. } => serde_json::json!({
            "reservation_id": id.to_string(),
            "date": date.to_string(),
            "start": format_minute(span.start),
            "end": format_minute(span.end),
        }),
        Event::ReservationDeleted { id, date, .. } => serde_json::json!({
            "reservation_id": id.to_string(),
            "date": date.to_string(),
        }),
        Event::AreaCreated { .. } | Event::AreaUpdated { .. } | Event::AreaDeleted { .. } => serde_json::json!({}),
    };
    if let (Some(out), serde_json::Value::Object(extra)) = (payload.as_object_mut(), details) {
        out.extend(extra);
    }
    payload.to_string()
}

#[async_trait]
impl SimpleQueryHandler for AmenityHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.flush_notifications(client).await?;
        self.run(query, None).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AmenityQueryParser;

#[async_trait]
impl QueryParser for AmenityQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt, column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AmenityHandler {
    type Statement = String;
    type QueryParser = AmenityQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(&self, client: &mut C, portal: &Portal<Self::Statement>, _max_rows: usize) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.flush_notifications(client).await?;
        let sql = substitute_params(portal);
        let responses = self.run(&sql, Some(&portal.result_column_format)).await?;
        Ok(responses.into_iter().next().unwrap_or(Response::EmptyQuery))
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
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement, None),
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
            Some(&target.result_column_format),
        )))
    }
}

/// `$n` placeholders outside quoted literals and identifiers, as
/// `(start, end, n)` byte ranges in left-to-right order.
fn placeholders(sql: &str) -> Vec<(usize, usize, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // A doubled quote closes and reopens, which leaves us inside.
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'$' => {
                let start = i;
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if let Ok(n) = sql[start + 1..end].parse::<usize>() {
                    found.push((start, end, n));
                }
                i = end;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, _, n)| n).max().unwrap_or(0)
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    bind_params(&portal.statement.statement, &params)
}

/// Replace each placeholder once, in a single pass, so text inside a bound
/// value is never substituted again. Unknown `$n` are left as written.
fn bind_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut last = 0;
    for (start, end, n) in placeholders(sql) {
        result.push_str(&sql[last..start]);
        match n.checked_sub(1).and_then(|i| params.get(i)) {
            Some(Some(text)) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            Some(None) => result.push_str("NULL"),
            None => result.push_str(&sql[start..end]),
        }
        last = end;
    }
    result.push_str(&sql[last..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AmenityFactory {
    handler: Arc<AmenityHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<AmenityAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AmenityFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = AmenityAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AmenityHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AmenityFactory {
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

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error("P0001", e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

fn bad_channel(channel: &str) -> PgWireError {
    user_error("42000", format!("invalid channel: {channel} (expected area_{{id}})"))
}
