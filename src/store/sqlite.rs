use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    CityDirectory, DayQuery, EventCatalog, EventQuery, ModerationStore, StoreError, StoreResult,
    SubmissionStore,
};
use crate::models::{
    optional_text, Artist, City, Event, EventEdit, EventReport, EventStatus, PendingArtist,
    PendingEvent, PendingVenue, Role, SourceType, Venue,
};
use crate::normalize::{city_key, normalize_key};
use crate::utils;

const EVENT_COLUMNS: &str = "id, title, start_datetime, end_datetime, date, city, state, lat, lng,
    status, venue_name, address, postal_code, description, ticket_url, image_url, card_image_url,
    source_type, source_url, artist_name, created_at";

const PENDING_COLUMNS: &str = "id, title, start_datetime, end_datetime, artist_name, artist_id,
    pending_artist_id, venue_name, venue_id, pending_venue_id, address, city, state, postal_code,
    description, ticket_url, image_url, source_type, source_url, status, created_by, created_at";

/// SQLite-backed store. The connection sits behind a mutex and every query
/// runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open_default() -> StoreResult<Self> {
        Self::open(&utils::database_path())
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, job: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".into()))?;
            job(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }

    pub async fn upsert_city(&self, city: City) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO cities (city_name, state, lat, lng, city_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(state, city_name) DO UPDATE SET lat = excluded.lat, lng = excluded.lng",
                params![
                    city.city_name,
                    city.state,
                    city.lat,
                    city.lng,
                    city_key(&city.city_name),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_event(&self, event: Event) -> StoreResult<()> {
        self.run(move |conn| {
            write_event(conn, &event)?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_artist(&self, artist: Artist) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO artists (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![artist.id, artist.name],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_venue(&self, venue: Venue) -> StoreResult<()> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO venues (id, name, city, state, address) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   city = excluded.city,
                   state = excluded.state,
                   address = excluded.address",
                params![venue.id, venue.name, venue.city, venue.state, venue.address],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_role(&self, user_id: &str, role: Role) -> StoreResult<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO user_roles (user_id, role) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
                params![user_id, role.as_str()],
            )?;
            Ok(())
        })
        .await
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cities(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            city_name TEXT NOT NULL,
            state TEXT NOT NULL,
            lat REAL,
            lng REAL,
            city_key TEXT NOT NULL DEFAULT '',
            UNIQUE(state, city_name)
        );
        CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            start_datetime TEXT,
            end_datetime TEXT,
            date TEXT,
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            lat REAL,
            lng REAL,
            status TEXT NOT NULL DEFAULT 'pending',
            venue_name TEXT,
            address TEXT,
            postal_code TEXT,
            description TEXT,
            ticket_url TEXT,
            image_url TEXT,
            card_image_url TEXT,
            source_type TEXT,
            source_url TEXT,
            artist_name TEXT,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS events_status_state ON events(status, state);
        CREATE TABLE IF NOT EXISTS pending_events(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            start_datetime TEXT,
            end_datetime TEXT,
            artist_name TEXT,
            artist_id TEXT,
            pending_artist_id TEXT,
            venue_name TEXT NOT NULL,
            venue_id TEXT,
            pending_venue_id TEXT,
            address TEXT,
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            postal_code TEXT,
            description TEXT,
            ticket_url TEXT,
            image_url TEXT,
            source_type TEXT NOT NULL DEFAULT 'manual',
            source_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_by TEXT,
            created_at TEXT NOT NULL,
            title_key TEXT NOT NULL,
            venue_key TEXT NOT NULL,
            day_key TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS pending_events_dedupe
            ON pending_events(title_key, venue_key, day_key);
        CREATE TABLE IF NOT EXISTS artists(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS venues(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT,
            state TEXT,
            address TEXT
        );
        CREATE TABLE IF NOT EXISTS pending_artists(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            genre TEXT,
            hometown TEXT,
            contact_email TEXT,
            bio TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS pending_venues(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            city TEXT,
            state TEXT,
            address TEXT,
            contact_email TEXT,
            capacity INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS event_reports(
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            issue_type TEXT NOT NULL,
            description TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS event_reports_event ON event_reports(event_id);
        CREATE TABLE IF NOT EXISTS user_roles(
            user_id TEXT PRIMARY KEY,
            role TEXT NOT NULL
        );",
    )?;
    backfill_city_keys(conn)
}

/// Adds and fills `cities.city_key` for files created before the column existed.
fn backfill_city_keys(conn: &Connection) -> rusqlite::Result<()> {
    let has_column: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('cities') WHERE name = 'city_key'",
        [],
        |row| row.get(0),
    )?;
    if has_column == 0 {
        conn.execute(
            "ALTER TABLE cities ADD COLUMN city_key TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }

    let mut stmt = conn.prepare("SELECT id, city_name FROM cities WHERE city_key = ''")?;
    let stale = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (id, name) in stale {
        conn.execute(
            "UPDATE cities SET city_key = ?1 WHERE id = ?2",
            params![city_key(&name), id],
        )?;
    }
    Ok(())
}

fn write_event(conn: &Connection, event: &Event) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO events ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                     ?18, ?19, ?20, ?21)"
        ),
        params![
            event.id,
            event.title,
            event.start_datetime,
            event.end_datetime,
            event.date,
            event.city,
            event.state,
            event.lat,
            event.lng,
            event.status.as_str(),
            event.venue_name,
            event.address,
            event.postal_code,
            event.description,
            event.ticket_url,
            event.image_url,
            event.card_image_url,
            event.source_type.map(|s| s.as_str()),
            event.source_url,
            event.artist_name,
            event.created_at,
        ],
    )
}

fn parse_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            err.into(),
        )
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let source_type: Option<String> = row.get("source_type")?;
    Ok(Event {
        id: row.get("id")?,
        title: row.get("title")?,
        start_datetime: row.get("start_datetime")?,
        end_datetime: row.get("end_datetime")?,
        date: row.get("date")?,
        city: row.get("city")?,
        state: row.get("state")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        status: parse_column(row, "status")?,
        venue_name: row.get("venue_name")?,
        address: row.get("address")?,
        postal_code: row.get("postal_code")?,
        description: row.get("description")?,
        ticket_url: row.get("ticket_url")?,
        image_url: row.get("image_url")?,
        card_image_url: row.get("card_image_url")?,
        source_type: source_type.and_then(|s| s.parse().ok()),
        source_url: row.get("source_url")?,
        artist_name: row.get("artist_name")?,
        created_at: row.get("created_at")?,
    })
}

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingEvent> {
    Ok(PendingEvent {
        id: row.get("id")?,
        title: row.get("title")?,
        start_datetime: row.get("start_datetime")?,
        end_datetime: row.get("end_datetime")?,
        artist_name: row.get("artist_name")?,
        artist_id: row.get("artist_id")?,
        pending_artist_id: row.get("pending_artist_id")?,
        venue_name: row.get("venue_name")?,
        venue_id: row.get("venue_id")?,
        pending_venue_id: row.get("pending_venue_id")?,
        address: row.get("address")?,
        city: row.get("city")?,
        state: row.get("state")?,
        postal_code: row.get("postal_code")?,
        description: row.get("description")?,
        ticket_url: row.get("ticket_url")?,
        image_url: row.get("image_url")?,
        source_type: parse_column::<SourceType>(row, "source_type")?,
        source_url: row.get("source_url")?,
        status: parse_column(row, "status")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn load_pending(conn: &Connection, id: &str) -> StoreResult<PendingEvent> {
    conn.query_row(
        &format!("SELECT {PENDING_COLUMNS} FROM pending_events WHERE id = ?1"),
        params![id],
        pending_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("pending event {id}")))
}

/// Escapes LIKE wildcards so user input only matches literally.
fn like_literal(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn day_filter(query: &DayQuery) -> (String, Vec<String>) {
    let mut sql = String::from(
        " AND venue_name LIKE ?2 ESCAPE '\\' AND substr(start_datetime, 1, 10) = ?3",
    );
    let mut args = vec![like_literal(query.venue_name.trim()), query.day.clone()];
    if let Some(city) = &query.city {
        args.push(like_literal(city.trim()));
        sql.push_str(&format!(" AND city LIKE ?{} ESCAPE '\\'", args.len() + 1));
    }
    if let Some(state) = &query.state {
        args.push(state.clone());
        sql.push_str(&format!(" AND state = ?{}", args.len() + 1));
    }
    (sql, args)
}

fn unique_violation(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate
        }
        _ => StoreError::Sqlite(err),
    }
}

#[async_trait]
impl CityDirectory for SqliteStore {
    async fn find_city(&self, state: &str, city_fragment: &str) -> StoreResult<Option<City>> {
        let state = state.to_string();
        let pattern = format!("%{}%", like_literal(&city_key(city_fragment)));
        self.run(move |conn| {
            let city = conn
                .query_row(
                    "SELECT city_name, state, lat, lng FROM cities
                     WHERE state = ?1 AND city_key LIKE ?2 ESCAPE '\\'
                     ORDER BY id LIMIT 1",
                    params![state, pattern],
                    |row| {
                        Ok(City {
                            city_name: row.get(0)?,
                            state: row.get(1)?,
                            lat: row.get(2)?,
                            lng: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(city)
        })
        .await
    }

    async fn list_cities(&self) -> StoreResult<Vec<City>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT city_name, state, lat, lng FROM cities ORDER BY state, city_name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(City {
                    city_name: row.get(0)?,
                    state: row.get(1)?,
                    lat: row.get(2)?,
                    lng: row.get(3)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl EventCatalog for SqliteStore {
    async fn events(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        let query = query.clone();
        self.run(move |conn| {
            let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE status = ?1");
            let mut args = vec![query.status.as_str().to_string()];
            if let Some(state) = query.state {
                sql.push_str(" AND state = ?2");
                args.push(state);
            }
            sql.push_str(" ORDER BY start_datetime IS NULL, start_datetime ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), event_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn approved_event(&self, id: &str) -> StoreResult<Option<Event>> {
        let id = id.to_string();
        self.run(move |conn| {
            let event = conn
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND status = ?2"),
                    params![id, EventStatus::Approved.as_str()],
                    event_from_row,
                )
                .optional()?;
            Ok(event)
        })
        .await
    }

    async fn approved_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<Event>> {
        let query = query.clone();
        self.run(move |conn| {
            let (filter, args) = day_filter(&query);
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE status = ?1{filter}");
            let mut all_args = vec![EventStatus::Approved.as_str().to_string()];
            all_args.extend(args);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(all_args.iter()), event_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn pending_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<PendingEvent>> {
        let query = query.clone();
        self.run(move |conn| {
            let (filter, args) = day_filter(&query);
            let sql =
                format!("SELECT {PENDING_COLUMNS} FROM pending_events WHERE status = ?1{filter}");
            let mut all_args = vec![EventStatus::Pending.as_str().to_string()];
            all_args.extend(args);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(all_args.iter()), pending_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn insert_pending_event(&self, event: PendingEvent) -> StoreResult<PendingEvent> {
        self.run(move |conn| {
            let mut event = event;
            let now = Utc::now().to_rfc3339();
            let title_key = normalize_key(&event.title);
            let venue_key = normalize_key(&event.venue_name);
            let day_key: String = event
                .start_datetime
                .as_deref()
                .and_then(|s| s.get(..10))
                .unwrap_or_default()
                .to_string();
            if event.id.is_empty() {
                event.id = utils::stable_id(&[&title_key, &venue_key, &day_key, &now]);
            }
            event.status = EventStatus::Pending;
            event.created_at = Some(now);

            conn.execute(
                &format!(
                    "INSERT INTO pending_events ({PENDING_COLUMNS}, title_key, venue_key, day_key)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
                ),
                params![
                    event.id,
                    event.title,
                    event.start_datetime,
                    event.end_datetime,
                    event.artist_name,
                    event.artist_id,
                    event.pending_artist_id,
                    event.venue_name,
                    event.venue_id,
                    event.pending_venue_id,
                    event.address,
                    event.city,
                    event.state,
                    event.postal_code,
                    event.description,
                    event.ticket_url,
                    event.image_url,
                    event.source_type.as_str(),
                    event.source_url,
                    event.status.as_str(),
                    event.created_by,
                    event.created_at,
                    title_key,
                    venue_key,
                    day_key,
                ],
            )
            .map_err(unique_violation)?;
            Ok(event)
        })
        .await
    }

    async fn list_artists(&self) -> StoreResult<Vec<Artist>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM artists ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn list_venues(&self) -> StoreResult<Vec<Venue>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, city, state, address FROM venues ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok(Venue {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    city: row.get(2)?,
                    state: row.get(3)?,
                    address: row.get(4)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn insert_pending_artist(&self, artist: PendingArtist) -> StoreResult<PendingArtist> {
        self.run(move |conn| {
            let mut artist = artist;
            let now = Utc::now().to_rfc3339();
            if artist.id.is_empty() {
                artist.id = utils::stable_id(&["artist", &normalize_key(&artist.name), &now]);
            }
            artist.status = EventStatus::Pending;
            conn.execute(
                "INSERT INTO pending_artists
                   (id, name, genre, hometown, contact_email, bio, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    artist.id,
                    artist.name,
                    artist.genre,
                    artist.hometown,
                    artist.contact_email,
                    artist.bio,
                    artist.status.as_str(),
                    now,
                ],
            )
            .map_err(unique_violation)?;
            Ok(artist)
        })
        .await
    }

    async fn insert_pending_venue(&self, venue: PendingVenue) -> StoreResult<PendingVenue> {
        self.run(move |conn| {
            let mut venue = venue;
            let now = Utc::now().to_rfc3339();
            if venue.id.is_empty() {
                venue.id = utils::stable_id(&["venue", &normalize_key(&venue.name), &now]);
            }
            venue.status = EventStatus::Pending;
            conn.execute(
                "INSERT INTO pending_venues
                   (id, name, city, state, address, contact_email, capacity, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    venue.id,
                    venue.name,
                    venue.city,
                    venue.state,
                    venue.address,
                    venue.contact_email,
                    venue.capacity,
                    venue.status.as_str(),
                    now,
                ],
            )
            .map_err(unique_violation)?;
            Ok(venue)
        })
        .await
    }

    async fn insert_event_report(&self, report: EventReport) -> StoreResult<EventReport> {
        self.run(move |conn| {
            let mut report = report;
            let now = Utc::now().to_rfc3339();
            if report.id.is_empty() {
                report.id = utils::stable_id(&["report", &report.event_id, &now]);
            }
            conn.execute(
                "INSERT INTO event_reports (id, event_id, issue_type, description, email, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    report.id,
                    report.event_id,
                    report.issue_type.as_str(),
                    report.description,
                    report.email,
                    now,
                ],
            )?;
            report.created_at = Some(now);
            Ok(report)
        })
        .await
    }
}

#[async_trait]
impl ModerationStore for SqliteStore {
    async fn role_for(&self, user_id: &str) -> StoreResult<Option<Role>> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let role = conn
                .query_row(
                    "SELECT role FROM user_roles WHERE user_id = ?1",
                    params![user_id],
                    |row| parse_column::<Role>(row, "role"),
                )
                .optional()?;
            Ok(role)
        })
        .await
    }

    async fn pending_queue(&self) -> StoreResult<Vec<PendingEvent>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PENDING_COLUMNS} FROM pending_events
                 WHERE status = 'pending' ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], pending_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn approve_pending(&self, id: &str) -> StoreResult<Event> {
        let id = id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let pending = load_pending(&tx, &id)?;
            let event = pending.to_approved_event();
            write_event(&tx, &event)?;
            tx.execute(
                "UPDATE pending_events SET status = 'approved' WHERE id = ?1",
                params![id],
            )?;
            tx.commit()?;
            Ok(event)
        })
        .await
    }

    async fn reject_pending(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE pending_events SET status = 'rejected' WHERE id = ?1",
                params![id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("pending event {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn update_pending(&self, id: &str, edit: &EventEdit) -> StoreResult<PendingEvent> {
        let id = id.to_string();
        let edit = edit.clone();
        self.run(move |conn| {
            let start = edit.start_datetime();
            let changed = conn
                .execute(
                    "UPDATE pending_events SET
                       title = ?2, start_datetime = ?3, venue_name = ?4, address = ?5,
                       city = ?6, state = ?7, postal_code = ?8, description = ?9,
                       ticket_url = ?10, image_url = ?11,
                       title_key = ?12, venue_key = ?13, day_key = ?14
                     WHERE id = ?1",
                    params![
                        id,
                        edit.title.trim(),
                        start,
                        edit.venue_name.trim(),
                        optional_text(&edit.address),
                        edit.city.trim(),
                        edit.state.trim().to_uppercase(),
                        optional_text(&edit.postal_code),
                        optional_text(&edit.description),
                        optional_text(&edit.ticket_url),
                        optional_text(&edit.image_url),
                        normalize_key(&edit.title),
                        normalize_key(&edit.venue_name),
                        start.get(..10).unwrap_or_default(),
                    ],
                )
                .map_err(unique_violation)?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("pending event {id}")));
            }
            load_pending(conn, &id)
        })
        .await
    }
}
