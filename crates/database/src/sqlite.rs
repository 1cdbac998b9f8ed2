use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row,
    functions::FunctionFlags,
    params, params_from_iter,
    types::{Type, Value as SqlValue},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::{Arc, Mutex};

use app_error::{AppError, AppErrorExt, AppResult};
use app_models::{
    ActivityLog, ChatMessage, ChatSession, Movie, MoviePatch, Order, Review, User,
};

use crate::query::{Condition, MovieQuery};
use crate::timestamp;
use crate::store::{ActivityStore, ChatStore, MovieStore, OrderStore, ReviewStore, UserStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS movies (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    release_year INTEGER NOT NULL,
    genres TEXT NOT NULL,
    country TEXT NOT NULL,
    price REAL NOT NULL,
    in_stock INTEGER NOT NULL,
    image TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    admin INTEGER NOT NULL,
    email_verified INTEGER NOT NULL,
    verification_token TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_verification_token ON users(verification_token);
CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    user_id TEXT NOT NULL,
    movie_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reviews_movie ON reviews(movie_id);
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    movies TEXT NOT NULL,
    total REAL NOT NULL,
    order_status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS activity_logs (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    action TEXT NOT NULL,
    detail TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    client_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    closed_at TEXT
);
CREATE TABLE IF NOT EXISTS chat_messages (
    id TEXT PRIMARY KEY,
    chat_session_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(chat_session_id);
";

const MOVIE_COLUMNS: &str =
    "id, title, description, release_year, genres, country, price, in_stock, image, created_at";
const USER_COLUMNS: &str = "id, name, email, password, admin, email_verified, verification_token, created_at, updated_at";
const REVIEW_COLUMNS: &str = "id, content, user_id, movie_id, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, movies, total, order_status, created_at";
const SESSION_COLUMNS: &str = "id, client_id, status, created_at, closed_at";
const MESSAGE_COLUMNS: &str = "id, chat_session_id, sender, content, timestamp";

/// Relational store backed by SQLite. Arrays are stored as JSON text and
/// timestamps as fixed-width RFC 3339 text so they sort chronologically.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`; `:memory:` gives a private
    /// in-memory database.
    pub fn open(path: &str) -> AppResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .with_context(|| format!("Failed to open SQLite database at {}", path))
        .db_err()?;

        register_functions(&conn)
            .context("Failed to register SQLite functions")
            .db_err()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialise SQLite schema")
            .db_err()?;

        tracing::info!("Opened SQLite database at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> AppResult<Self> {
        Self::open(":memory:")
    }

    fn with_conn<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> AppResult<R> {
        let conn = self.conn.lock().map_err(|_| {
            AppError::DatabaseError(anyhow::anyhow!(
                "connection lock poisoned during {}",
                operation
            ))
        })?;
        f(&*conn)
            .with_context(|| format!("Failed to {}", operation))
            .db_err()
    }

    fn query_all<T>(
        &self,
        operation: &str,
        sql: &str,
        values: Vec<SqlValue>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> AppResult<Vec<T>> {
        self.with_conn(operation, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), map)?;
            rows.collect()
        })
    }

    fn query_one<T>(
        &self,
        operation: &str,
        sql: &str,
        values: Vec<SqlValue>,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> AppResult<Option<T>> {
        self.with_conn(operation, |conn| {
            conn.query_row(sql, params_from_iter(values.iter()), map)
                .optional()
        })
    }
}

/// `unicode_lower(text)`: full Unicode lowercasing, matching the Rust-side
/// folding of search terms. The built-in `LOWER()` only folds ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

fn ts(time: &DateTime<Utc>) -> String {
    timestamp::format(time)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .context("Failed to encode JSON column")
        .server_err()
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

fn movie_from_row(row: &Row<'_>) -> rusqlite::Result<Movie> {
    Ok(Movie {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        release_year: row.get(3)?,
        genres: parse_json(4, row.get(4)?)?,
        country: row.get(5)?,
        price: row.get(6)?,
        in_stock: row.get(7)?,
        image: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        admin: row.get(4)?,
        email_verified: row.get(5)?,
        verification_token: row.get(6)?,
        created_at: parse_ts(7, row.get(7)?)?,
        updated_at: parse_ts(8, row.get(8)?)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        content: row.get(1)?,
        user_id: row.get(2)?,
        movie_id: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
        updated_at: parse_ts(5, row.get(5)?)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        movies: parse_json(2, row.get(2)?)?,
        total: row.get(3)?,
        order_status: row.get(4)?,
        created_at: parse_ts(5, row.get(5)?)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    let status: String = row.get(2)?;
    let closed_at: Option<String> = row.get(4)?;
    Ok(ChatSession {
        id: row.get(0)?,
        client_id: row.get(1)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?,
        created_at: parse_ts(3, row.get(3)?)?,
        closed_at: closed_at.map(|raw| parse_ts(4, raw)).transpose()?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        chat_session_id: row.get(1)?,
        sender: row.get(2)?,
        content: row.get(3)?,
        timestamp: parse_ts(4, row.get(4)?)?,
    })
}

/// Render conditions as an SQL `WHERE` body with positional parameters.
fn render_conditions(conditions: &[Condition]) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for condition in conditions {
        match condition {
            Condition::AllGenres(genres) => {
                for genre in genres {
                    clauses.push(
                        "EXISTS (SELECT 1 FROM json_each(movies.genres) WHERE json_each.value = ?)"
                            .to_string(),
                    );
                    values.push(text(genre));
                }
            }
            Condition::HasGenre(genre) => {
                clauses.push(
                    "EXISTS (SELECT 1 FROM json_each(movies.genres) WHERE json_each.value = ?)"
                        .to_string(),
                );
                values.push(text(genre));
            }
            Condition::CountryIn(countries) => {
                let placeholders = vec!["?"; countries.len()].join(", ");
                clauses.push(format!("country IN ({})", placeholders));
                values.extend(countries.iter().map(|c| text(c)));
            }
            Condition::YearMin(year) => {
                clauses.push("release_year >= ?".to_string());
                values.push(SqlValue::Integer(i64::from(*year)));
            }
            Condition::YearMax(year) => {
                clauses.push("release_year <= ?".to_string());
                values.push(SqlValue::Integer(i64::from(*year)));
            }
            Condition::TitleContains(fragment) => {
                clauses.push("unicode_lower(title) LIKE ? ESCAPE '\\'".to_string());
                values.push(SqlValue::Text(format!("%{}%", escape_like(fragment))));
            }
            Condition::PriceMin(price) => {
                clauses.push("price >= ?".to_string());
                values.push(SqlValue::Real(*price));
            }
            Condition::PriceMax(price) => {
                clauses.push("price <= ?".to_string());
                values.push(SqlValue::Real(*price));
            }
            Condition::InStock(available) => {
                clauses.push("in_stock = ?".to_string());
                values.push(SqlValue::Integer(i64::from(*available)));
            }
        }
    }

    (clauses.join(" AND "), values)
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl MovieStore for SqliteStore {
    async fn create_movie(&self, movie: &Movie) -> AppResult<()> {
        let genres = to_json(&movie.genres)?;
        self.with_conn("create movie", |conn| {
            conn.execute(
                &format!("INSERT INTO movies ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", MOVIE_COLUMNS),
                params![
                    movie.id,
                    movie.title,
                    movie.description,
                    movie.release_year,
                    genres,
                    movie.country,
                    movie.price,
                    movie.in_stock,
                    movie.image,
                    ts(&movie.created_at),
                ],
            )
        })?;
        Ok(())
    }

    async fn get_movie(&self, id: &str) -> AppResult<Option<Movie>> {
        self.query_one(
            "fetch movie",
            &format!("SELECT {} FROM movies WHERE id = ?", MOVIE_COLUMNS),
            vec![text(id)],
            movie_from_row,
        )
    }

    async fn list_movies(&self) -> AppResult<Vec<Movie>> {
        self.query_all(
            "list movies",
            &format!("SELECT {} FROM movies ORDER BY title ASC, id ASC", MOVIE_COLUMNS),
            Vec::new(),
            movie_from_row,
        )
    }

    async fn update_movie(&self, id: &str, patch: MoviePatch) -> AppResult<Option<Movie>> {
        let Some(mut movie) = self.get_movie(id).await? else {
            return Ok(None);
        };
        movie.apply(patch);
        let genres = to_json(&movie.genres)?;

        self.with_conn("update movie", |conn| {
            conn.execute(
                "UPDATE movies SET title = ?2, description = ?3, release_year = ?4, genres = ?5,
                 country = ?6, price = ?7, in_stock = ?8, image = ?9 WHERE id = ?1",
                params![
                    movie.id,
                    movie.title,
                    movie.description,
                    movie.release_year,
                    genres,
                    movie.country,
                    movie.price,
                    movie.in_stock,
                    movie.image,
                ],
            )
        })?;
        Ok(Some(movie))
    }

    async fn delete_movie(&self, id: &str) -> AppResult<bool> {
        let deleted = self.with_conn("delete movie", |conn| {
            conn.execute("DELETE FROM movies WHERE id = ?1", params![id])
        })?;
        Ok(deleted > 0)
    }

    async fn find_movies(&self, query: &MovieQuery) -> AppResult<(Vec<Movie>, u64)> {
        let (clause, values) = render_conditions(&query.conditions);
        let where_sql = if clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clause)
        };

        let count_sql = format!("SELECT COUNT(*) FROM movies{}", where_sql);
        let total: i64 = self.with_conn("count movies", |conn| {
            conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
        })?;

        let page_sql = format!(
            "SELECT {} FROM movies{} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            MOVIE_COLUMNS,
            where_sql,
            query.sort.field.column(),
            query.sort.order.keyword()
        );
        let mut page_values = values;
        page_values.push(SqlValue::Integer(to_i64(query.pagination.limit)));
        page_values.push(SqlValue::Integer(to_i64(query.pagination.skip())));

        let movies = self.query_all("search movies", &page_sql, page_values, movie_from_row)?;

        tracing::debug!(total, returned = movies.len(), status = query.status(), "Movie search");
        Ok((movies, total.max(0) as u64))
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| {
            AppError::DatabaseError(anyhow::anyhow!("connection lock poisoned during create user"))
        })?;
        let result = conn.execute(
            &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", USER_COLUMNS),
            params![
                user.id,
                user.name,
                user.email,
                user.password,
                user.admin,
                user.email_verified,
                user.verification_token,
                ts(&user.created_at),
                ts(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(AppError::resource_exists("User", &user.email))
            }
            Err(e) => Err(e).context("Failed to create user").db_err(),
        }
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        self.query_one(
            "fetch user",
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            vec![text(id)],
            user_from_row,
        )
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.query_one(
            "fetch user by email",
            &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
            vec![text(email)],
            user_from_row,
        )
    }

    async fn get_user_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        self.query_one(
            "fetch user by verification token",
            &format!("SELECT {} FROM users WHERE verification_token = ? LIMIT 1", USER_COLUMNS),
            vec![text(token)],
            user_from_row,
        )
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.query_all(
            "list users",
            &format!("SELECT {} FROM users ORDER BY created_at ASC, id ASC", USER_COLUMNS),
            Vec::new(),
            user_from_row,
        )
    }

    async fn mark_email_verified(&self, id: &str) -> AppResult<bool> {
        let now = ts(&Utc::now());
        let updated = self.with_conn("verify user email", |conn| {
            conn.execute(
                "UPDATE users SET email_verified = 1, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )
        })?;
        Ok(updated > 0)
    }

    async fn delete_user(&self, id: &str) -> AppResult<bool> {
        let deleted = self.with_conn("delete user", |conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", params![id])
        })?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn create_review(&self, review: &Review) -> AppResult<()> {
        self.with_conn("create review", |conn| {
            conn.execute(
                &format!("INSERT INTO reviews ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", REVIEW_COLUMNS),
                params![
                    review.id,
                    review.content,
                    review.user_id,
                    review.movie_id,
                    ts(&review.created_at),
                    ts(&review.updated_at),
                ],
            )
        })?;
        Ok(())
    }

    async fn get_review(&self, id: &str) -> AppResult<Option<Review>> {
        self.query_one(
            "fetch review",
            &format!("SELECT {} FROM reviews WHERE id = ?", REVIEW_COLUMNS),
            vec![text(id)],
            review_from_row,
        )
    }

    async fn list_reviews(&self, movie_id: Option<&str>) -> AppResult<Vec<Review>> {
        match movie_id {
            Some(movie_id) => self.query_all(
                "list reviews",
                &format!(
                    "SELECT {} FROM reviews WHERE movie_id = ? ORDER BY created_at ASC, id ASC",
                    REVIEW_COLUMNS
                ),
                vec![text(movie_id)],
                review_from_row,
            ),
            None => self.query_all(
                "list reviews",
                &format!("SELECT {} FROM reviews ORDER BY created_at ASC, id ASC", REVIEW_COLUMNS),
                Vec::new(),
                review_from_row,
            ),
        }
    }

    async fn update_review(&self, id: &str, content: &str) -> AppResult<Option<Review>> {
        let now = ts(&Utc::now());
        let updated = self.with_conn("update review", |conn| {
            conn.execute(
                "UPDATE reviews SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, now],
            )
        })?;
        if updated == 0 {
            return Ok(None);
        }
        self.get_review(id).await
    }

    async fn delete_review(&self, id: &str) -> AppResult<bool> {
        let deleted = self.with_conn("delete review", |conn| {
            conn.execute("DELETE FROM reviews WHERE id = ?1", params![id])
        })?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn create_order(&self, order: &Order) -> AppResult<()> {
        let movies = to_json(&order.movies)?;
        self.with_conn("create order", |conn| {
            conn.execute(
                &format!("INSERT INTO orders ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", ORDER_COLUMNS),
                params![
                    order.id,
                    order.user_id,
                    movies,
                    order.total,
                    order.order_status,
                    ts(&order.created_at),
                ],
            )
        })?;
        Ok(())
    }

    async fn list_orders(&self) -> AppResult<Vec<Order>> {
        self.query_all(
            "list orders",
            &format!("SELECT {} FROM orders ORDER BY created_at ASC, id ASC", ORDER_COLUMNS),
            Vec::new(),
            order_from_row,
        )
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn log_activity(&self, entry: &ActivityLog) -> AppResult<()> {
        self.with_conn("log activity", |conn| {
            conn.execute(
                "INSERT INTO activity_logs (id, user_id, action, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id,
                    entry.user_id,
                    entry.action,
                    entry.detail,
                    ts(&entry.timestamp),
                ],
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_chat_session(&self, session: &ChatSession) -> AppResult<()> {
        self.with_conn("create chat session", |conn| {
            conn.execute(
                &format!("INSERT INTO chat_sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5)", SESSION_COLUMNS),
                params![
                    session.id,
                    session.client_id,
                    session.status.as_str(),
                    ts(&session.created_at),
                    session.closed_at.as_ref().map(ts),
                ],
            )
        })?;
        Ok(())
    }

    async fn get_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>> {
        self.query_one(
            "fetch chat session",
            &format!("SELECT {} FROM chat_sessions WHERE id = ?", SESSION_COLUMNS),
            vec![text(id)],
            session_from_row,
        )
    }

    async fn find_active_chat_session(&self, client_id: &str) -> AppResult<Option<ChatSession>> {
        self.query_one(
            "fetch active chat session",
            &format!(
                "SELECT {} FROM chat_sessions WHERE client_id = ? AND status = 'active'
                 ORDER BY created_at DESC LIMIT 1",
                SESSION_COLUMNS
            ),
            vec![text(client_id)],
            session_from_row,
        )
    }

    async fn close_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>> {
        let now = ts(&Utc::now());
        self.with_conn("close chat session", |conn| {
            conn.execute(
                "UPDATE chat_sessions SET status = 'closed', closed_at = ?2
                 WHERE id = ?1 AND status = 'active'",
                params![id, now],
            )
        })?;
        self.get_chat_session(id).await
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.with_conn("save chat message", |conn| {
            conn.execute(
                &format!("INSERT INTO chat_messages ({}) VALUES (?1, ?2, ?3, ?4, ?5)", MESSAGE_COLUMNS),
                params![
                    message.id,
                    message.chat_session_id,
                    message.sender,
                    message.content,
                    ts(&message.timestamp),
                ],
            )
        })?;
        Ok(())
    }

    async fn chat_history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        self.query_all(
            "load chat history",
            &format!(
                "SELECT {} FROM chat_messages WHERE chat_session_id = ? ORDER BY timestamp ASC, id ASC",
                MESSAGE_COLUMNS
            ),
            vec![text(session_id)],
            message_from_row,
        )
    }
}
