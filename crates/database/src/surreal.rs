use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;
use surrealdb::{Surreal, engine::any::Any, opt::auth::Root};
use tokio::time::timeout;

use app_config::SurrealDbConfig;
use app_error::{AppError, AppErrorExt, AppResult};
use app_models::{
    ActivityLog, ChatMessage, ChatSession, Movie, MoviePatch, Order, Review, User,
};

use crate::query::{Condition, MovieQuery};
use crate::timestamp;
use crate::store::{ActivityStore, ChatStore, MovieStore, OrderStore, ReviewStore, UserStore};

const MOVIES: &str = "movies";
const USERS: &str = "users";
const REVIEWS: &str = "reviews";
const ORDERS: &str = "orders";
const ACTIVITY: &str = "activity_logs";
const CHAT_SESSIONS: &str = "chat_sessions";
const CHAT_MESSAGES: &str = "chat_messages";

type Bindings = Vec<(String, Value)>;

/// Document store backed by SurrealDB. Record ids are plain strings; reads
/// project `meta::id(id)` back into the `id` field.
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    pub async fn connect(config: &SurrealDbConfig) -> AppResult<Self> {
        tracing::debug!("Connecting to SurrealDB: {}", config.endpoint);

        if config.endpoint.starts_with("wss://") {
            tracing::info!("Using secure TLS connection to database");
        } else if !config.is_memory() {
            tracing::warn!("Using non-secure database connection");
        }

        let db = match timeout(
            Duration::from_secs(5),
            surrealdb::engine::any::connect(config.endpoint.as_str()),
        )
        .await
        {
            Ok(conn) => conn.context("Failed to connect to database").db_err()?,
            Err(_) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Database connection timeout - could not establish connection within 5 seconds"
                )));
            }
        };

        if !config.is_memory() {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .context("Failed to authenticate with database")
            .db_err()?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .context("Failed to select namespace and database")
            .db_err()?;

        let store = Self { db };
        store
            .run(
                "DEFINE INDEX IF NOT EXISTS user_email ON TABLE users FIELDS email UNIQUE;
                 DEFINE INDEX IF NOT EXISTS review_movie ON TABLE reviews FIELDS movie_id;
                 DEFINE INDEX IF NOT EXISTS chat_message_session ON TABLE chat_messages FIELDS chat_session_id;",
                Vec::new(),
            )
            .await
            .map_err(|e| wrap(e, "define indexes on", "catalog"))?;

        tracing::info!("Connected to SurrealDB at {}", config.endpoint);
        Ok(store)
    }

    /// Fresh in-memory database.
    pub async fn memory() -> AppResult<Self> {
        Self::connect(&SurrealDbConfig {
            endpoint: "memory".to_string(),
            ..SurrealDbConfig::default()
        })
        .await
    }

    async fn run(&self, sql: &str, bindings: Bindings) -> AppResult<surrealdb::Response> {
        let mut query = self.db.query(sql);
        for binding in bindings {
            query = query.bind(binding);
        }

        let response = query.await.context("Failed to execute query").db_err()?;
        response.check().context("Query returned an error").db_err()
    }

    async fn fetch<T>(&self, sql: &str, bindings: Bindings) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut response = self.run(sql, bindings).await?;
        let rows: Vec<T> = response
            .take(0)
            .context("Failed to extract query results")
            .db_err()?;
        Ok(rows)
    }

    async fn insert<T: Serialize>(&self, table: &'static str, id: &str, record: &T) -> AppResult<()> {
        self.run(
            "CREATE type::thing($table, $id) CONTENT $data RETURN NONE",
            vec![
                bind("table", table),
                bind("id", id),
                ("data".to_string(), content(record)?),
            ],
        )
        .await
        .map(|_| ())
        .map_err(|e| wrap(e, "create", table))
    }

    async fn replace<T: Serialize>(&self, table: &'static str, id: &str, record: &T) -> AppResult<()> {
        self.run(
            "UPDATE type::thing($table, $id) CONTENT $data RETURN NONE",
            vec![
                bind("table", table),
                bind("id", id),
                ("data".to_string(), content(record)?),
            ],
        )
        .await
        .map(|_| ())
        .map_err(|e| wrap(e, "update", table))
    }

    async fn get_by_id<T>(&self, table: &'static str, id: &str) -> AppResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let rows = self
            .fetch(
                "SELECT *, meta::id(id) AS id FROM type::thing($table, $id)",
                vec![bind("table", table), bind("id", id)],
            )
            .await
            .map_err(|e| wrap(e, "fetch", table))?;
        Ok(rows.into_iter().next())
    }

    async fn find_where<T>(
        &self,
        table: &'static str,
        clause: &str,
        tail: &str,
        bindings: Bindings,
    ) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut sql = format!("SELECT *, meta::id(id) AS id FROM {}", table);
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        if !tail.is_empty() {
            sql.push(' ');
            sql.push_str(tail);
        }
        self.fetch(&sql, bindings)
            .await
            .map_err(|e| wrap(e, "query", table))
    }

    async fn remove<T>(&self, table: &'static str, id: &str) -> AppResult<bool>
    where
        T: DeserializeOwned,
    {
        if self.get_by_id::<T>(table, id).await?.is_none() {
            return Ok(false);
        }
        self.run(
            "DELETE type::thing($table, $id) RETURN NONE",
            vec![bind("table", table), bind("id", id)],
        )
        .await
        .map_err(|e| wrap(e, "delete", table))?;
        Ok(true)
    }

    async fn set_fields(
        &self,
        table: &'static str,
        id: &str,
        assignments: &str,
        mut bindings: Bindings,
    ) -> AppResult<()> {
        bindings.push(bind("table", table));
        bindings.push(bind("id", id));
        let sql = format!(
            "UPDATE type::thing($table, $id) SET {} RETURN NONE",
            assignments
        );
        self.run(&sql, bindings)
            .await
            .map(|_| ())
            .map_err(|e| wrap(e, "update", table))
    }
}

fn bind(name: &str, value: impl Into<Value>) -> (String, Value) {
    (name.to_string(), value.into())
}

const TIMESTAMP_FIELDS: [&str; 4] = ["created_at", "updated_at", "timestamp", "closed_at"];

fn now() -> Value {
    Value::from(timestamp::format(&Utc::now()))
}

/// Record body without its `id`; the id lives in the record key. Timestamps
/// are rewritten to the fixed-width form so `ORDER BY` on them is
/// chronological.
fn content<T: Serialize>(record: &T) -> AppResult<Value> {
    let mut value = serde_json::to_value(record)
        .context("Failed to serialize record")
        .server_err()?;
    if let Some(object) = value.as_object_mut() {
        object.remove("id");
        for field in TIMESTAMP_FIELDS {
            if let Some(Value::String(raw)) = object.get_mut(field) {
                if let Some(fixed) = timestamp::normalize(raw) {
                    *raw = fixed;
                }
            }
        }
    }
    Ok(value)
}

/// True when `error` is SurrealDB rejecting a write on the unique `index`.
fn is_unique_violation(error: &anyhow::Error, index: &str) -> bool {
    let message = format!("{:#}", error);
    message.contains(index) && message.contains("already contains")
}

fn wrap(error: AppError, operation: &str, table: &str) -> AppError {
    match error {
        AppError::DatabaseError(err) => AppError::DatabaseError(anyhow::anyhow!(
            "Failed to {} {} record: {:#}",
            operation,
            table,
            err
        )),
        other => other,
    }
}

/// Render conditions as a SurrealQL `WHERE` body with numbered parameters.
fn render_conditions(conditions: &[Condition]) -> (String, Bindings) {
    let mut clauses = Vec::with_capacity(conditions.len());
    let mut bindings = Bindings::new();

    for (i, condition) in conditions.iter().enumerate() {
        let param = format!("p{}", i);
        let (clause, value) = match condition {
            Condition::AllGenres(genres) => {
                (format!("genres CONTAINSALL ${}", param), Value::from(genres.clone()))
            }
            Condition::HasGenre(genre) => {
                (format!("genres CONTAINS ${}", param), Value::from(genre.clone()))
            }
            Condition::CountryIn(countries) => {
                (format!("country INSIDE ${}", param), Value::from(countries.clone()))
            }
            Condition::YearMin(year) => (format!("release_year >= ${}", param), Value::from(*year)),
            Condition::YearMax(year) => (format!("release_year <= ${}", param), Value::from(*year)),
            Condition::TitleContains(fragment) => (
                format!("string::contains(string::lowercase(title), ${})", param),
                Value::from(fragment.clone()),
            ),
            Condition::PriceMin(price) => (format!("price >= ${}", param), Value::from(*price)),
            Condition::PriceMax(price) => (format!("price <= ${}", param), Value::from(*price)),
            Condition::InStock(available) => {
                (format!("in_stock = ${}", param), Value::from(*available))
            }
        };
        clauses.push(clause);
        bindings.push((param, value));
    }

    (clauses.join(" AND "), bindings)
}

#[derive(serde::Deserialize)]
struct CountRow {
    count: u64,
}

#[async_trait]
impl MovieStore for SurrealStore {
    async fn create_movie(&self, movie: &Movie) -> AppResult<()> {
        self.insert(MOVIES, &movie.id, movie).await
    }

    async fn get_movie(&self, id: &str) -> AppResult<Option<Movie>> {
        self.get_by_id(MOVIES, id).await
    }

    async fn list_movies(&self) -> AppResult<Vec<Movie>> {
        self.find_where(MOVIES, "", "ORDER BY title ASC, id ASC", Vec::new())
            .await
    }

    async fn update_movie(&self, id: &str, patch: MoviePatch) -> AppResult<Option<Movie>> {
        let Some(mut movie) = self.get_movie(id).await? else {
            return Ok(None);
        };
        movie.apply(patch);
        self.replace(MOVIES, id, &movie).await?;
        Ok(Some(movie))
    }

    async fn delete_movie(&self, id: &str) -> AppResult<bool> {
        self.remove::<Movie>(MOVIES, id).await
    }

    async fn find_movies(&self, query: &MovieQuery) -> AppResult<(Vec<Movie>, u64)> {
        let (clause, bindings) = render_conditions(&query.conditions);

        let mut count_sql = format!("SELECT count() FROM {}", MOVIES);
        if !clause.is_empty() {
            count_sql.push_str(" WHERE ");
            count_sql.push_str(&clause);
        }
        count_sql.push_str(" GROUP ALL");
        let counts: Vec<CountRow> = self
            .fetch(&count_sql, bindings.clone())
            .await
            .map_err(|e| wrap(e, "count", MOVIES))?;
        let total = counts.first().map(|row| row.count).unwrap_or(0);

        let tail = format!(
            "ORDER BY {} {}, id ASC LIMIT {} START {}",
            query.sort.field.column(),
            query.sort.order.keyword(),
            query.pagination.limit,
            query.pagination.skip()
        );
        let movies = self.find_where(MOVIES, &clause, &tail, bindings).await?;

        tracing::debug!(total, returned = movies.len(), status = query.status(), "Movie search");
        Ok((movies, total))
    }
}

#[async_trait]
impl UserStore for SurrealStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        match self.insert(USERS, &user.id, user).await {
            Err(AppError::DatabaseError(err)) if is_unique_violation(&err, "user_email") => {
                Err(AppError::resource_exists("User", &user.email))
            }
            other => other,
        }
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        self.get_by_id(USERS, id).await
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users: Vec<User> = self
            .find_where(USERS, "email = $email", "LIMIT 1", vec![bind("email", email)])
            .await?;
        Ok(users.into_iter().next())
    }

    async fn get_user_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        let users: Vec<User> = self
            .find_where(
                USERS,
                "verification_token = $token",
                "LIMIT 1",
                vec![bind("token", token)],
            )
            .await?;
        Ok(users.into_iter().next())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.find_where(USERS, "", "ORDER BY created_at ASC", Vec::new()).await
    }

    async fn mark_email_verified(&self, id: &str) -> AppResult<bool> {
        if self.get_user(id).await?.is_none() {
            return Ok(false);
        }
        self.set_fields(
            USERS,
            id,
            "email_verified = true, updated_at = $now",
            vec![("now".to_string(), now())],
        )
        .await?;
        Ok(true)
    }

    async fn delete_user(&self, id: &str) -> AppResult<bool> {
        self.remove::<User>(USERS, id).await
    }
}

#[async_trait]
impl ReviewStore for SurrealStore {
    async fn create_review(&self, review: &Review) -> AppResult<()> {
        self.insert(REVIEWS, &review.id, review).await
    }

    async fn get_review(&self, id: &str) -> AppResult<Option<Review>> {
        self.get_by_id(REVIEWS, id).await
    }

    async fn list_reviews(&self, movie_id: Option<&str>) -> AppResult<Vec<Review>> {
        match movie_id {
            Some(movie_id) => {
                self.find_where(
                    REVIEWS,
                    "movie_id = $movie_id",
                    "ORDER BY created_at ASC",
                    vec![bind("movie_id", movie_id)],
                )
                .await
            }
            None => {
                self.find_where(REVIEWS, "", "ORDER BY created_at ASC", Vec::new())
                    .await
            }
        }
    }

    async fn update_review(&self, id: &str, content: &str) -> AppResult<Option<Review>> {
        if self.get_review(id).await?.is_none() {
            return Ok(None);
        }
        self.set_fields(
            REVIEWS,
            id,
            "content = $content, updated_at = $now",
            vec![bind("content", content), ("now".to_string(), now())],
        )
        .await?;
        self.get_review(id).await
    }

    async fn delete_review(&self, id: &str) -> AppResult<bool> {
        self.remove::<Review>(REVIEWS, id).await
    }
}

#[async_trait]
impl OrderStore for SurrealStore {
    async fn create_order(&self, order: &Order) -> AppResult<()> {
        self.insert(ORDERS, &order.id, order).await
    }

    async fn list_orders(&self) -> AppResult<Vec<Order>> {
        self.find_where(ORDERS, "", "ORDER BY created_at ASC", Vec::new()).await
    }
}

#[async_trait]
impl ActivityStore for SurrealStore {
    async fn log_activity(&self, entry: &ActivityLog) -> AppResult<()> {
        self.insert(ACTIVITY, &entry.id, entry).await
    }
}

#[async_trait]
impl ChatStore for SurrealStore {
    async fn create_chat_session(&self, session: &ChatSession) -> AppResult<()> {
        self.insert(CHAT_SESSIONS, &session.id, session).await
    }

    async fn get_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>> {
        self.get_by_id(CHAT_SESSIONS, id).await
    }

    async fn find_active_chat_session(&self, client_id: &str) -> AppResult<Option<ChatSession>> {
        let sessions: Vec<ChatSession> = self
            .find_where(
                CHAT_SESSIONS,
                "client_id = $client_id AND status = 'active'",
                "ORDER BY created_at DESC LIMIT 1",
                vec![bind("client_id", client_id)],
            )
            .await?;
        Ok(sessions.into_iter().next())
    }

    async fn close_chat_session(&self, id: &str) -> AppResult<Option<ChatSession>> {
        let Some(session) = self.get_chat_session(id).await? else {
            return Ok(None);
        };
        if !session.is_active() {
            return Ok(Some(session));
        }
        self.set_fields(
            CHAT_SESSIONS,
            id,
            "status = 'closed', closed_at = $now",
            vec![("now".to_string(), now())],
        )
        .await?;
        self.get_chat_session(id).await
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> AppResult<()> {
        self.insert(CHAT_MESSAGES, &message.id, message).await
    }

    async fn chat_history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        self.find_where(
            CHAT_MESSAGES,
            "chat_session_id = $session_id",
            "ORDER BY timestamp ASC",
            vec![bind("session_id", session_id)],
        )
        .await
    }
}
