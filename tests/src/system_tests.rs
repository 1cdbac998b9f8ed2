use app_config::{AdminSeedConfig, AppConfig};
use app_database::SqliteStore;
use app_utils::mailer_from_config;
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{Method, StatusCode, header},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use micro_catalog::{AppState, create_routes};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@movieverse.test";
const ADMIN_PASSWORD: &str = "AdminPass1";

struct TestApp {
    app: Router,
    state: AppState,
    _static_dir: TempDir,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.security.jwt.secret = "system_test_secret_key_that_is_long_enough".to_string();
    // Generous enough that only the dedicated test hits the limit
    config.security.rate_limiting.api.burst = 100;
    config
}

// Helper function to create a test app instance
async fn setup_test_app(mut config: AppConfig) -> TestApp {
    let static_dir = tempfile::tempdir().unwrap();
    for page in ["index.html", "admin.html", "login.html", "signup.html"] {
        std::fs::write(static_dir.path().join(page), format!("<h1>{page}</h1>")).unwrap();
    }
    config.server.static_dir = static_dir.path().to_string_lossy().to_string();

    let store = Arc::new(SqliteStore::memory().unwrap());
    let mailer = mailer_from_config(&config.mail).unwrap();
    let state = AppState::new(config, store, mailer);

    state
        .auth
        .ensure_admin(&AdminSeedConfig {
            name: "Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        })
        .await
        .unwrap();

    TestApp {
        app: create_routes(state.clone()),
        state,
        _static_dir: static_dir,
    }
}

async fn raw_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> Response {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let response = raw_request(app, method, uri, body, token).await;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, body_json)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = request(
        app,
        Method::POST,
        "/login",
        Some(json!({ "email": email, "password": password })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn admin_token(app: &Router) -> String {
    login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

/// Signs a regular user up and returns `(user id, token)`.
async fn user_token(app: &Router, name: &str, email: &str) -> (String, String) {
    let (status, body) = request(
        app,
        Method::POST,
        "/signup",
        Some(json!({ "name": name, "email": email, "password": "Password1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {body}");
    let id = body["user"]["id"].as_str().unwrap().to_string();
    (id, login(app, email, "Password1").await)
}

async fn create_movie(app: &Router, token: &str, movie: Value) -> Value {
    let (status, body) = request(app, Method::POST, "/movies", Some(movie), Some(token)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body
}

fn movie(title: &str, year: i32, genres: &[&str], country: &str, price: f64) -> Value {
    json!({
        "title": title,
        "description": format!("{title} description"),
        "release_year": year,
        "genres": genres,
        "country": country,
        "price": price,
        "image": format!("/static/{}.jpg", title.to_lowercase()),
    })
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let test = setup_test_app(test_config()).await;

    let response = raw_request(&test.app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_signup_verify_and_login_flow() {
    let test = setup_test_app(test_config()).await;

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/signup",
        Some(json!({ "name": "Ada", "email": "Ada@Example.com", "password": "Password1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body["message"],
        "User created. Please check your email for verification."
    );
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["email_verified"], false);
    assert!(body["user"].get("password").is_none());

    // Same address again, different case
    let (status, _) = request(
        &test.app,
        Method::POST,
        "/signup",
        Some(json!({ "name": "Ada", "email": "ADA@example.com", "password": "Password1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let user = test
        .state
        .store
        .get_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    let token = user.verification_token.unwrap();

    let (status, body) = request(
        &test.app,
        Method::GET,
        &format!("/verify-email?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email verified successfully. You can now log in.");

    let (status, _) = request(
        &test.app,
        Method::GET,
        "/verify-email?token=not-a-token",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/login",
        Some(json!({ "email": "ada@example.com", "password": "Password1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["admin"], false);
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn test_signup_rejects_weak_input() {
    let test = setup_test_app(test_config()).await;

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/signup",
        Some(json!({ "name": "Ada", "email": "not-an-email", "password": "Password1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, _) = request(
        &test.app,
        Method::POST,
        "/signup",
        Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "short" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_locks_out_after_repeated_failures() {
    let test = setup_test_app(test_config()).await;

    for _ in 0..5 {
        let (status, _) = request(
            &test.app,
            Method::POST,
            "/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": "WrongPass1" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Locked even with the right password
    let (status, body) = request(
        &test.app,
        Method::POST,
        "/login",
        Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Too many failed login attempts")
    );
}

#[tokio::test]
async fn test_malformed_json_is_a_client_error() {
    let test = setup_test_app(test_config()).await;

    let request = Request::builder()
        .uri("/login")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON format")
    );
}

#[tokio::test]
async fn test_movie_management_requires_admin() {
    let test = setup_test_app(test_config()).await;
    let (_, user) = user_token(&test.app, "Bob", "bob@example.com").await;
    let new_movie = movie("Alien", 1979, &["Horror", "Sci-Fi"], "USA", 9.99);

    let (status, _) = request(&test.app, Method::POST, "/movies", Some(new_movie.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        request(&test.app, Method::POST, "/movies", Some(new_movie.clone()), Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin_token(&test.app).await;
    let created = create_movie(&test.app, &admin, new_movie).await;
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["title"], "Alien");
    assert_eq!(created["in_stock"], true);

    let (status, body) = request(
        &test.app,
        Method::PUT,
        &format!("/movies/{id}"),
        Some(json!({ "price": 4.5 })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 4.5);
    assert_eq!(body["title"], "Alien");

    let (status, _) = request(
        &test.app,
        Method::PUT,
        &format!("/movies/{id}"),
        Some(json!({})),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(&test.app, Method::GET, &format!("/movies/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 4.5);

    let (status, body) =
        request(&test.app, Method::DELETE, &format!("/movies/{id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Movie deleted successfully");

    let (status, _) = request(&test.app, Method::GET, &format!("/movies/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) =
        request(&test.app, Method::DELETE, &format!("/movies/{id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_movie_validates_fields() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;

    let (status, _) = request(
        &test.app,
        Method::POST,
        "/movies",
        Some(movie("Too Early", 1800, &["Drama"], "France", 1.0)),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &test.app,
        Method::POST,
        "/movies",
        Some(movie("Negative", 2000, &["Drama"], "France", -1.0)),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_movie_listing_filters_sorts_and_paginates() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;

    create_movie(&test.app, &admin, movie("Amelie", 2001, &["Comedy", "Romance"], "France", 7.0)).await;
    create_movie(&test.app, &admin, movie("Alien", 1979, &["Horror", "Sci-Fi"], "USA", 9.0)).await;
    create_movie(&test.app, &admin, movie("Arrival", 2016, &["Drama", "Sci-Fi"], "USA", 12.0)).await;
    create_movie(&test.app, &admin, movie("Paprika", 2006, &["Animation", "Sci-Fi"], "Japan", 5.0)).await;

    let (status, body) = request(&test.app, Method::GET, "/movies", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 4);
    assert_eq!(body["status"], "none");
    assert_eq!(body["page"], 1);

    let (_, body) = request(
        &test.app,
        Method::GET,
        "/movies?genres=Sci-Fi&country=USA&sort=release_year&order=desc",
        None,
        None,
    )
    .await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["status"], "filtering and sorting");
    assert_eq!(body["movies"][0]["title"], "Arrival");
    assert_eq!(body["movies"][1]["title"], "Alien");
    assert_eq!(body["filters"]["genres"], json!(["Sci-Fi"]));

    let (_, body) = request(
        &test.app,
        Method::GET,
        "/movies?yearMin=2000&maxPrice=8",
        None,
        None,
    )
    .await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["status"], "filtering");

    let (_, body) = request(
        &test.app,
        Method::GET,
        "/movies?sort=price&limit=3&page=2",
        None,
        None,
    )
    .await;
    assert_eq!(body["status"], "sorting");
    assert_eq!(body["total"], 4);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["movies"].as_array().unwrap().len(), 1);
    assert_eq!(body["movies"][0]["title"], "Arrival");

    let (status, _) = request(&test.app, Method::GET, "/movies?sort=budget", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(&test.app, Method::GET, "/search?q=ALI", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["movies"][0]["title"], "Alien");
}

#[tokio::test]
async fn test_reviews_belong_to_their_author() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (alice_id, alice) = user_token(&test.app, "Alice", "alice@example.com").await;
    let (_, bob) = user_token(&test.app, "Bob", "bob@example.com").await;

    let heat = create_movie(&test.app, &admin, movie("Heat", 1995, &["Crime"], "USA", 8.0)).await;
    let movie_id = heat["id"].as_str().unwrap();

    let (status, _) = request(
        &test.app,
        Method::POST,
        "/reviews",
        Some(json!({ "movie_id": "missing", "content": "Great" })),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, review) = request(
        &test.app,
        Method::POST,
        "/reviews",
        Some(json!({ "movie_id": movie_id, "content": "A classic." })),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["user_id"], alice_id.as_str());
    let review_id = review["id"].as_str().unwrap();

    let (status, body) = request(
        &test.app,
        Method::GET,
        &format!("/reviews?movie_id={movie_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = request(
        &test.app,
        Method::PUT,
        &format!("/reviews/{review_id}"),
        Some(json!({ "content": "Hijacked" })),
        Some(&bob),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You can only modify your own reviews");

    let (status, body) = request(
        &test.app,
        Method::PUT,
        &format!("/reviews/{review_id}"),
        Some(json!({ "content": "Still a classic." })),
        Some(&alice),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Still a classic.");

    // Admins may moderate
    let (status, body) = request(
        &test.app,
        Method::DELETE,
        &format!("/reviews/{review_id}"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Review deleted successfully");

    let (status, _) = request(&test.app, Method::GET, &format!("/reviews/{review_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_feeds_the_dashboard() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (_, user) = user_token(&test.app, "Carol", "carol@example.com").await;

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/checkout",
        Some(json!({ "movies": [] })),
        Some(&user),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cart is empty");

    let cart = json!({ "movies": [
        { "id": "m1", "title": "Heat", "price": 10.0, "quantity": 2 },
        { "id": "m2", "title": "Alien", "price": 5.0, "quantity": 1 },
    ]});
    let (status, body) = request(&test.app, Method::POST, "/checkout", Some(cart), Some(&user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Checkout successful!");
    assert_eq!(body["total"], 25.0);

    let cart = json!({ "movies": [
        { "id": "m2", "title": "Alien", "price": 5.0, "quantity": 3 },
    ]});
    let (status, _) = request(&test.app, Method::POST, "/checkout", Some(cart), Some(&user)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(&test.app, Method::GET, "/admin/dashboard", None, Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(&test.app, Method::GET, "/admin/dashboard", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSales"], 40.0);
    assert_eq!(body["orderCount"], 2);
    assert_eq!(body["mostPurchasedMovies"][0]["id"], "m2");
    assert_eq!(body["mostPurchasedMovies"][0]["totalQuantity"], 4);
    assert_eq!(body["mostPurchasedMovies"][1]["id"], "m1");
}

#[tokio::test]
async fn test_user_administration() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (dave_id, dave) = user_token(&test.app, "Dave", "dave@example.com").await;

    let (status, _) = request(&test.app, Method::GET, "/users", None, Some(&dave)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(&test.app, Method::GET, "/users", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|user| user.get("password").is_none()));

    let (status, body) =
        request(&test.app, Method::GET, &format!("/users/{dave_id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "dave@example.com");

    let (status, body) =
        request(&test.app, Method::DELETE, &format!("/users/{dave_id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");

    let (status, _) =
        request(&test.app, Method::GET, &format!("/users/{dave_id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_session_lifecycle() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (erin_id, erin) = user_token(&test.app, "Erin", "erin@example.com").await;
    let (_, frank) = user_token(&test.app, "Frank", "frank@example.com").await;

    let (status, session) = request(&test.app, Method::POST, "/start-chat", None, Some(&erin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["client_id"], erin_id.as_str());
    let chat_id = session["id"].as_str().unwrap().to_string();

    // Starting again reuses the open session
    let (_, again) = request(&test.app, Method::POST, "/start-chat", None, Some(&erin)).await;
    assert_eq!(again["id"], chat_id.as_str());

    let (status, body) = request(
        &test.app,
        Method::GET,
        &format!("/chat-history?chat_id={chat_id}"),
        None,
        Some(&erin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = request(
        &test.app,
        Method::GET,
        &format!("/chat-history?chat_id={chat_id}"),
        None,
        Some(&frank),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(&test.app, Method::GET, "/chat-history", None, Some(&erin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing chat_id");

    let (status, body) = request(&test.app, Method::GET, "/ws", None, Some(&erin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing chat session ID");

    let (status, body) = request(&test.app, Method::GET, "/admin/active-chats", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = request(
        &test.app,
        Method::POST,
        &format!("/close-chat?chat_id={chat_id}"),
        None,
        Some(&erin),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(
        &test.app,
        Method::POST,
        &format!("/close-chat?chat_id={chat_id}"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat closed successfully");

    let (status, _) = request(
        &test.app,
        Method::POST,
        "/close-chat?chat_id=unknown",
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A closed session is replaced by a fresh one
    let (_, fresh) = request(&test.app, Method::POST, "/start-chat", None, Some(&erin)).await;
    assert_ne!(fresh["id"], chat_id.as_str());
}

#[tokio::test]
async fn test_echo_endpoints() {
    let test = setup_test_app(test_config()).await;

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/post",
        Some(json!({ "message": "hello" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Data successfully received");

    let (status, body) = request(
        &test.app,
        Method::POST,
        "/post",
        Some(json!({ "message": "" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid JSON message");

    let (status, body) = request(&test.app, Method::GET, "/get", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "GET request received");
}

#[tokio::test]
async fn test_api_rate_limit_rejects_bursts() {
    let mut config = test_config();
    config.security.rate_limiting.api.burst = 2;
    config.security.rate_limiting.api.rate_per_second = 0.01;
    let test = setup_test_app(config).await;

    for _ in 0..2 {
        let response = raw_request(&test.app, Method::GET, "/get", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    }

    let response = raw_request(&test.app, Method::GET, "/get", None, None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Other clients keep their own bucket
    let request = Request::builder()
        .uri("/get")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pages_and_logout() {
    let test = setup_test_app(test_config()).await;
    let (_, user) = user_token(&test.app, "Gus", "gus@example.com").await;

    let response = raw_request(&test.app, Method::GET, "/login.html", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = request(&test.app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = raw_request(&test.app, Method::GET, "/", None, Some(&user)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = request(&test.app, Method::GET, "/admin.html", None, Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = raw_request(&test.app, Method::POST, "/logout", None, Some(&user)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login.html");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("userToken="));
}

type ChatClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the app on an ephemeral port and returns its address.
async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

async fn connect_chat(addr: SocketAddr, chat_id: &str, token: &str) -> ChatClient {
    let url = format!("ws://{addr}/ws?chat_id={chat_id}&token={token}");
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn next_json(client: &mut ChatClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a chat frame")
            .expect("socket ended early")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Waits until the server has closed the socket.
async fn expect_disconnect(client: &mut ChatClient) {
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => panic!("unexpected frame after close: {text:?}"),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket stayed open after close-chat");
}

/// Polls the admin view until `chat_id` has `members` sockets joined.
async fn wait_for_members(app: &Router, admin: &str, chat_id: &str, members: u64) {
    for _ in 0..50 {
        let (_, body) = request(app, Method::GET, "/admin/active-chats", None, Some(admin)).await;
        let joined = body
            .as_array()
            .and_then(|chats| chats.iter().find(|chat| chat["chat_id"] == chat_id))
            .and_then(|chat| chat["clients"].as_u64());
        if joined == Some(members) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("chat {chat_id} never reached {members} members");
}

#[tokio::test]
async fn test_chat_over_websocket() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (_, erin) = user_token(&test.app, "Erin", "erin@example.com").await;

    let (status, session) = request(&test.app, Method::POST, "/start-chat", None, Some(&erin)).await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = session["id"].as_str().unwrap().to_string();

    let addr = serve(test.app.clone()).await;
    let mut customer = connect_chat(addr, &chat_id, &erin).await;
    let mut support = connect_chat(addr, &chat_id, &admin).await;
    wait_for_members(&test.app, &admin, &chat_id, 2).await;

    // The client cannot pick the room or the time.
    customer
        .send(Message::text(
            json!({ "content": "hello", "chat_id": "elsewhere" }).to_string(),
        ))
        .await
        .unwrap();

    for client in [&mut customer, &mut support] {
        let frame = next_json(client).await;
        assert_eq!(frame["chat_id"], chat_id.as_str());
        assert_eq!(frame["username"], "erin@example.com");
        assert_eq!(frame["content"], "hello");
        assert!(frame["timestamp"].is_string());
    }

    support
        .send(Message::text(
            json!({ "username": "Support", "content": "how can I help?" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_json(&mut customer).await["username"], "Support");
    assert_eq!(next_json(&mut support).await["content"], "how can I help?");

    let (status, history) = request(
        &test.app,
        Method::GET,
        &format!("/chat-history?chat_id={chat_id}"),
        None,
        Some(&erin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "hello");
    assert_eq!(history[0]["sender"], "erin@example.com");
    assert_eq!(history[1]["sender"], "Support");

    let (status, _) = request(
        &test.app,
        Method::POST,
        &format!("/close-chat?chat_id={chat_id}"),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    expect_disconnect(&mut customer).await;
    expect_disconnect(&mut support).await;
}

#[tokio::test]
async fn test_websocket_cannot_join_foreign_chat() {
    let test = setup_test_app(test_config()).await;
    let admin = admin_token(&test.app).await;
    let (erin_id, erin) = user_token(&test.app, "Erin", "erin@example.com").await;
    let (frank_id, frank) = user_token(&test.app, "Frank", "frank@example.com").await;

    let (_, session) = request(&test.app, Method::POST, "/start-chat", None, Some(&erin)).await;
    let chat_id = session["id"].as_str().unwrap().to_string();

    let addr = serve(test.app.clone()).await;
    let mut owner = connect_chat(addr, &chat_id, &erin).await;
    let _intruder = connect_chat(addr, &chat_id, &frank).await;
    wait_for_members(&test.app, &admin, &chat_id, 1).await;

    // Frank lands in a room of his own instead of Erin's.
    let mut expected = vec![erin_id, frank_id];
    expected.sort();
    let mut clients = Vec::new();
    for _ in 0..50 {
        let (_, chats) =
            request(&test.app, Method::GET, "/admin/active-chats", None, Some(&admin)).await;
        clients = chats
            .as_array()
            .unwrap()
            .iter()
            .map(|chat| chat["client"].as_str().unwrap().to_string())
            .collect();
        clients.sort();
        if clients == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(clients, expected);

    owner
        .send(Message::text(json!({ "content": "private" }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut owner).await["content"], "private");
}
