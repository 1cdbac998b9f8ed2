use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};

use app_config::{CorsConfig, Server};
use app_error::middleware_handling::error_handling_middleware;
use app_middleware::{
    admin_only, api_rate_limit_middleware, logging_middleware, require_auth,
    security_headers_middleware, users_only,
};

use crate::handlers::{auth, chat, checkout, dashboard, movies, pages, reviews, system, users};
use crate::state::AppState;

fn cors_layer(cors_config: &CorsConfig) -> CorsLayer {
    CorsLayer::new()
        // "*" allows any origin, otherwise the exact list
        .allow_origin(if cors_config.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                cors_config
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
        })
        .allow_methods(
            cors_config
                .allowed_methods
                .iter()
                .filter_map(|method| method.parse().ok())
                .collect::<Vec<_>>(),
        )
        .allow_headers(
            cors_config
                .allowed_headers
                .iter()
                .filter_map(|header| header.parse().ok())
                .collect::<Vec<_>>(),
        )
}

pub fn create_routes(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let server = Server::from(config.as_ref());

    let public = Router::new()
        .route("/health", get(system::health_check))
        .route("/movies", get(movies::list_movies))
        .route("/movies/{id}", get(movies::get_movie))
        .route("/search", get(movies::search_movies))
        .route("/reviews", get(reviews::list_reviews))
        .route("/reviews/{id}", get(reviews::get_review))
        .route("/verify-email", get(auth::verify_email))
        .route("/login.html", get(pages::login_page))
        .route("/signup.html", get(pages::signup_page));

    let throttled = Router::new()
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .route("/post", post(system::echo_post))
        .route("/get", get(system::echo_get))
        .route_layer(from_fn_with_state(
            Arc::clone(&state.api_limiter),
            api_rate_limit_middleware,
        ));

    let checkout = Router::new()
        .route("/checkout", post(checkout::checkout))
        .route_layer(from_fn_with_state(
            Arc::clone(&state.api_limiter),
            api_rate_limit_middleware,
        ));

    let user_routes = Router::new()
        .route("/", get(pages::index_page))
        .route("/index.html", get(pages::index_page))
        .route("/reviews", post(reviews::create_review))
        .route(
            "/reviews/{id}",
            put(reviews::update_review).delete(reviews::delete_review),
        )
        .route("/start-chat", post(chat::start_chat))
        .route("/chat-history", get(chat::chat_history))
        .merge(checkout)
        .route_layer(from_fn(users_only));

    let admin_routes = Router::new()
        .route("/admin.html", get(pages::admin_page))
        .route("/movies", post(movies::create_movie))
        .route(
            "/movies/{id}",
            put(movies::update_movie).delete(movies::delete_movie),
        )
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user).delete(users::delete_user))
        .route("/admin/dashboard", get(dashboard::dashboard))
        .route("/admin/active-chats", get(chat::active_chats))
        .route("/close-chat", post(chat::close_chat))
        .route_layer(from_fn(admin_only));

    let authenticated = Router::new()
        .route("/logout", post(auth::logout))
        .route("/ws", get(chat::ws_handler))
        .merge(user_routes)
        .merge(admin_routes)
        .route_layer(from_fn_with_state(
            Arc::clone(&state.jwt_service),
            require_auth,
        ));

    let app = public
        .merge(throttled)
        .merge(authenticated)
        .nest_service("/static", ServeDir::new(&config.server.static_dir))
        .with_state(state);

    // Framework errors raised in here are rewritten to the JSON error shape.
    let app = app
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            server.request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(server.body_limit))
        .layer(from_fn(error_handling_middleware));

    let app = app
        .layer(from_fn(logging_middleware))
        .layer(from_fn(security_headers_middleware));

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CompressionLayer::new())
            .layer(cors_layer(&config.security.cors)),
    )
}
