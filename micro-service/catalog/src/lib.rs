pub mod chat;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;

pub use routes::create_routes;
pub use state::AppState;
