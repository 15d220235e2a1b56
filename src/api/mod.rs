// HTTP API: routes, handlers and wire models

pub mod extract;
pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
