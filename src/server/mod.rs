pub mod auth;
pub mod handlers;
pub mod routes;
mod runtime;
pub mod state;

// Public API (what main.rs imports)
pub use routes::create_router;
pub use runtime::{run, InitialShare};
pub use state::AppState;
