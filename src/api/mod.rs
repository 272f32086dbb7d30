//! HTTP API module
//!
//! Thin boundary over the alias registry.
//!
//! # Endpoints
//!
//! - `GET /alias?alias=` - Resolve an alias (empty view without a name)
//! - `GET /aliases` - List every registration, newest first
//! - `GET /alias-register?alias=&publicKey=` - Echo pre-filled form data
//! - `POST /alias-register` - Register a signed claim (form encoded)
//! - `GET /health` - Liveness and alias channel head

pub mod error;
pub mod handlers;
pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use handlers::ApiState;
pub use routes::create_router;
