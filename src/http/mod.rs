//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (assign request ID)
//!     → qrcode.rs (proxy to upstream, relay image / redirect / 500)
//!     → CORS headers added to every response
//!     → Send to client
//! ```

pub mod qrcode;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
