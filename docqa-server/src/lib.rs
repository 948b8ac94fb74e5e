//! `docqa-server` serves PDF uploads, discovery listings and streamed answers over HTTP.
//! Answers are sent as server-sent events.

pub mod config;
pub mod error;
pub mod server;
pub mod state;

pub use config::{LogFormat, Settings};
pub use error::ApiError;
pub use server::{app_router, run_server};
pub use state::{AppState, Backends};
