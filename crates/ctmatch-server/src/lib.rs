pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use error::{OperationOutcome, ServiceError};
pub use server::{AppState, CtmatchServer, ServerBuilder, build_app};
