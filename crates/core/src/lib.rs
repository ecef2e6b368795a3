// Retask Core - Domain Logic, Ports & Worker Loop
// NO infrastructure dependencies: the queue backend is reached only through port::QueueClient

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, ErrorKind, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
