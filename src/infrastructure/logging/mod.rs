//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Pretty or JSON stdout output
//! - Optional JSON file output with rotation via tracing-appender

pub mod logger;

pub use logger::LoggerImpl;
