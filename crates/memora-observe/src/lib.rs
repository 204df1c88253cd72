//! Observability setup for Memora: structured logging and optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
