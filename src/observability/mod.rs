//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stderr, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Each governed request runs inside a span carrying a request ID
//! - Metrics are cheap (no-ops until a recorder is installed)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
