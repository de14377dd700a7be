//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop / handshake tasks produce:
//!     → tracing events (one `handshake` span per connection)
//!     → metrics.rs (counters, gauge, histogram)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
