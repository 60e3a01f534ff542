//! Configuration parsing
//!
//! ## Configuration Format
//!
//! ```yaml
//! service:
//!   base_url: http://localhost:8000
//!   probe_timeout: 5s
//!   upload_timeout: 1m
//!
//! readiness:
//!   max_attempts: 5
//!   initial_delay: 2s
//!   backoff_multiplier: 1.5
//!   notice_debounce: 1s 200ms
//!
//! scan:
//!   user_id: local
//!   history_path: freshscan-history.jsonl
//!   record_timeout: 10s
//! ```

mod settings;

pub use settings::{
    Config, ConfigError, DEFAULT_API_URL, MAX_PROBE_TIMEOUT, ReadinessConfig, ScanConfig,
    ServiceConfig,
};
