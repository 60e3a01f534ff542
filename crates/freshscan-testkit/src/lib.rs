//! Freshscan Test Kit
//!
//! Test infrastructure for exercising the scanner against a real HTTP stack.
//!
//! This crate provides:
//! - A scriptable fake inference service (axum, bound to an ephemeral port)
//! - Seeded image payload generation for reproducible uploads
//!
//! # Example
//!
//! ```rust,no_run
//! use freshscan_testkit::fake::FakeService;
//!
//! # async fn example() -> std::io::Result<()> {
//! let service = FakeService::start().await?;
//! service.script_health([503, 503, 200]);
//! assert_eq!(service.predict_calls(), 0);
//! # Ok(())
//! # }
//! ```

pub mod fake;
pub mod random;

pub use fake::{FakeService, Upload, unused_url};
pub use random::PseudoGenerator;
