//! # tripwire-core
//!
//! A windowed circuit breaker for async operations.
//!
//! The breaker counts failures in a window that opens at the first failure.
//! Once enough failures land in the window, at a high enough rate, the
//! circuit opens and calls fail fast until the reset timeout passes. The next
//! call is a trial: success closes the circuit, failure reopens it.
//!
//! ## Key Properties
//!
//! 1. **Lazy**: no timers or background tasks, time is checked on each call
//! 2. **Injected clock**: every decision reads time from a [`Clock`]
//! 3. **Portable state**: [`BreakerState`] exports and imports as a snapshot
//! 4. **Observable**: transitions and outcomes are published as [`BreakerEvent`]s
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tripwire_core::{Breaker, BreakerConfig, BreakerError};
//!
//! let config = BreakerConfig::new(0.5, Duration::from_secs(10), Duration::from_secs(30));
//! let breaker = Breaker::new(config, None)?.named("inventory");
//!
//! match breaker.execute(|| fetch_inventory(sku)).await {
//!     Ok(stock) => println!("in stock: {}", stock),
//!     Err(BreakerError::Open(err)) => println!("skipped: {}", err),
//!     Err(BreakerError::Operation(err)) => println!("failed: {}", err),
//! }
//!
//! // Persist for the next process
//! let snapshot = breaker.export_state().to_json()?;
//! ```

pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod state;

// Re-export main types at crate root
pub use breaker::Breaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerConfig, ConfigError};
pub use error::{BreakerError, CircuitOpenError};
pub use events::{BreakerEvent, EventKind, EventRegistry, SubscriptionId};
pub use state::{BreakerState, Phase};
