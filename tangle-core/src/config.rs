//! Runtime Configuration
//!
//! Runtime state is per thread, so configuration is too. A thread starts
//! with [`RuntimeConfig::default`] and can replace it with [`configure`].
//!
//! The config derives `Deserialize` so it can be loaded from JSON:
//!
//! ```rust
//! let config: tangle_core::RuntimeConfig =
//!     serde_json::from_str(r#"{ "max_flush_rounds": 8 }"#).unwrap();
//! tangle_core::configure(config);
//! assert_eq!(tangle_core::config().max_flush_rounds, 8);
//! ```

use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Default number of drain rounds a single flush may take.
pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;

/// Tunables for the reactive runtime of the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times [`flush_jobs`](crate::scheduler::flush_jobs) may drain
    /// the queue while jobs keep queuing more jobs.
    pub max_flush_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: DEFAULT_MAX_FLUSH_ROUNDS,
        }
    }
}

thread_local! {
    static CONFIG: Cell<RuntimeConfig> = Cell::new(RuntimeConfig::default());
}

/// Replace the configuration of the current thread's runtime.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(?config, "runtime reconfigured");
    CONFIG.with(|c| c.set(config));
}

/// The configuration of the current thread's runtime.
pub fn config() -> RuntimeConfig {
    CONFIG.with(|c| c.get())
}
