pub mod cli;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod export;
pub mod persist;
pub mod probes;
pub mod scheduler;
pub mod stats;
pub mod types;
pub mod utils;

pub use scheduler::run;

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` overrides the default `info`.
/// Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
