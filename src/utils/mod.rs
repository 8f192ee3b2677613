pub mod limiter;

pub use limiter::{ConcurrencyLimiter, Slot};
