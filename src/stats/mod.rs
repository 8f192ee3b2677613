pub mod summary;
pub mod window;

pub use summary::{merge, Summary};
pub use window::{Entry, StatsWindow};
