pub mod tcp;

pub use tcp::{tcp_probe, DialPolicy};
