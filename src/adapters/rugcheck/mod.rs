//! RugCheck token report adapter

mod client;
mod types;

pub use client::{RugCheckClient, RUGCHECK_API};
pub use types::RawReport;
