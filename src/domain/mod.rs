pub mod beacon;

pub use beacon::{format_uptime, init_local_offset, local_timestamp, NormalizedRecord};
