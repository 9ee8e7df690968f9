//! Engine persistence: flight pool, deals, profiles, scan log, run history

pub mod deals;
pub mod flights;
pub mod profiles;
pub mod runs;
pub mod scan_log;
