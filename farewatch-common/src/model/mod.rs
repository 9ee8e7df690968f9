//! Domain model shared across the pipeline

pub mod deal;
pub mod flight;
pub mod profile;

pub use deal::{Deal, DealKey, TripCandidate};
pub use flight::Flight;
pub use profile::{DayWindows, HourWindow, SearchProfile, Strategy, Weekday};
