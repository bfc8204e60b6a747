pub mod metric;
pub mod model;
pub mod time;
pub mod units;

pub use metric::Metric;
pub use units::UnitPreference;
