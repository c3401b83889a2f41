//! Built-in measurement probes

mod resources;
mod timeofday;

pub use resources::{Resources, ResourcesMeasurement};
pub use timeofday::{TimeOfDay, TimeOfDayMeasurement};
