//! Wall-clock probe
//!
//! Publishes the current time of day in microseconds since the Unix epoch
//! under `Probes.TimeOfDay`. Mostly useful as a liveness signal and for
//! checking schedule alignment across nodes.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::{ProbeNames, ProbeSample};

const NAME: &str = "Probes.TimeOfDay";
const MESSAGE_NAME: &str = "Measurement_timeofday";
const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDayMeasurement {
    pub microseconds_since_epoch: i64,
}

#[derive(Debug, Default)]
pub struct TimeOfDay;

impl TimeOfDay {
    pub fn new() -> Self {
        Self
    }
}

impl Probe for TimeOfDay {
    fn initialize(&mut self, _configuration: Option<&Path>) -> Result<ProbeNames> {
        Ok(vec![NAME.to_string()])
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn probe(&mut self) -> Result<Vec<ProbeSample>> {
        let measurement = TimeOfDayMeasurement {
            microseconds_since_epoch: Utc::now().timestamp_micros(),
        };

        let blob = serde_json::to_vec(&measurement)
            .map_err(|e| Error::Plugin(format!("unable to serialize measurement: {e}")))?;

        Ok(vec![ProbeSample {
            name: NAME.to_string(),
            blob,
            message_name: MESSAGE_NAME.to_string(),
            message_module: NAME.to_string(),
            version: VERSION,
        }])
    }
}
