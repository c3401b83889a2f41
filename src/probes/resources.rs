//! Host resource probe
//!
//! Publishes memory, swap and CPU utilization of the hosting machine under
//! `Probes.System.Resources`. Usage percentages come from the delta between
//! consecutive refreshes, so the first sample after start reflects the
//! interval since `start()` primed the counters.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::{ProbeNames, ProbeSample};

const NAME: &str = "Probes.System.Resources";
const MESSAGE_NAME: &str = "Measurement_resources";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesMeasurement {
    pub total_memory: u64,
    pub used_memory: u64,
    pub total_swap: u64,
    pub used_swap: u64,
    pub cpu_count: usize,
    pub average_cpu_usage: f32,
}

pub struct Resources {
    sys: System,
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

impl Resources {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
        }
    }
}

impl Probe for Resources {
    fn initialize(&mut self, _configuration: Option<&Path>) -> Result<ProbeNames> {
        Ok(vec![NAME.to_string()])
    }

    fn start(&mut self) -> Result<()> {
        // prime the cpu counters so the first probe has a usable delta
        self.sys.refresh_all();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn probe(&mut self) -> Result<Vec<ProbeSample>> {
        self.sys.refresh_all();

        let cpus = self.sys.cpus();
        let average_cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let measurement = ResourcesMeasurement {
            total_memory: self.sys.total_memory(),
            used_memory: self.sys.used_memory(),
            total_swap: self.sys.total_swap(),
            used_swap: self.sys.used_swap(),
            cpu_count: cpus.len(),
            average_cpu_usage,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_nonzero_memory() {
        let mut probe = Resources::new();
        assert_eq!(
            probe.initialize(None).unwrap(),
            vec!["Probes.System.Resources".to_string()]
        );
        probe.start().unwrap();

        let samples = probe.probe().unwrap();
        assert_eq!(samples.len(), 1);

        let measurement: ResourcesMeasurement = serde_json::from_slice(&samples[0].blob).unwrap();
        assert!(measurement.total_memory > 0);
        assert!(measurement.cpu_count > 0);
        assert!(measurement.used_memory <= measurement.total_memory);
    }
}
