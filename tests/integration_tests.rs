//! Integration tests for the probe pipeline, relay tiers and recorder

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/probe_lifecycle.rs"]
mod probe_lifecycle;

#[path = "integration/relay_fidelity.rs"]
mod relay_fidelity;

#[path = "integration/discovery.rs"]
mod discovery;

#[path = "integration/recorder_capture.rs"]
mod recorder_capture;
