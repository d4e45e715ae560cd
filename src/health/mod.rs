//! Component health: probes, aggregation, and the built-in probes.

mod aggregator;
pub mod probes;

pub use aggregator::{
    overall_status, Criticality, HealthAggregator, HealthProbe, HealthReport, OverallHealth,
    ProbeResult, ProbeStatus,
};
