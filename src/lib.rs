//! loadpulse - operational tooling for a forum API observability stack
//!
//! The core is the traffic engine in [`traffic`]: a bounded identifier cache,
//! a retrying request executor and a fixed-rate load driver. Around it sit
//! the forum API client, traffic scenarios, a sequential latency analyzer,
//! probes for the Prometheus, Jaeger and Loki backends, a bottleneck detector
//! and an alert-forwarding bot.

pub mod analyzer;
pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod forum;
pub mod handlers;
pub mod metrics;
pub mod notify;
pub mod report;
pub mod scenarios;
pub mod telemetry;
pub mod traffic;
