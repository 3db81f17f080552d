//! Winery sustainability self-assessment core: catalog lookups, answer and evidence
//! tracking, the assessment lifecycle, scoring, and reporting projections.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
