//! cohort-core: calibrated synthetic homeless-services dataset generator,
//! KPI aggregation and summary report.

pub mod access_site;
pub mod cohort;
pub mod config;
pub mod engagement;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod reconcile;
pub mod report;
pub mod rng;
pub mod tables;
pub mod types;
