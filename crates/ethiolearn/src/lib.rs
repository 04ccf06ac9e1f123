//! Course purchase and job application workflows for the EthioLearn marketplace.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;
