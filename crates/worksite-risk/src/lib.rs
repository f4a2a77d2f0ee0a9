//! Core engines for the worksite risk platform: site-condition evaluation,
//! risk ranking, tenant configuration and the batch reconcilers around them.

pub mod clustering;
pub mod config;
pub mod configurations;
pub mod domain;
pub mod error;
pub mod hazards;
pub mod ingest;
pub mod integrity;
pub mod library;
pub mod metrics;
pub mod orchestrator;
pub mod projects;
pub mod ranking;
pub mod site_conditions;
pub mod telemetry;
pub mod world_data;
