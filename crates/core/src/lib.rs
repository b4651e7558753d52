//! Shared data model, error taxonomy and configuration for the clipforge
//! generation-job client.

pub mod config;
pub mod error;
pub mod job;
pub mod types;
