//! Video processing service
//!
//! Downloads a source video from object storage into a job-scoped staging
//! area, rescales it with ffmpeg, uploads the rendition to the processed
//! bucket and cleans up local files whatever the outcome.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
