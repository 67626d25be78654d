//! Sentinel-2 thumbnail backend
//!
//! Accepts a polygon over HTTP, looks up the least cloudy Sentinel-2 scene
//! for it in Google Earth Engine and hands back a rendered thumbnail URL,
//! either directly or through a single tracked background job.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
