pub mod auth;
pub mod earth_engine;
pub mod fetcher;
pub mod job_tracker;
pub mod session;
pub mod spawner;
