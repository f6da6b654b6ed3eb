pub mod aggregate;
pub mod batching;
pub mod compose;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod intent;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod nlm;
pub mod params;
pub mod rest;
pub mod retry;
pub mod router;
pub mod store;
pub mod validate;
pub mod window;
