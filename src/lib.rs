pub mod auth;
pub mod config;
pub mod deliver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod server;
pub mod transform;
