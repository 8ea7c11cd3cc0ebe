pub mod api;
pub mod config;
pub mod fallback;
pub mod gateway;
pub mod ingest;
pub mod normalize;
pub mod prometheus;
pub mod record;
pub mod router;
pub mod server;
pub mod store;
pub mod time;
