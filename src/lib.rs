pub mod config;
pub mod error;
pub mod events;
pub mod log_tail;
pub mod notifier;
pub mod peer_geo;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod scanner;
