pub mod backend;
pub mod cache;
pub mod codec;
pub mod commands;
pub mod composite;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod frame;
pub mod gateway;
pub mod server;
pub mod stats;
pub mod store;
pub mod transaction;
pub mod write_back;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
