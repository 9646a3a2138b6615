pub mod buffer;
pub mod checksum;
pub mod client;
pub mod config;
pub mod connection;
pub mod engine;
pub mod frame;
pub mod receiver;
pub mod serial;
pub mod symbols;
pub mod transmitter;

pub use client::Client;
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use engine::Engine;
