pub mod bets;
pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod signal;
pub mod storage;
pub mod systems;
