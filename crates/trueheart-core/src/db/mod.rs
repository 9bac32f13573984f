//! Database layer for TrueHeart

mod connection;
mod migrations;

pub use connection::Database;
