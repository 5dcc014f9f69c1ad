//! Database initialization shared across tunesmith services

pub mod init;

pub use init::*;
