//! # Tunesmith Common Library
//!
//! Shared code for the tunesmith gateway services:
//! - Error taxonomy
//! - Configuration resolution (CLI → ENV → TOML → default)
//! - Database pool and schema initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
