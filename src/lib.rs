//! Face Swap Service Library
//!
//! Fetches a "role" and a "child" image from an object store, swaps the
//! child's face onto the role image, optionally restores the result and
//! publishes it back.

pub mod config;
pub mod error;
pub mod engine;
pub mod service;
pub mod storage;
pub mod api;
pub mod utils;

pub use config::Config;
pub use error::SwapError;
