//! API module - REST and job handlers

pub mod rest;
pub mod job;
pub mod dto;

pub use rest::create_rest_router;
pub use job::JobHandler;
