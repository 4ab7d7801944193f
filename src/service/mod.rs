//! Service layer module

pub mod swap_service;
pub mod types;
pub mod workspace;

pub use swap_service::SwapService;
pub use types::*;
pub use workspace::RequestWorkspace;
