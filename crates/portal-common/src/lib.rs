pub mod access;
pub mod error;
pub mod mcp_api;
pub mod memory;
pub mod model;
pub mod redis;
pub mod remote;
