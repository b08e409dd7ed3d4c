//! Shared types for the YAPI MCP bridge.
//!
//! This crate contains the upstream YAPI response shapes and the defaults
//! shared between the server and its tests.

/// Default port for the bridge server.
pub const DEFAULT_PORT: u16 = 3001;

/// Default interval between SSE keep-alive comments, in milliseconds.
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 25_000;

/// Number of interfaces requested from the upstream list endpoint.
///
/// Only the first page is ever fetched.
pub const LIST_PAGE_SIZE: u32 = 100;

pub mod interface;

pub use interface::{InterfaceListPage, InterfaceSummary, YapiEnvelope};
