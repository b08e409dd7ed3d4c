//! MCP (Model Context Protocol) over HTTP + SSE.
//!
//! This module implements the MCP HTTP + SSE transport, letting AI
//! assistants read YAPI interface documentation through a long-lived
//! event stream and an out-of-band message endpoint.
//!
//! ## Endpoints
//!
//! - `GET /sse` - Open a session; the first event names the message endpoint
//! - `POST /messages?sessionId=<id>` - Send JSON-RPC requests to a session
//!
//! ## Session Management
//!
//! Sessions are identified by the `sessionId` query parameter, assigned when
//! the stream opens and dropped when it closes.

pub mod handler;
pub mod session;

pub use handler::{JsonRpcRequest, JsonRpcResponse, McpError, McpHandler};
pub use session::{CloseReason, PushError, Session, SessionEvent, SessionRegistry, SessionState};
