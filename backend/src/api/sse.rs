//! Server-Sent Events endpoint opening MCP sessions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::mcp::{CloseReason, Session, SessionEvent};
use crate::state::AppState;
use crate::MESSAGES_PATH;

/// Body of the 500 response sent when the handshake fails.
pub const HANDSHAKE_FAILED: &str = "Failed to connect MCP server to transport";

/// GET /sse - Open an MCP session.
///
/// The first event is `endpoint`, carrying the URL the client must post its
/// JSON-RPC messages to. Responses follow as `message` events, interleaved
/// with `: keepalive` comments.
///
/// Example usage from JavaScript:
/// ```javascript
/// const eventSource = new EventSource('http://localhost:3001/sse');
/// eventSource.addEventListener('endpoint', (event) => {
///     console.log('Post messages to:', event.data);
/// });
/// ```
pub async fn sse_handler(State(state): State<AppState>) -> Response {
    let (session, rx) = state.sessions().create_session(state.keep_alive());
    let endpoint = format!("{}?sessionId={}", MESSAGES_PATH, session.id());

    if let Err(e) = session.handshake(&endpoint) {
        error!(
            "[SSE Connection] Error connecting session {}: {}",
            session.id(),
            e
        );
        session.teardown(CloseReason::HandshakeFailed);
        return (StatusCode::INTERNAL_SERVER_ERROR, HANDSHAKE_FAILED).into_response();
    }

    info!(
        "[SSE Connection] Client connected: {} (total sessions: {})",
        session.id(),
        state.sessions().len()
    );

    Sse::new(SessionStream::new(session, rx)).into_response()
}

/// SSE body of one session.
///
/// Ends when the session is torn down; tears the session down when dropped,
/// which is how a client disconnect is observed.
pub struct SessionStream {
    events: BoxStream<'static, SessionEvent>,
    session: Arc<Session>,
}

impl SessionStream {
    pub fn new(session: Arc<Session>, rx: mpsc::Receiver<SessionEvent>) -> Self {
        let events = ReceiverStream::new(rx)
            .take_until(session.closed())
            .boxed();
        Self { events, session }
    }
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events
            .poll_next_unpin(cx)
            .map(|event| event.map(|e| Ok(to_sse_event(e))))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.session.teardown(CloseReason::ClientDisconnected);
    }
}

fn to_sse_event(event: SessionEvent) -> Event {
    match event {
        SessionEvent::Endpoint(url) => Event::default().event("endpoint").data(url),
        SessionEvent::Message(json) => Event::default().event("message").data(json),
        SessionEvent::KeepAlive => Event::default().comment("keepalive"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::SessionRegistry;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stream_drop_tears_down_session() {
        let registry = SessionRegistry::new();
        let (session, rx) = registry.create_session(Duration::from_secs(25));
        let stream = SessionStream::new(session.clone(), rx);

        assert!(registry.contains(session.id()));
        drop(stream);
        assert!(!registry.contains(session.id()));
        assert!(!session.keep_alive_active());
    }

    #[tokio::test]
    async fn test_stream_ends_on_teardown() {
        let registry = SessionRegistry::new();
        let (session, rx) = registry.create_session(Duration::from_secs(25));
        session.handshake("/messages?sessionId=abc").unwrap();
        let mut stream = SessionStream::new(session.clone(), rx);

        assert!(stream.next().await.is_some());
        registry.close_all();
        assert!(stream.next().await.is_none());
    }
}
