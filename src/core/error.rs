use std::fmt;

/// Failure modes surfaced by the chat session.
#[derive(Debug)]
pub enum ChatError {
    /// The endpoint reported a non-zero error code in a frame header.
    Protocol(String),
    /// The connection failed, closed early, or timed out.
    Transport(String),
    /// The tool provider rejected or failed a request.
    Tool(String),
    /// A turn was submitted while another turn is still in flight.
    Busy,
    /// The session has not completed its connection handshake.
    NotConnected,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Protocol(message) => write!(f, "protocol error: {message}"),
            ChatError::Transport(message) => write!(f, "transport error: {message}"),
            ChatError::Tool(message) => write!(f, "tool provider error: {message}"),
            ChatError::Busy => write!(f, "a turn is already in progress"),
            ChatError::NotConnected => write!(f, "session is not connected"),
        }
    }
}

impl std::error::Error for ChatError {}
