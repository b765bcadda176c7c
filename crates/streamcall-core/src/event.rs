//! Stream events and call states

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// One event observed by a call subscriber
///
/// A call delivers zero or more `Data` events followed by exactly one
/// terminal event (`Status` with a non-OK code, or `End`). Nothing is
/// delivered after the terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<M> {
    /// A response message
    Data(M),
    /// The call failed or was cancelled
    Status(Status),
    /// The call completed successfully
    End,
}

impl<M> StreamEvent<M> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Data(_))
    }

    pub fn data(&self) -> Option<&M> {
        match self {
            StreamEvent::Data(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<M> {
        match self {
            StreamEvent::Data(message) => Some(message),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&Status> {
        match self {
            StreamEvent::Status(status) => Some(status),
            _ => None,
        }
    }

    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> StreamEvent<N> {
        match self {
            StreamEvent::Data(message) => StreamEvent::Data(f(message)),
            StreamEvent::Status(status) => StreamEvent::Status(status),
            StreamEvent::End => StreamEvent::End,
        }
    }
}

/// The terminal event of a call, without its message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Natural end of stream
    End,
    /// Failure or cancellation
    Status(Status),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::End)
    }

    /// Collapse into a status; `End` becomes `OK`
    pub fn into_status(self) -> Status {
        match self {
            Outcome::End => Status::ok(),
            Outcome::Status(status) => status,
        }
    }
}

impl<M> From<Outcome> for StreamEvent<M> {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::End => StreamEvent::End,
            Outcome::Status(status) => StreamEvent::Status(status),
        }
    }
}

/// Lifecycle state of a streaming call
///
/// `Opening -> Streaming -> {Completed | Failed | Cancelled}`; terminal
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Requested, not yet acknowledged by the transport
    Opening,
    /// Acknowledged; data may arrive
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed | CallState::Cancelled
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Opening => "opening",
            CallState::Streaming => "streaming",
            CallState::Completed => "completed",
            CallState::Failed => "failed",
            CallState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    #[test]
    fn test_terminal_events() {
        assert!(!StreamEvent::Data(1).is_terminal());
        assert!(StreamEvent::<i32>::End.is_terminal());
        assert!(StreamEvent::<i32>::Status(Status::cancelled()).is_terminal());
    }

    #[test]
    fn test_outcome_into_event() {
        let event: StreamEvent<()> = Outcome::Status(Status::unavailable("down")).into();
        assert_eq!(event.status().map(|s| s.code), Some(Code::Unavailable));
        assert_eq!(StreamEvent::<()>::from(Outcome::End), StreamEvent::End);
        assert!(Outcome::End.into_status().is_ok());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CallState::Opening.is_terminal());
        assert!(!CallState::Streaming.is_terminal());
        assert!(CallState::Completed.is_terminal());
        assert!(CallState::Failed.is_terminal());
        assert!(CallState::Cancelled.is_terminal());
    }
}
