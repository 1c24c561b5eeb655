//! # Event Bus System
//!
//! Broadcasts session lifecycle events to any number of independent listeners
//! using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The observer callbacks on the session state are the primary way a UI
//! learns about authentication changes. The event bus is a secondary,
//! asynchronous channel for everything else that wants to know: analytics
//! hooks, host logging, background tasks that must stop when the user signs
//! out.
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐   subscribe   ┌────────────┐
//! │ ApiClient    ├──────────────>│           ├──────────────>│ Subscriber │
//! └──────────────┘               │ EventBus  │               └────────────┘
//! ┌──────────────┐     emit      │ (broadcast│   subscribe   ┌────────────┐
//! │SessionManager├──────────────>│  channel) ├──────────────>│ Subscriber │
//! └──────────────┘               └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Auth(AuthEvent::SignedOut));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events; it can keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns an error that producers ignore.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication and token lifecycle events
    Auth(AuthEvent),
    /// Remote login-session management events
    Sessions(SessionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sessions(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::SessionExpired) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut) => EventSeverity::Info,
            CoreEvent::Sessions(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events related to authentication and the token lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Credentials were submitted to the login endpoint.
    SigningIn { username: String },
    /// The server accepted the credentials.
    SignedIn { user_id: i64, username: String },
    /// A local guest identity was created.
    GuestSignedIn,
    /// Local credentials were cleared by an explicit logout.
    SignedOut,
    /// A refresh call was started by the single-flight coordinator.
    TokenRefreshing,
    /// A refresh call settled with a new access token.
    TokenRefreshed,
    /// Refresh failed terminally and local credentials were torn down.
    SessionExpired,
    /// Authentication error occurred.
    AuthError {
        message: String,
        /// Whether retrying the same action might succeed.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::GuestSignedIn => "Guest session started",
            AuthEvent::SignedOut => "User signed out",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed => "Token refreshed successfully",
            AuthEvent::SessionExpired => "Session expired",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

/// Events raised when the user manages their login sessions on other devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// One session was revoked.
    Revoked { session_id: i64 },
    /// Every session except the current one was revoked.
    OthersRevoked { revoked: u32 },
    /// Every session, including the current one, was revoked.
    AllRevoked { revoked: u32 },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Revoked { .. } => "Session revoked",
            SessionEvent::OthersRevoked { .. } => "Other sessions revoked",
            SessionEvent::AllRevoked { .. } => "All sessions revoked",
        }
    }
}

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
