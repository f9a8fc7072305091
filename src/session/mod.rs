mod controller;
mod tools;

pub use controller::{SessionController, SessionEvents};
pub use tools::ToolDispatcher;

use serde::{Deserialize, Serialize};

use crate::booking::BookingData;

/// Connection lifecycle of the live session, as shown to the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Site sections the remote agent can steer the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Home,
    Services,
    Remote,
    BookNow,
}

/// Local side effects requested by the remote agent mid-conversation,
/// consumed by the UI shell.
#[derive(Debug, Clone)]
pub enum UiAction {
    /// Show the booking form with the best-known record so far
    OpenBookingForm(BookingData),
    /// Open the camera-based visual scanner
    OpenScanner,
    /// Scroll/switch to a site section
    NavigateTo(Section),
    /// The human-contact link text changed
    ContactLinkUpdated(String),
}
