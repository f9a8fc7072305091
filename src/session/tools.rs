//! Tool-call dispatch.
//! Inbound calls arrive as loosely typed name/args pairs; each is validated
//! into a closed invocation variant at this boundary, executed synchronously,
//! and answered with a result carrying the originating call id. Every call in
//! a batch is answered, including unknown and malformed ones.

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use super::{Section, UiAction};
use crate::booking::BookingData;
use crate::remote::protocol::{FunctionDeclaration, ToolCall, ToolDecl, ToolResult};

/// A validated call to one of the registered tools.
#[derive(Debug, Clone, PartialEq)]
enum ToolInvocation {
    ShareContactSummary { summary: String },
    OpenBookingForm(BookingData),
    OpenScanner,
    NavigateToSection { section: Section },
}

enum ParseFailure {
    UnknownTool,
    InvalidArgs(String),
}

impl ToolInvocation {
    fn parse(call: &ToolCall) -> Result<Self, ParseFailure> {
        match call.name.as_str() {
            "share_contact_summary" => {
                let summary = call
                    .args
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ParseFailure::InvalidArgs("summary must be a string".to_string())
                    })?;
                Ok(Self::ShareContactSummary {
                    summary: summary.to_string(),
                })
            }
            "open_booking_form" => {
                let patch: BookingData = serde_json::from_value(call.args.clone())
                    .map_err(|e| ParseFailure::InvalidArgs(e.to_string()))?;
                Ok(Self::OpenBookingForm(patch))
            }
            "open_scan_analyzer" => Ok(Self::OpenScanner),
            "navigate_to_section" => {
                let section: Section =
                    serde_json::from_value(call.args.get("section").cloned().unwrap_or_default())
                        .map_err(|e| ParseFailure::InvalidArgs(e.to_string()))?;
                Ok(Self::NavigateToSection { section })
            }
            _ => Err(ParseFailure::UnknownTool),
        }
    }
}

/// Executes tool calls against local UI state.
///
/// The booking record accumulates across calls: the agent re-invokes
/// `open_booking_form` as it gathers fields, and each call merge-applies
/// onto the best-known record rather than starting over.
pub struct ToolDispatcher {
    contact_number: String,
    booking: Mutex<BookingData>,
    contact_url: Mutex<String>,
    actions: mpsc::UnboundedSender<UiAction>,
}

impl ToolDispatcher {
    pub fn new(contact_number: impl Into<String>, actions: mpsc::UnboundedSender<UiAction>) -> Self {
        let contact_number = contact_number.into();
        let contact_url = format!("https://wa.me/{}", contact_number);
        Self {
            contact_number,
            booking: Mutex::new(BookingData::default()),
            contact_url: Mutex::new(contact_url),
            actions,
        }
    }

    /// Answer every call in one inbound batch, matching results by id.
    pub fn dispatch_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        calls.iter().map(|call| self.dispatch(call)).collect()
    }

    fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let response = match ToolInvocation::parse(call) {
            Ok(invocation) => match self.execute(invocation) {
                Ok(outcome) => json!({ "result": outcome }),
                Err(reason) => {
                    tracing::warn!("Tool {} failed: {}", call.name, reason);
                    json!({ "error": reason })
                }
            },
            Err(ParseFailure::UnknownTool) => {
                tracing::warn!("Unsupported tool requested: {}", call.name);
                json!({ "result": "unsupported tool" })
            }
            Err(ParseFailure::InvalidArgs(reason)) => {
                tracing::warn!("Tool {} rejected arguments: {}", call.name, reason);
                json!({ "error": format!("invalid arguments: {}", reason) })
            }
        };

        ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    fn execute(&self, invocation: ToolInvocation) -> Result<String, String> {
        match invocation {
            ToolInvocation::ShareContactSummary { summary } => {
                let url = format!(
                    "https://wa.me/{}?text={}",
                    self.contact_number,
                    urlencoding::encode(&summary)
                );
                *self.contact_url.lock() = url.clone();
                self.emit(UiAction::ContactLinkUpdated(url))?;
                Ok("Contact link updated with the conversation summary.".to_string())
            }
            ToolInvocation::OpenBookingForm(patch) => {
                let snapshot = {
                    let mut booking = self.booking.lock();
                    booking.merge(patch);
                    booking.clone()
                };
                self.emit(UiAction::OpenBookingForm(snapshot))?;
                Ok("Booking form opened and updated on the user's screen.".to_string())
            }
            ToolInvocation::OpenScanner => {
                self.emit(UiAction::OpenScanner)?;
                Ok("Visual scanner opened.".to_string())
            }
            ToolInvocation::NavigateToSection { section } => {
                self.emit(UiAction::NavigateTo(section))?;
                Ok("Navigated.".to_string())
            }
        }
    }

    fn emit(&self, action: UiAction) -> Result<(), String> {
        self.actions
            .send(action)
            .map_err(|_| "UI shell is not listening".to_string())
    }

    /// Current human-contact link text shown by the UI shell.
    pub fn contact_url(&self) -> String {
        self.contact_url.lock().clone()
    }

    /// Best-known booking record accumulated so far.
    pub fn booking_snapshot(&self) -> BookingData {
        self.booking.lock().clone()
    }

    /// Reset per-session state when a fresh session opens.
    pub fn reset(&self) {
        *self.booking.lock() = BookingData::default();
        *self.contact_url.lock() = format!("https://wa.me/{}", self.contact_number);
    }

    /// Tool declarations advertised to the remote agent at setup.
    pub fn declarations() -> Vec<ToolDecl> {
        let function = |name: &str, description: &str, parameters: serde_json::Value| ToolDecl {
            function_declarations: vec![FunctionDeclaration {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            }],
        };

        vec![
            function(
                "share_contact_summary",
                "Updates the human-contact button on the user's screen with a \
                 summary of the current request, so a human agent has context.",
                json!({
                    "type": "object",
                    "properties": {
                        "summary": {
                            "type": "string",
                            "description": "Concise summary of the user's issue, device details, or service request."
                        }
                    },
                    "required": ["summary"]
                }),
            ),
            function(
                "open_booking_form",
                "Opens or updates the booking form overlay on the user's screen \
                 in real time. Call this repeatedly as data is gathered.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Customer name" },
                        "phone": { "type": "string", "description": "Customer phone number" },
                        "email": { "type": "string", "description": "Customer email address" },
                        "address": { "type": "string", "description": "Physical address" },
                        "deviceType": { "type": "string", "description": "Device type (iPhone, MacBook, PC, Server)" },
                        "serviceType": {
                            "type": "string",
                            "description": "The service type required, inferred from the issue.",
                            "enum": ["Repair", "Diagnostic", "Software", "Network"]
                        },
                        "issue": { "type": "string", "description": "Description of the issue or service required" }
                    }
                }),
            ),
            function(
                "open_scan_analyzer",
                "Opens the camera-based visual scanner so the user can show \
                 their device for identification.",
                json!({ "type": "object", "properties": {} }),
            ),
            function(
                "navigate_to_section",
                "Scrolls the site to the named section.",
                json!({
                    "type": "object",
                    "properties": {
                        "section": {
                            "type": "string",
                            "enum": ["home", "services", "remote", "book-now"]
                        }
                    },
                    "required": ["section"]
                }),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn dispatcher() -> (ToolDispatcher, mpsc::UnboundedReceiver<UiAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ToolDispatcher::new("27817463629", tx), rx)
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_batch_answers_every_call_by_id() {
        let (dispatcher, mut rx) = dispatcher();
        let calls = vec![
            call("a", "open_booking_form", json!({"name": "Thabo"})),
            call("b", "share_contact_summary", json!({"summary": "MacBook no boot"})),
            call("c", "defragment_moon", json!({})),
        ];

        let results = dispatcher.dispatch_batch(&calls);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
        assert_eq!(results[2].id, "c");
        assert_eq!(results[2].response["result"], "unsupported tool");

        assert!(matches!(rx.try_recv(), Ok(UiAction::OpenBookingForm(_))));
        assert!(matches!(rx.try_recv(), Ok(UiAction::ContactLinkUpdated(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_booking_calls_merge_instead_of_replacing() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch_batch(&[call("1", "open_booking_form", json!({"name": "Thabo"}))]);
        dispatcher.dispatch_batch(&[call(
            "2",
            "open_booking_form",
            json!({"phone": "0820000000"}),
        )]);

        let snapshot = dispatcher.booking_snapshot();
        assert_eq!(snapshot.name.as_deref(), Some("Thabo"));
        assert_eq!(snapshot.phone.as_deref(), Some("0820000000"));

        // The second UI action carries the merged record
        rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            UiAction::OpenBookingForm(record) => {
                assert_eq!(record.name.as_deref(), Some("Thabo"));
                assert_eq!(record.phone.as_deref(), Some("0820000000"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_invalid_arguments_still_produce_a_result() {
        let (dispatcher, _rx) = dispatcher();
        let results = dispatcher.dispatch_batch(&[call(
            "x",
            "navigate_to_section",
            json!({"section": "basement"}),
        )]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "x");
        assert!(results[0].response["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid arguments"));
    }

    #[test]
    fn test_contact_summary_is_url_encoded() {
        let (dispatcher, _rx) = dispatcher();
        dispatcher.dispatch_batch(&[call(
            "1",
            "share_contact_summary",
            json!({"summary": "screen cracked & won't boot"}),
        )]);
        let url = dispatcher.contact_url();
        assert!(url.starts_with("https://wa.me/27817463629?text="));
        assert!(!url.contains(' '));
        assert!(!url.contains('&'));
        assert!(url.contains("screen%20cracked"));
    }

    #[test]
    fn test_side_effect_failure_reports_error_result() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx); // no UI shell listening
        let dispatcher = ToolDispatcher::new("27817463629", tx);

        let results = dispatcher.dispatch_batch(&[call("1", "open_scan_analyzer", json!({}))]);
        assert_eq!(results.len(), 1);
        assert!(results[0].response.get("error").is_some());
    }

    #[test]
    fn test_navigation_parses_section_names() {
        let (dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch_batch(&[call(
            "1",
            "navigate_to_section",
            json!({"section": "book-now"}),
        )]);
        assert!(matches!(
            rx.try_recv(),
            Ok(UiAction::NavigateTo(Section::BookNow))
        ));
    }

    #[test]
    fn test_reset_clears_session_state() {
        let (dispatcher, _rx) = dispatcher();
        dispatcher.dispatch_batch(&[
            call("1", "open_booking_form", json!({"name": "Thabo"})),
            call("2", "share_contact_summary", json!({"summary": "hello"})),
        ]);
        dispatcher.reset();
        assert_eq!(dispatcher.booking_snapshot(), BookingData::default());
        assert_eq!(dispatcher.contact_url(), "https://wa.me/27817463629");
    }
}
