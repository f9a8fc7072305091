//! voicelink CLI: run one live voice session from the terminal.
//!
//! Usage:
//!   voicelink [--context "what the user is interested in"] [--muted]
//!
//! Requires VOICELINK_API_KEY (or GEMINI_API_KEY) unless the config file
//! already carries a key. Ctrl-C closes the session.

use voicelink::{SessionController, UiAction, VoiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let mut context: Option<String> = None;
    let mut start_muted = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--context" => context = args.next(),
            "--muted" => start_muted = true,
            "--help" | "-h" => {
                eprintln!("voicelink: live voice session");
                eprintln!("  --context \"...\"   Interest context passed to the agent's greeting");
                eprintln!("  --muted            Start with the microphone muted");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                return Ok(());
            }
        }
    }

    let config = VoiceConfig::load();
    let (controller, mut events) = SessionController::new(config);
    controller.set_muted(start_muted);

    controller.open(context).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Closing session");
                controller.close();
                break;
            }
            changed = events.status.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *events.status.borrow_and_update();
                tracing::info!("Session status: {:?}", status);
                if status == voicelink::SessionStatus::Disconnected
                    || status == voicelink::SessionStatus::Error
                {
                    break;
                }
            }
            action = events.actions.recv() => {
                match action {
                    Some(UiAction::OpenBookingForm(record)) => {
                        tracing::info!("Booking form update: {:?}", record);
                    }
                    Some(UiAction::ContactLinkUpdated(url)) => {
                        tracing::info!("Contact link: {}", url);
                    }
                    Some(UiAction::OpenScanner) => {
                        tracing::info!("Agent asked to open the visual scanner");
                    }
                    Some(UiAction::NavigateTo(section)) => {
                        tracing::info!("Agent navigated to {:?}", section);
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
