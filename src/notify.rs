use log::{debug, warn};
use std::process::Command;

use crate::model::AlertEvent;

/// Delivery channel for alert events. Implementations must never block the
/// monitor loop on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlertEvent);
}

/// OS desktop notifications: `osascript` on macOS, `notify-send` elsewhere.
/// Delivery failures are logged and otherwise ignored.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, event: &AlertEvent) {
        let result = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\" subtitle \"{}\" sound name \"Glass\"",
                event.message.replace('"', "'").replace('\n', " | "),
                event.title.replace('"', "'"),
                event.subtitle.replace('"', "'"),
            );
            Command::new("osascript").arg("-e").arg(script).spawn()
        } else {
            Command::new("notify-send")
                .arg(&event.title)
                .arg(format!("{}\n{}", event.subtitle, event.message))
                .spawn()
        };

        match result {
            Ok(_) => debug!("desktop notification sent for {}", event.pair),
            Err(e) => warn!("desktop notification for {} failed: {e}", event.pair),
        }
    }
}

/// Fallback used when desktop notifications are disabled: alerts still land
/// in the log pane.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &AlertEvent) {
        log::warn!(
            "ALERT {}: {} | {}",
            event.pair,
            event.title,
            event.message.replace('\n', " | ")
        );
    }
}
