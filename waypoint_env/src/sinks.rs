//! Output collaborators: speech and system notifications.

use crate::types::SystemNotification;

/// Text-to-speech output.
///
/// Announcements are fire-and-forget; queuing or interruption while the
/// device is already speaking is the sink's business.
pub trait SpeechSink: Send + Sync + 'static {
    fn speak(&self, text: &str);
    
    /// Stops any speech in progress.
    fn cancel(&self);
}

/// System-level (OS/browser) notification delivery.
pub trait NotificationSink: Send + Sync + 'static {
    /// Whether the user granted notification permission.
    ///
    /// Read on every delivery; the core never changes it.
    fn permission_granted(&self) -> bool;
    
    fn deliver(&self, notification: SystemNotification);
}
