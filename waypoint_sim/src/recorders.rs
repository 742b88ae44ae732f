//! Speech and notification sinks that record what they receive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use waypoint_env::{NotificationSink, SpeechSink, SystemNotification};

#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Everything spoken so far, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
    
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SpeechSink for RecordingSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
    
    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// System notification sink with a switchable permission.
#[derive(Debug, Default)]
pub struct RecordingSink {
    granted: AtomicBool,
    delivered: Mutex<Vec<SystemNotification>>,
}

impl RecordingSink {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            delivered: Mutex::new(Vec::new()),
        }
    }
    
    pub fn set_permission(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
    
    pub fn delivered(&self) -> Vec<SystemNotification> {
        self.delivered.lock().unwrap().clone()
    }
    
    /// Number of delivered notifications with this title.
    pub fn count_titled(&self, title: &str) -> usize {
        self.delivered.lock().unwrap().iter().filter(|n| n.title == title).count()
    }
}

impl NotificationSink for RecordingSink {
    fn permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
    
    fn deliver(&self, notification: SystemNotification) {
        self.delivered.lock().unwrap().push(notification);
    }
}
