//! Notification fan-out.
//!
//! Every event becomes an in-app notification that disappears after a fixed
//! display time unless dismissed first. When the user granted permission the
//! same notification also goes to the system sink, except chat messages for
//! the conversation the user is currently looking at.

use rand::Rng;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use waypoint_env::{ClickAction, ConversationId, NotificationSink, SystemNotification};

use crate::events::{LocationErrorKind, TrackerEvent};

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// How long an in-app notification stays visible (default: 6 s)
    pub display_duration: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            display_duration: Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    GeofenceEnter,
    GeofenceLeave,
    LowBattery,
    NewMessage,
    NewMember,
    Error,
    Arrival,
    FindDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(pub Uuid);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notif_{}", self.0.simple())
    }
}

/// A notification before it has an id and an expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub click: Option<ClickAction>,
    
    /// Conversation a `NewMessage` belongs to
    pub conversation: Option<ConversationId>,
}

impl NotificationDraft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            click: None,
            conversation: None,
        }
    }
    
    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.click = Some(action);
        self
    }
}

impl From<&TrackerEvent> for NotificationDraft {
    fn from(event: &TrackerEvent) -> Self {
        use NotificationKind as K;
        
        match event {
            TrackerEvent::GeofenceEnter { entity, entity_name, zone_name, .. } => Self::new(
                K::GeofenceEnter,
                format!("{entity_name} Entered Zone"),
                format!("{entity_name} has entered {zone_name}."),
            )
            .on_click(ClickAction::FocusEntity(*entity)),
            TrackerEvent::GeofenceLeave { entity, entity_name, zone_name, .. } => Self::new(
                K::GeofenceLeave,
                format!("{entity_name} Left Zone"),
                format!("{entity_name} has left {zone_name}."),
            )
            .on_click(ClickAction::FocusEntity(*entity)),
            TrackerEvent::LowBattery { entity, entity_name, level } => Self::new(
                K::LowBattery,
                "Low Battery",
                format!("{entity_name}'s phone battery is at {level}%."),
            )
            .on_click(ClickAction::FocusEntity(*entity)),
            TrackerEvent::Arrival { target_name } => Self::new(
                K::Arrival,
                "You have arrived!",
                format!("You've reached {target_name}."),
            ),
            TrackerEvent::InvalidNavigationTarget => Self::new(
                K::Error,
                "Navigation Error",
                "You cannot navigate to your own location.",
            ),
            TrackerEvent::NavigationFailed { .. } => Self::new(
                K::Error,
                "Navigation Error",
                "Could not calculate the route.",
            ),
            TrackerEvent::LocationError { kind: LocationErrorKind::PermissionDenied } => Self::new(
                K::Error,
                "Location Access Denied",
                "Live location tracking is off. Please enable it in your browser/device settings.",
            ),
            TrackerEvent::LocationError { .. } => Self::new(
                K::Error,
                "Location Error",
                "Could not retrieve your location.",
            ),
            TrackerEvent::MemberJoined { entity, name } => Self::new(
                K::NewMember,
                "New Member",
                format!("{name} has joined your circle."),
            )
            .on_click(ClickAction::FocusEntity(*entity)),
            TrackerEvent::MemberLeft { name, .. } => Self::new(
                K::Error,
                "Member Removed",
                format!("{name} has been removed from your circle."),
            ),
            TrackerEvent::ZoneAdded { name, .. } => Self::new(
                K::NewMember,
                "Safe Zone Added",
                format!("The \"{name}\" zone has been created at your location."),
            ),
            TrackerEvent::ZoneUpdated { name, .. } => Self::new(
                K::NewMember,
                "Safe Zone Updated",
                format!("Your changes to \"{name}\" have been saved."),
            ),
            TrackerEvent::ZoneDeleted { name, .. } => Self::new(
                K::Error,
                "Safe Zone Deleted",
                format!("\"{name}\" has been deleted."),
            ),
            TrackerEvent::FindDevice { name, .. } => Self::new(
                K::FindDevice,
                "Finding Device",
                format!("A loud sound is now playing on {name}'s device."),
            ),
            TrackerEvent::NotificationPermission { granted: true } => Self::new(
                K::NewMember,
                "Notifications Enabled",
                "You will now receive alerts.",
            ),
            TrackerEvent::NotificationPermission { granted: false } => Self::new(
                K::Error,
                "Notifications Disabled",
                "You can enable notifications in your browser settings.",
            ),
            TrackerEvent::NewMessage { conversation, sender_name, text } => {
                let mut draft = Self::new(K::NewMessage, format!("New Message from {sender_name}"), text.clone())
                    .on_click(ClickAction::OpenConversation(conversation.clone()));
                draft.conversation = Some(conversation.clone());
                draft
            }
        }
    }
}

/// A live in-app notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub click: Option<ClickAction>,
    pub conversation: Option<ConversationId>,
    
    /// Monotonic time at which it disappears
    pub expires_at: Duration,
}

/// What the user is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewContext {
    /// Conversation open on screen, if the chat view is showing
    pub active_conversation: Option<ConversationId>,
}

/// Owns the transient in-app list and forwards to the system sink.
#[derive(Debug, Clone, Default)]
pub struct NotificationDispatcher {
    config: NotificationConfig,
    active: Vec<Notification>,
    view: ViewContext,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            view: ViewContext::default(),
        }
    }
    
    pub fn set_view(&mut self, view: ViewContext) {
        self.view = view;
    }
    
    pub fn view(&self) -> &ViewContext {
        &self.view
    }
    
    /// Publishes a notification; `now` is monotonic context time.
    ///
    /// The id is drawn from `rng`, so a seeded source gives repeatable ids.
    pub fn dispatch<S, R>(&mut self, draft: NotificationDraft, now: Duration, sink: &S, rng: &mut R) -> NotificationId
    where
        S: NotificationSink + ?Sized,
        R: Rng + ?Sized,
    {
        let id = NotificationId(uuid::Builder::from_random_bytes(rng.gen()).into_uuid());
        debug!(%id, kind = ?draft.kind, title = %draft.title, "notification");
        
        if sink.permission_granted() && !self.suppressed(&draft) {
            sink.deliver(SystemNotification {
                title: draft.title.clone(),
                body: draft.message.clone(),
                tag: id.to_string(),
                click: draft.click.clone(),
            });
        }
        
        self.active.push(Notification {
            id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            click: draft.click,
            conversation: draft.conversation,
            expires_at: now + self.config.display_duration,
        });
        id
    }
    
    /// Renders and publishes a tracker event.
    pub fn notify<S, R>(&mut self, event: &TrackerEvent, now: Duration, sink: &S, rng: &mut R) -> NotificationId
    where
        S: NotificationSink + ?Sized,
        R: Rng + ?Sized,
    {
        self.dispatch(NotificationDraft::from(event), now, sink, rng)
    }
    
    /// Chat messages for the conversation on screen stay in-app only.
    fn suppressed(&self, draft: &NotificationDraft) -> bool {
        draft.kind == NotificationKind::NewMessage
            && draft.conversation.is_some()
            && draft.conversation == self.view.active_conversation
    }
    
    /// Removes a notification early; false if it had already gone.
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        self.active.len() != before
    }
    
    /// Drops every notification whose display time is over.
    pub fn expire(&mut self, now: Duration) -> usize {
        let before = self.active.len();
        self.active.retain(|n| n.expires_at > now);
        before - self.active.len()
    }
    
    /// Earliest pending expiry, if anything is showing.
    pub fn next_expiry(&self) -> Option<Duration> {
        self.active.iter().map(|n| n.expires_at).min()
    }
    
    /// Every notification held, including ones past their expiry that
    /// `expire` has not dropped yet.
    pub fn active(&self) -> &[Notification] {
        &self.active
    }
    
    /// Notifications still visible at `now`.
    pub fn visible_at(&self, now: Duration) -> impl Iterator<Item = &Notification> + '_ {
        self.active.iter().filter(move |n| n.expires_at > now)
    }
}
