//! Power and status-bar visibility policy.
//!
//! Both are pure projections of the current [`ScreenState`]; the stateful
//! halves ([`WakeLockManager`], [`StatusBarHelper`]) compare desired against
//! current before touching the platform, so re-applying a mode is free.

use crate::machine::ScreenState;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    None,
    Partial,
    Full,
}

pub fn power_mode_for(screen: ScreenState) -> PowerMode {
    match screen {
        ScreenState::Dialing
        | ScreenState::Ringing
        | ScreenState::Disconnecting
        | ScreenState::Disconnected => PowerMode::Full,
        _ => PowerMode::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeLockLevel {
    /// Screen and CPU stay on.
    Full,
    /// CPU only.
    Partial,
}

/// Platform wakelock primitives.
pub trait PowerPlatform: Send + Sync {
    fn acquire(&self, level: WakeLockLevel);
    fn release(&self, level: WakeLockLevel);
    /// Turn the screen on for the user-activity timeout.
    fn wake_up(&self);
}

#[derive(Debug, Default, Clone, Copy)]
struct HeldLocks {
    full: bool,
    partial: bool,
}

/// Full and Partial are exclusive: taking one always drops the other.
pub struct WakeLockManager {
    platform: Arc<dyn PowerPlatform>,
    held: Mutex<HeldLocks>,
}

impl WakeLockManager {
    pub fn new(platform: Arc<dyn PowerPlatform>) -> Self {
        Self {
            platform,
            held: Mutex::new(HeldLocks::default()),
        }
    }

    pub fn mode(&self) -> PowerMode {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.full {
            PowerMode::Full
        } else if held.partial {
            PowerMode::Partial
        } else {
            PowerMode::None
        }
    }

    pub fn request(&self, mode: PowerMode) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        debug!(
            ?mode,
            full_held = held.full,
            partial_held = held.partial,
            "request wake lock"
        );
        let (want_full, want_partial) = match mode {
            PowerMode::Full => (true, false),
            PowerMode::Partial => (false, true),
            PowerMode::None => (false, false),
        };
        // acquire before release so the device never drops to sleep in between
        if want_full && !held.full {
            self.platform.acquire(WakeLockLevel::Full);
            held.full = true;
        }
        if want_partial && !held.partial {
            self.platform.acquire(WakeLockLevel::Partial);
            held.partial = true;
        }
        if !want_full && held.full {
            self.platform.release(WakeLockLevel::Full);
            held.full = false;
        }
        if !want_partial && held.partial {
            self.platform.release(WakeLockLevel::Partial);
            held.partial = false;
        }
    }

    pub fn release_all(&self) {
        self.request(PowerMode::None);
    }

    /// Poke the screen awake unless a wakelock already keeps it on.
    pub fn wake_up_screen(&self) {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !(held.full || held.partial) {
            self.platform.wake_up();
        }
    }
}

/// Desired status-bar behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBarPolicy {
    /// Whether the notification shade can be pulled down.
    pub expanded_view_enabled: bool,
    /// Whether the soft navigation buttons respond.
    pub system_bar_navigation_enabled: bool,
}

impl Default for StatusBarPolicy {
    fn default() -> Self {
        Self {
            expanded_view_enabled: true,
            system_bar_navigation_enabled: true,
        }
    }
}

/// Feature set handed to the platform's status-bar `disable` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisableFlags {
    pub expand: bool,
    pub home: bool,
    pub recent: bool,
    pub back: bool,
}

impl fmt::Display for DisableFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.expand {
            parts.push("expand");
        }
        if self.home {
            parts.push("home");
        }
        if self.recent {
            parts.push("recent");
        }
        if self.back {
            parts.push("back");
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

impl StatusBarPolicy {
    pub fn disable_flags(&self) -> DisableFlags {
        let nav_disabled = !self.system_bar_navigation_enabled;
        DisableFlags {
            expand: !self.expanded_view_enabled,
            home: nav_disabled,
            recent: nav_disabled,
            back: nav_disabled,
        }
    }
}

/// Status-bar policy for entering `screen`, or `None` to keep the current one.
///
/// Navigation is locked while ringing against accidental touches. The shade
/// stays locked during a call unless a proximity sensor blanks the screen.
pub fn status_bar_for(screen: ScreenState, proximity_sensor: bool) -> Option<StatusBarPolicy> {
    match screen {
        ScreenState::Ringing => Some(StatusBarPolicy {
            expanded_view_enabled: false,
            system_bar_navigation_enabled: false,
        }),
        ScreenState::Active => Some(StatusBarPolicy {
            expanded_view_enabled: proximity_sensor,
            system_bar_navigation_enabled: true,
        }),
        ScreenState::Idle | ScreenState::Disconnected => Some(StatusBarPolicy::default()),
        _ => None,
    }
}

pub trait StatusBarPlatform: Send + Sync {
    fn disable(&self, flags: DisableFlags);
}

/// Single point of control over the platform status bar.
pub struct StatusBarHelper {
    platform: Arc<dyn StatusBarPlatform>,
    current: StatusBarPolicy,
}

impl StatusBarHelper {
    pub fn new(platform: Arc<dyn StatusBarPlatform>) -> Self {
        Self {
            platform,
            current: StatusBarPolicy::default(),
        }
    }

    pub fn current(&self) -> StatusBarPolicy {
        self.current
    }

    pub fn apply(&mut self, policy: StatusBarPolicy) {
        if self.current == policy {
            return;
        }
        self.current = policy;
        let flags = policy.disable_flags();
        debug!(%flags, "update status bar");
        self.platform.disable(flags);
    }
}
