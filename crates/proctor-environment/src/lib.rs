//! Host window integrity signals funnelled onto one event channel.

mod deny_list;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use proctor_types::environment::{EnvironmentEvent, HostEvent, SessionPhase};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use deny_list::{KeyDenyList, KeyRule};

/// Environment event stamped with the moment the host raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEnvironmentEvent {
    pub event: EnvironmentEvent,
    pub at: DateTime<Utc>,
}

pub type EnvironmentReceiver = mpsc::UnboundedReceiver<TimedEnvironmentEvent>;

/// What the host listener should do with the original event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dispatch {
    pub prevent_default: bool,
    pub forwarded: Option<EnvironmentEvent>,
}

struct Shared {
    attached: AtomicBool,
    interview: AtomicBool,
    deny_list: KeyDenyList,
}

/// Cloneable entry point handed to host listeners.
///
/// Callbacks stay synchronous: they translate, enqueue and return.
#[derive(Clone)]
pub struct WatcherHandle {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<TimedEnvironmentEvent>,
}

impl WatcherHandle {
    pub fn dispatch(&self, event: HostEvent) -> Dispatch {
        self.dispatch_at(event, Utc::now())
    }

    pub fn dispatch_at(&self, event: HostEvent, at: DateTime<Utc>) -> Dispatch {
        if !self.shared.attached.load(Ordering::Acquire) {
            return Dispatch::default();
        }
        let interview = self.shared.interview.load(Ordering::Acquire);
        let mut dispatch = Dispatch::default();
        let forwarded = match event {
            HostEvent::FullscreenChanged { active: true } => Some(EnvironmentEvent::FullscreenEntered),
            _ if !interview => None,
            HostEvent::VisibilityChanged { hidden: true } => Some(EnvironmentEvent::TabHidden),
            HostEvent::VisibilityChanged { hidden: false } => Some(EnvironmentEvent::TabVisible),
            HostEvent::WindowBlur => Some(EnvironmentEvent::WindowBlur),
            HostEvent::FullscreenChanged { active: false } => {
                Some(EnvironmentEvent::FullscreenExited)
            }
            HostEvent::KeyDown(stroke) => {
                if self.shared.deny_list.is_denied(&stroke) {
                    dispatch.prevent_default = true;
                    Some(EnvironmentEvent::SuspiciousKey {
                        combo: stroke.combo(),
                    })
                } else {
                    None
                }
            }
        };

        if let Some(event) = &forwarded {
            if self
                .tx
                .send(TimedEnvironmentEvent {
                    event: event.clone(),
                    at,
                })
                .is_err()
            {
                debug!("Environment receiver gone; dropping {:?}", event);
            }
        }
        dispatch.forwarded = forwarded;
        dispatch
    }
}

/// Subscribes to host integrity signals for one session at a time.
pub struct EnvironmentWatcher {
    deny_list: KeyDenyList,
    current: Option<Arc<Shared>>,
}

impl EnvironmentWatcher {
    pub fn new(deny_list: KeyDenyList) -> Self {
        Self {
            deny_list,
            current: None,
        }
    }

    /// Starts listening in the setup phase. Any previous attachment is detached.
    pub fn attach(&mut self) -> (WatcherHandle, EnvironmentReceiver) {
        self.detach();
        let shared = Arc::new(Shared {
            attached: AtomicBool::new(true),
            interview: AtomicBool::new(false),
            deny_list: self.deny_list.clone(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        self.current = Some(Arc::clone(&shared));
        info!("Environment watcher attached");
        (WatcherHandle { shared, tx }, rx)
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        if let Some(shared) = &self.current {
            shared
                .interview
                .store(phase == SessionPhase::Interview, Ordering::Release);
            debug!("Environment watcher phase {:?}", phase);
        }
    }

    /// Stops forwarding from every handle of the current attachment. Idempotent.
    pub fn detach(&mut self) {
        if let Some(shared) = self.current.take() {
            shared.attached.store(false, Ordering::Release);
            info!("Environment watcher detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.is_some()
    }
}

impl Default for EnvironmentWatcher {
    fn default() -> Self {
        Self::new(KeyDenyList::default())
    }
}

impl Drop for EnvironmentWatcher {
    fn drop(&mut self) {
        self.detach();
    }
}
