use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::model::{AnimationMode, ColorMode, PlaylistEntry};

/// Changes observed on the session state, after a poll merge or a command.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    QueueChanged {
        current: Option<PlaylistEntry>,
        queued: Vec<PlaylistEntry>,
    },
    VolumeChanged {
        vol_pct: u8,
    },
    /// Display mode or loading flag changed on at least one screen.
    ScreensChanged,
    AnimationModeChanged {
        mode: AnimationMode,
    },
    ScreensaverChanged {
        enabled: bool,
    },
    VideoQueued {
        title: String,
        color_mode: ColorMode,
    },
}

#[derive(Clone, Default)]
pub struct SessionEventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded::<SessionEvent>();
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn broadcast_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.broadcast(event);
        }
    }
}
