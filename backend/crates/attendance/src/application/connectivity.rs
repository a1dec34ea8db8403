//! Online/offline signal
//!
//! There is no OS event to listen to, so connectivity is inferred from
//! traffic: any answer from the backend means online, a transport failure or
//! timeout means offline. Subscribers see the edges through a `watch`
//! channel.

use tokio::sync::watch;

use crate::error::AttendanceError;

#[derive(Debug)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Record the current state; only changes wake subscribers
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
    }

    /// Derive the state from the result of a backend call
    pub fn report<T>(&self, result: &Result<T, AttendanceError>) {
        match result {
            Ok(_) => self.set_online(true),
            Err(e) if e.is_connectivity() => self.set_online(false),
            // The backend answered, even if with an error
            Err(AttendanceError::Rejected { .. } | AttendanceError::MalformedResponse(_)) => {
                self.set_online(true)
            }
            Err(_) => {}
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
