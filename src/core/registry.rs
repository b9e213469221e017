//! Authoritative record of known ports and of the ports granted to the caller.
//!
//! Port status is derived from the entry itself: a port is `Open` exactly when
//! its entry holds a session slot, so status and session can never disagree.

use crate::domain::model::{PortDescriptor, PortEvent, PortId, PortStatus, SessionState};
use crate::utils::error::{Result, SerialError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Events buffered per registry subscriber before it starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Shared between a live `PortSession` and its registry slot.
pub(crate) type SessionSignal = Arc<watch::Sender<SessionState>>;

struct SessionSlot {
    epoch: u64,
    signal: SessionSignal,
}

struct PortEntry {
    descriptor: PortDescriptor,
    present: bool,
    session: Option<SessionSlot>,
}

impl PortEntry {
    fn status(&self) -> PortStatus {
        if !self.present {
            PortStatus::Unavailable
        } else if self.session.is_some() {
            PortStatus::Open
        } else {
            PortStatus::Available
        }
    }
}

#[derive(Default)]
struct RegistryState {
    ports: HashMap<PortId, PortEntry>,
    /// Attach order; listings follow it.
    order: Vec<PortId>,
    granted: HashSet<PortId>,
}

impl RegistryState {
    fn present(&self) -> impl Iterator<Item = &PortEntry> {
        self.order
            .iter()
            .filter_map(|id| self.ports.get(id))
            .filter(|entry| entry.present)
    }
}

pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
    events: broadcast::Sender<PortEvent>,
    next_epoch: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
            next_epoch: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // No invariant spans a panic: every mutation completes under one guard.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ports granted to the caller that are currently present, in attach order.
    pub fn list_accessible(&self) -> Vec<PortDescriptor> {
        let state = self.lock();
        state
            .present()
            .filter(|entry| state.granted.contains(&entry.descriptor.id))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Every present port, granted or not, in attach order.
    pub fn list_known(&self) -> Vec<PortDescriptor> {
        self.lock()
            .present()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn grant(&self, port: &PortId) -> Result<()> {
        let mut state = self.lock();
        let present = state.ports.get(port).is_some_and(|entry| entry.present);
        if !present {
            return Err(SerialError::unavailable(port, "port is not attached"));
        }
        if state.granted.insert(port.clone()) {
            debug!(port = %port, "Access granted");
        }
        Ok(())
    }

    pub fn is_granted(&self, port: &PortId) -> bool {
        self.lock().granted.contains(port)
    }

    pub fn status(&self, port: &PortId) -> PortStatus {
        self.lock()
            .ports
            .get(port)
            .map(PortEntry::status)
            .unwrap_or(PortStatus::Unavailable)
    }

    pub fn descriptor(&self, port: &PortId) -> Option<PortDescriptor> {
        self.lock()
            .ports
            .get(port)
            .map(|entry| entry.descriptor.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.events.subscribe()
    }

    /// Records a device attach. Returns `false` when nothing changed.
    pub fn on_attach(&self, descriptor: PortDescriptor) -> bool {
        let mut state = self.lock();
        let id = descriptor.id.clone();

        match state.ports.get_mut(&id) {
            Some(entry) if entry.present && entry.descriptor == descriptor => return false,
            Some(entry) => {
                entry.descriptor = descriptor.clone();
                entry.present = true;
            }
            None => {
                state.order.push(id.clone());
                state.ports.insert(
                    id.clone(),
                    PortEntry {
                        descriptor: descriptor.clone(),
                        present: true,
                        session: None,
                    },
                );
            }
        }
        drop(state);

        info!(port = %id, vendor = ?descriptor.info.usb_vendor_id, product = ?descriptor.info.usb_product_id, "Port attached");
        let _ = self.events.send(PortEvent::Attached(descriptor));
        true
    }

    /// Records a device detach, terminating any open session on the port.
    pub fn on_detach(&self, port: &PortId) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.ports.get_mut(port) else {
            return false;
        };
        if !entry.present {
            return false;
        }

        entry.present = false;
        let session = entry.session.take();
        drop(state);

        if let Some(slot) = session {
            warn!(port = %port, epoch = slot.epoch, "Port detached while open, disconnecting session");
            slot.signal.send_replace(SessionState::Disconnected);
        } else {
            info!(port = %port, "Port detached");
        }

        let _ = self.events.send(PortEvent::Detached(port.clone()));
        true
    }

    /// Brings the present set in line with a fresh enumeration.
    pub fn reconcile(&self, present: &[PortDescriptor]) {
        let stale: Vec<PortId> = self
            .list_known()
            .into_iter()
            .map(|descriptor| descriptor.id)
            .filter(|id| !present.iter().any(|d| &d.id == id))
            .collect();

        for id in &stale {
            self.on_detach(id);
        }
        for descriptor in present {
            self.on_attach(descriptor.clone());
        }
    }

    /// Atomically moves a port from `Available` to `Open`.
    pub(crate) fn reserve(&self, port: &PortId) -> Result<(u64, SessionSignal)> {
        let mut state = self.lock();
        let granted = state.granted.contains(port);
        let entry = match state.ports.get_mut(port) {
            Some(entry) if entry.present => entry,
            _ => return Err(SerialError::unavailable(port, "port is not attached")),
        };
        if !granted {
            return Err(SerialError::unavailable(port, "access has not been granted"));
        }
        if entry.session.is_some() {
            return Err(SerialError::AlreadyOpen { port: port.clone() });
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let (signal, _) = watch::channel(SessionState::Open);
        let signal = Arc::new(signal);
        entry.session = Some(SessionSlot {
            epoch,
            signal: signal.clone(),
        });

        debug!(port = %port, epoch, "Port reserved");
        Ok((epoch, signal))
    }

    /// Returns the port to `Available` if `epoch` still owns it.
    pub(crate) fn release(&self, port: &PortId, epoch: u64) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.ports.get_mut(port) else {
            return false;
        };
        match &entry.session {
            Some(slot) if slot.epoch == epoch => {
                entry.session = None;
                debug!(port = %port, epoch, "Port released");
                true
            }
            _ => false,
        }
    }

    /// Closes every live session and forgets all ports and grants.
    pub fn teardown(&self) {
        let mut state = std::mem::take(&mut *self.lock());
        let mut closed = 0usize;
        for entry in state.ports.values_mut() {
            if let Some(slot) = entry.session.take() {
                slot.signal.send_replace(SessionState::Closed);
                closed += 1;
            }
        }
        info!(ports = state.ports.len(), closed_sessions = closed, "Registry torn down");
    }
}

/// Claim on a port's session slot while a session is being set up.
///
/// Dropping an armed reservation releases the slot, so an `open` that is
/// cancelled or fails part way never leaves the port stuck in `Open`.
pub(crate) struct Reservation {
    registry: Arc<DeviceRegistry>,
    port: PortId,
    epoch: u64,
    armed: bool,
}

impl Reservation {
    pub(crate) fn new(registry: Arc<DeviceRegistry>, port: PortId, epoch: u64) -> Self {
        Self {
            registry,
            port,
            epoch,
            armed: true,
        }
    }

    /// Hands ownership of the slot to the session that now holds `epoch`.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed && self.registry.release(&self.port, self.epoch) {
            debug!(port = %self.port, epoch = self.epoch, "Abandoned reservation released");
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
