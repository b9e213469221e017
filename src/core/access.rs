use crate::adapters::chooser::FirstCandidate;
use crate::core::negotiation;
use crate::core::port::SerialPort;
use crate::core::registry::DeviceRegistry;
use crate::domain::model::{Filter, PortDescriptor, PortEvent, PortId};
use crate::domain::ports::{HostTransport, PortChooser};
use crate::utils::error::{Result, SerialError};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Caller-facing entry point: enumerate, request and hand out ports.
///
/// Owns the registry for its lifetime. `start` enumerates the host and spawns
/// the task that feeds hotplug events into the registry; `shutdown` stops it
/// and closes every open session.
pub struct SerialAccess {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn HostTransport>,
    chooser: Arc<dyn PortChooser>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SerialAccess {
    pub async fn start(transport: Arc<dyn HostTransport>) -> Result<Self> {
        Self::with_chooser(transport, Arc::new(FirstCandidate)).await
    }

    pub async fn with_chooser(
        transport: Arc<dyn HostTransport>,
        chooser: Arc<dyn PortChooser>,
    ) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::new());

        let hotplug = transport.subscribe();
        for descriptor in transport.enumerate().await? {
            registry.on_attach(descriptor);
        }

        let pump = tokio::spawn(pump_hotplug(
            hotplug,
            registry.clone(),
            transport.clone(),
        ));

        info!(ports = registry.list_known().len(), "Serial access started");

        Ok(Self {
            registry,
            transport,
            chooser,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Negotiates `filters` against every present port, lets the configured
    /// chooser pick one and grants it. The returned port is not open yet.
    pub async fn request_port(&self, filters: &[Filter]) -> Result<SerialPort> {
        self.request_port_with(filters, self.chooser.as_ref()).await
    }

    pub async fn request_port_with(
        &self,
        filters: &[Filter],
        chooser: &dyn PortChooser,
    ) -> Result<SerialPort> {
        let candidates = negotiation::select(&self.registry.list_known(), filters);
        if candidates.is_empty() {
            debug!(?filters, "No candidates for port request");
            return Err(SerialError::NoMatch);
        }

        let chosen = chooser.choose(&candidates).await.ok_or(SerialError::NoMatch)?;
        let descriptor = candidates
            .into_iter()
            .find(|candidate| candidate.id == chosen)
            .ok_or(SerialError::NoMatch)?;

        self.registry.grant(&descriptor.id)?;
        info!(port = %descriptor.id, "Port granted");
        Ok(self.handle(descriptor))
    }

    /// Ports the caller has been granted. Never fails.
    pub fn get_accessible_ports(&self) -> Vec<SerialPort> {
        self.registry
            .list_accessible()
            .into_iter()
            .map(|descriptor| self.handle(descriptor))
            .collect()
    }

    /// Accessible ports matching `filters`, without prompting or granting.
    pub fn resolve(&self, filters: &[Filter]) -> Vec<SerialPort> {
        negotiation::resolve(&self.registry, filters)
            .into_iter()
            .map(|descriptor| self.handle(descriptor))
            .collect()
    }

    pub fn accessible_port(&self, id: &PortId) -> Option<SerialPort> {
        self.registry
            .list_accessible()
            .into_iter()
            .find(|descriptor| &descriptor.id == id)
            .map(|descriptor| self.handle(descriptor))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.registry.subscribe()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Stops hotplug delivery and closes every open session. Idempotent.
    pub fn shutdown(&self) {
        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.abort();
            self.registry.teardown();
            info!("Serial access shut down");
        }
    }

    fn handle(&self, descriptor: PortDescriptor) -> SerialPort {
        SerialPort::new(descriptor, self.registry.clone(), self.transport.clone())
    }
}

impl Drop for SerialAccess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump_hotplug(
    mut hotplug: broadcast::Receiver<PortEvent>,
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn HostTransport>,
) {
    loop {
        match hotplug.recv().await {
            Ok(PortEvent::Attached(descriptor)) => {
                registry.on_attach(descriptor);
            }
            Ok(PortEvent::Detached(id)) => {
                registry.on_detach(&id);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Hotplug events lagged, re-enumerating");
                match transport.enumerate().await {
                    Ok(present) => registry.reconcile(&present),
                    Err(e) => warn!(error = %e, "Re-enumeration failed"),
                }
            }
            Err(RecvError::Closed) => {
                debug!("Hotplug source closed");
                break;
            }
        }
    }
}
