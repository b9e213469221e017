//! In-memory host transport.
//!
//! Each attached device gets a `VirtualDevice` harness. Every `connect` on the
//! host side creates a `tokio::io::duplex` pair: the host half goes to the
//! session, the device half (with the negotiated line settings) is delivered
//! to the harness through `accept`.

use crate::core::registry::DEFAULT_EVENT_CAPACITY;
use crate::domain::model::{LineSettings, PortDescriptor, PortEvent, PortId};
use crate::domain::ports::{DeviceLink, HostTransport};
use crate::utils::error::{Result, SerialError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Bytes buffered in each direction of a virtual link.
pub const DEFAULT_LINK_CAPACITY: usize = 4096;

/// Device side of one host connection.
#[derive(Debug)]
pub struct DeviceConnection {
    pub stream: DuplexStream,
    pub settings: LineSettings,
}

/// Test/simulation handle for one attached virtual device.
#[derive(Debug)]
pub struct VirtualDevice {
    descriptor: PortDescriptor,
    connections: mpsc::UnboundedReceiver<DeviceConnection>,
}

impl VirtualDevice {
    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    /// Next host connection; `None` once the device has been detached.
    pub async fn accept(&mut self) -> Option<DeviceConnection> {
        self.connections.recv().await
    }
}

struct DeviceSlot {
    descriptor: PortDescriptor,
    connector: mpsc::UnboundedSender<DeviceConnection>,
}

pub struct VirtualTransport {
    devices: Mutex<Vec<DeviceSlot>>,
    events: broadcast::Sender<PortEvent>,
    link_capacity: usize,
}

impl VirtualTransport {
    pub fn new() -> Self {
        Self::with_link_capacity(DEFAULT_LINK_CAPACITY)
    }

    pub fn with_link_capacity(link_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            devices: Mutex::new(Vec::new()),
            events,
            link_capacity,
        }
    }

    fn devices(&self) -> MutexGuard<'_, Vec<DeviceSlot>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plugs in a device. Re-attaching an id replaces the previous device.
    pub fn attach(&self, descriptor: PortDescriptor) -> VirtualDevice {
        let (connector, connections) = mpsc::unbounded_channel();
        {
            let mut devices = self.devices();
            devices.retain(|slot| slot.descriptor.id != descriptor.id);
            devices.push(DeviceSlot {
                descriptor: descriptor.clone(),
                connector,
            });
        }

        debug!(port = %descriptor.id, "Virtual device attached");
        let _ = self.events.send(PortEvent::Attached(descriptor.clone()));

        VirtualDevice {
            descriptor,
            connections,
        }
    }

    /// Plugs in a device that echoes every byte back to the host.
    pub fn attach_loopback(&self, descriptor: PortDescriptor) -> JoinHandle<()> {
        let mut device = self.attach(descriptor);
        tokio::spawn(async move {
            while let Some(connection) = device.accept().await {
                let port = device.descriptor().id.clone();
                tokio::spawn(async move {
                    let (mut reader, mut writer) = tokio::io::split(connection.stream);
                    match tokio::io::copy(&mut reader, &mut writer).await {
                        Ok(echoed) => debug!(port = %port, echoed, "Loopback link finished"),
                        Err(e) => debug!(port = %port, error = %e, "Loopback link failed"),
                    }
                });
            }
        })
    }

    /// Unplugs a device. Pending `accept` calls on its harness return `None`.
    pub fn detach(&self, port: &PortId) -> bool {
        let removed = {
            let mut devices = self.devices();
            let before = devices.len();
            devices.retain(|slot| &slot.descriptor.id != port);
            before != devices.len()
        };

        if removed {
            debug!(port = %port, "Virtual device detached");
            let _ = self.events.send(PortEvent::Detached(port.clone()));
        }
        removed
    }
}

impl Default for VirtualTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostTransport for VirtualTransport {
    async fn enumerate(&self) -> Result<Vec<PortDescriptor>> {
        Ok(self
            .devices()
            .iter()
            .map(|slot| slot.descriptor.clone())
            .collect())
    }

    async fn connect(&self, port: &PortId, settings: &LineSettings) -> Result<DeviceLink> {
        let connector = self
            .devices()
            .iter()
            .find(|slot| &slot.descriptor.id == port)
            .map(|slot| slot.connector.clone())
            .ok_or_else(|| SerialError::unavailable(port, "no such virtual device"))?;

        let (host, device) = tokio::io::duplex(self.link_capacity);
        connector
            .send(DeviceConnection {
                stream: device,
                settings: *settings,
            })
            .map_err(|_| SerialError::Transport {
                message: format!("virtual device {} is not accepting connections", port),
            })?;

        info!(port = %port, baud_rate = settings.baud_rate, "Virtual link established");
        let (reader, writer) = tokio::io::split(host);
        Ok(DeviceLink::new(reader, writer))
    }

    fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.events.subscribe()
    }
}
