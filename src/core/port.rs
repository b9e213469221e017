use crate::core::registry::{DeviceRegistry, Reservation};
use crate::core::session::{termination_error, wait_for_state, PortSession};
use crate::domain::model::{
    PortDescriptor, PortId, PortInfo, PortStatus, SerialOptions, SessionState,
};
use crate::domain::ports::HostTransport;
use crate::utils::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle to a granted port. Cheap to clone; opening it yields a `PortSession`.
#[derive(Clone)]
pub struct SerialPort {
    descriptor: PortDescriptor,
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn HostTransport>,
}

impl SerialPort {
    pub(crate) fn new(
        descriptor: PortDescriptor,
        registry: Arc<DeviceRegistry>,
        transport: Arc<dyn HostTransport>,
    ) -> Self {
        Self {
            descriptor,
            registry,
            transport,
        }
    }

    pub fn id(&self) -> &PortId {
        &self.descriptor.id
    }

    /// Vendor/product ids as last reported by the host. Never blocks.
    pub fn info(&self) -> PortInfo {
        self.registry
            .descriptor(self.id())
            .map(|d| d.info)
            .unwrap_or(self.descriptor.info)
    }

    pub fn status(&self) -> PortStatus {
        self.registry.status(self.id())
    }

    /// Validates `options`, claims the port and connects through the host.
    ///
    /// Fails with `InvalidConfig`, `AlreadyOpen`, `Unavailable`, or
    /// `Disconnected` if the device goes away while the link is being set up.
    /// Dropping the returned future before it resolves releases the port.
    pub async fn open(&self, options: SerialOptions) -> Result<PortSession> {
        let settings = options.line_settings()?;
        let id = self.id().clone();

        let (epoch, signal) = self.registry.reserve(&id)?;
        let reservation = Reservation::new(self.registry.clone(), id.clone(), epoch);
        let state = signal.subscribe();

        let connected = tokio::select! {
            biased;
            ended = wait_for_state(state, |s| s != SessionState::Open) => {
                Err(termination_error(&id, ended))
            }
            link = self.transport.connect(&id, &settings) => link,
        };

        match connected {
            Ok(link) => {
                info!(port = %id, baud_rate = settings.baud_rate, epoch, "Session opened");
                let descriptor = PortDescriptor {
                    id,
                    info: self.info(),
                };
                let session = PortSession::new(
                    descriptor,
                    settings,
                    epoch,
                    signal,
                    self.registry.clone(),
                    link,
                );
                reservation.disarm();
                Ok(session)
            }
            Err(e) => {
                warn!(port = %id, error = %e, "Open failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("id", &self.descriptor.id)
            .field("info", &self.descriptor.info)
            .finish()
    }
}
