use crate::domain::model::{LineSettings, PortDescriptor, PortEvent, PortId};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte stream to one device, as handed out by the host transport.
pub struct DeviceLink {
    pub reader: LinkReader,
    pub writer: LinkWriter,
}

impl DeviceLink {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Driver boundary: byte transport plus attach/detach event source.
#[async_trait]
pub trait HostTransport: Send + Sync {
    /// Ports present right now.
    async fn enumerate(&self) -> Result<Vec<PortDescriptor>>;

    async fn connect(&self, port: &PortId, settings: &LineSettings) -> Result<DeviceLink>;

    /// Hotplug notifications. Subscribe before `enumerate` to avoid missing events.
    fn subscribe(&self) -> broadcast::Receiver<PortEvent>;
}

/// Picks one port among negotiated candidates; stands in for a permission prompt.
#[async_trait]
pub trait PortChooser: Send + Sync {
    /// `None` means the selection was declined.
    async fn choose(&self, candidates: &[PortDescriptor]) -> Option<PortId>;
}
