//! One exclusive, open channel to a port.
//!
//! Every pending operation selects on the session's state channel, so a close,
//! a detach or a registry teardown always resolves it instead of leaving the
//! caller suspended on the transport.

use crate::core::registry::{DeviceRegistry, SessionSignal};
use crate::domain::model::{LineSettings, PortDescriptor, PortId, PortInfo, SessionState};
use crate::domain::ports::{DeviceLink, LinkReader, LinkWriter};
use crate::utils::error::{Result, SerialError};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// What `close` does with writes that were submitted but not yet accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClosePolicy {
    /// Let queued and in-flight writes finish before releasing the port.
    #[default]
    Drain,
    /// Abort queued and in-flight writes with `SerialError::Closed`.
    Discard,
}

/// Resolves with the first state satisfying `done`.
pub(crate) async fn wait_for_state(
    mut state: watch::Receiver<SessionState>,
    done: impl Fn(SessionState) -> bool,
) -> SessionState {
    loop {
        let current = *state.borrow_and_update();
        if done(current) {
            return current;
        }
        if state.changed().await.is_err() {
            return SessionState::Closed;
        }
    }
}

pub(crate) fn termination_error(port: &PortId, state: SessionState) -> SerialError {
    match state {
        SessionState::Disconnected => SerialError::Disconnected { port: port.clone() },
        _ => SerialError::Closed,
    }
}

pub struct PortSession {
    descriptor: PortDescriptor,
    settings: LineSettings,
    epoch: u64,
    signal: SessionSignal,
    registry: Arc<DeviceRegistry>,
    reader: Mutex<Option<LinkReader>>,
    writer: Mutex<Option<LinkWriter>>,
}

impl PortSession {
    pub(crate) fn new(
        descriptor: PortDescriptor,
        settings: LineSettings,
        epoch: u64,
        signal: SessionSignal,
        registry: Arc<DeviceRegistry>,
        link: DeviceLink,
    ) -> Self {
        Self {
            descriptor,
            settings,
            epoch,
            signal,
            registry,
            reader: Mutex::new(Some(link.reader)),
            writer: Mutex::new(Some(link.writer)),
        }
    }

    pub fn port_id(&self) -> &PortId {
        &self.descriptor.id
    }

    /// Vendor/product ids of the underlying port; `None` where unknown.
    pub fn info(&self) -> PortInfo {
        self.descriptor.info
    }

    pub fn settings(&self) -> &LineSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        *self.signal.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Resolves once the session reached `Closed` or `Disconnected`.
    pub async fn terminated(&self) -> SessionState {
        wait_for_state(self.signal.subscribe(), SessionState::is_terminal).await
    }

    /// Next chunk of received bytes.
    ///
    /// `Ok(None)` marks the end of the sequence after a close. A detach, or
    /// the transport reaching end of stream, yields `SerialError::Disconnected`.
    pub async fn read(&self) -> Result<Option<Vec<u8>>> {
        match self.state() {
            SessionState::Open => {}
            SessionState::Disconnected => return Err(self.disconnected()),
            SessionState::Draining | SessionState::Closed => return Ok(None),
        }

        let state = self.signal.subscribe();
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return self.end_of_stream();
        };

        let mut buf = vec![0u8; self.settings.buffer_size];
        let received = tokio::select! {
            biased;
            _ = wait_for_state(state, |s| s != SessionState::Open) => {
                return self.end_of_stream();
            }
            received = reader.read(&mut buf) => received,
        };

        match received {
            Ok(0) => {
                self.mark_disconnected("transport reached end of stream");
                Err(self.disconnected())
            }
            Ok(n) => {
                buf.truncate(n);
                debug!(port = %self.port_id(), bytes = n, "Read chunk");
                Ok(Some(buf))
            }
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// Queues `data` behind earlier writes on this session and resolves once
    /// the transport accepted and flushed it.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if self.state() != SessionState::Open {
            return Err(SerialError::Closed);
        }

        let state = self.signal.subscribe();
        // tokio's Mutex is fair, which keeps writes in submission order.
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(SerialError::Closed);
        };

        let written = tokio::select! {
            biased;
            ended = wait_for_state(state, SessionState::is_terminal) => {
                return Err(termination_error(self.port_id(), ended));
            }
            written = async {
                writer.write_all(data).await?;
                writer.flush().await
            } => written,
        };

        match written {
            Ok(()) => {
                debug!(port = %self.port_id(), bytes = data.len(), "Wrote chunk");
                Ok(())
            }
            Err(e) => Err(self.transport_error(e)),
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.close_with(ClosePolicy::Drain).await
    }

    /// Closes the session and hands the port back to the registry.
    ///
    /// Idempotent. A `Discard` close issued while a drain is in progress
    /// aborts the remaining writes; a second `Drain` close waits for the
    /// first one to finish. If the call that started the close is dropped
    /// before it completes, the port is still released.
    pub async fn close_with(&self, policy: ClosePolicy) -> Result<()> {
        let mut owner = false;
        self.signal.send_if_modified(|state| match (*state, policy) {
            (SessionState::Open, ClosePolicy::Drain) => {
                *state = SessionState::Draining;
                owner = true;
                true
            }
            (SessionState::Open, ClosePolicy::Discard) => {
                *state = SessionState::Closed;
                owner = true;
                true
            }
            (SessionState::Draining, ClosePolicy::Discard) => {
                *state = SessionState::Closed;
                true
            }
            _ => false,
        });

        if !owner {
            if policy == ClosePolicy::Drain {
                self.terminated().await;
            }
            self.drop_link().await;
            return Ok(());
        }

        debug!(port = %self.port_id(), ?policy, "Closing session");
        let finish = FinishClose(self);

        // Queued writes hold their place in the lock queue ahead of us.
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if policy == ClosePolicy::Drain {
                if let Err(e) = writer.shutdown().await {
                    debug!(port = %self.port_id(), error = %e, "Writer shutdown failed");
                }
            }
        }

        drop(finish);
        self.reader.lock().await.take();

        info!(port = %self.port_id(), "Session closed");
        Ok(())
    }

    /// Moves a draining session to `Closed` and returns the port.
    fn finish_close(&self) {
        self.signal.send_if_modified(|state| {
            if *state == SessionState::Draining {
                *state = SessionState::Closed;
                true
            } else {
                false
            }
        });
        self.registry.release(self.port_id(), self.epoch);
    }

    /// Drops both transport halves once the session has terminated.
    async fn drop_link(&self) {
        self.writer.lock().await.take();
        self.reader.lock().await.take();
    }

    fn end_of_stream(&self) -> Result<Option<Vec<u8>>> {
        match self.state() {
            SessionState::Disconnected => Err(self.disconnected()),
            _ => Ok(None),
        }
    }

    fn disconnected(&self) -> SerialError {
        SerialError::Disconnected {
            port: self.port_id().clone(),
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        let changed = self.signal.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = SessionState::Disconnected;
                true
            }
        });
        if changed {
            warn!(port = %self.port_id(), reason, "Session disconnected");
            self.registry.release(self.port_id(), self.epoch);
        }
    }

    fn transport_error(&self, error: std::io::Error) -> SerialError {
        match error.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
                self.mark_disconnected("transport link broken");
                self.disconnected()
            }
            _ if self.state() == SessionState::Disconnected => self.disconnected(),
            _ => SerialError::Io(error),
        }
    }
}

struct FinishClose<'a>(&'a PortSession);

impl Drop for FinishClose<'_> {
    fn drop(&mut self) {
        self.0.finish_close();
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        let abandoned = self.signal.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
        if abandoned {
            debug!(port = %self.port_id(), "Session dropped while open, releasing port");
            self.registry.release(self.port_id(), self.epoch);
        }
    }
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("port", &self.descriptor.id)
            .field("epoch", &self.epoch)
            .field("state", &self.state())
            .finish()
    }
}
