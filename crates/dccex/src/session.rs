//! Serial session with a DCC-EX command station.
//!
//! The session owns at most one open device, one read loop and one write
//! half. Observable state (connection, track power, last response) is
//! published through [`tokio::sync::watch`] channels.
//!
//! The write half sits behind its own lock so a write parked on a station
//! that stopped reading never holds up [`DccSession::disconnect`].

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on the flush that precedes releasing the write half.
const RELEASE_FLUSH: Duration = Duration::from_millis(200);

use crate::command::{encode_line, Command};
use crate::config::SessionConfig;
use crate::error::DccError;
use crate::transport::{PortProvider, PortReader, PortWriter, SerialDevice};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ReadLoop {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Resources {
    device: Option<Box<dyn SerialDevice>>,
    reader: Option<ReadLoop>,
}

/// Client session for one command station.
pub struct DccSession {
    provider: Arc<dyn PortProvider>,
    config: SessionConfig,
    resources: Mutex<Resources>,
    writer: Mutex<Option<PortWriter>>,
    /// Raised while a disconnect is in progress; aborts in-flight writes.
    closing_tx: watch::Sender<bool>,
    state_tx: watch::Sender<SessionState>,
    power_tx: watch::Sender<bool>,
    response_tx: watch::Sender<String>,
}

impl std::fmt::Debug for DccSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DccSession")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("track_power", &self.track_power())
            .finish()
    }
}

impl DccSession {
    pub fn new(provider: Arc<dyn PortProvider>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (power_tx, _) = watch::channel(false);
        let (response_tx, _) = watch::channel(String::new());
        let (closing_tx, _) = watch::channel(false);
        Self {
            provider,
            config,
            resources: Mutex::new(Resources::default()),
            writer: Mutex::new(None),
            closing_tx,
            state_tx,
            power_tx,
            response_tx,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Mirror of the last successfully sent power command.
    pub fn track_power(&self) -> bool {
        *self.power_tx.borrow()
    }

    /// Text of the most recent chunk read from the station.
    pub fn last_response(&self) -> String {
        self.response_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_power(&self) -> watch::Receiver<bool> {
        self.power_tx.subscribe()
    }

    pub fn subscribe_responses(&self) -> watch::Receiver<String> {
        self.response_tx.subscribe()
    }

    /// Acquire a serial device, open it and start the read loop.
    ///
    /// On any failure the session stays disconnected and the error is
    /// returned. Track power is reset either way.
    pub async fn connect(&self) -> Result<(), DccError> {
        let mut resources = self.resources.lock().await;
        if resources.device.is_some() {
            return Err(DccError::AlreadyConnected);
        }
        self.closing_tx.send_replace(false);
        self.state_tx.send_replace(SessionState::Connecting);
        self.power_tx.send_replace(false);

        let mut device = match self.open_device().await {
            Ok(device) => device,
            Err(err) => {
                error!(error = %err, "failed to connect");
                self.state_tx.send_replace(SessionState::Disconnected);
                return Err(err);
            }
        };

        match device.take_reader() {
            Some(reader) => {
                let (cancel, cancelled) = oneshot::channel();
                let handle = tokio::spawn(read_loop(
                    reader,
                    cancelled,
                    self.response_tx.clone(),
                    self.config.read_buffer.max(1),
                ));
                resources.reader = Some(ReadLoop { cancel, handle });
            }
            None => warn!(port = device.name(), "device is not readable"),
        }
        let writer = device.take_writer();
        if writer.is_none() {
            warn!(port = device.name(), "device is not writable");
        }
        *self.writer.lock().await = writer;
        info!(port = device.name(), baud = self.config.baud_rate, "connected to DCC-EX");
        resources.device = Some(device);
        self.state_tx.send_replace(SessionState::Connected);
        Ok(())
    }

    async fn open_device(&self) -> Result<Box<dyn SerialDevice>, DccError> {
        let mut device = self.provider.request_port().await?;
        device.open(self.config.baud_rate).await?;
        Ok(device)
    }

    /// Stop reading, release the writer and close the device.
    ///
    /// A write still in flight is abandoned and fails with
    /// [`DccError::NotConnected`]. Each step is skipped when its resource is
    /// absent, so calling this while disconnected is a no-op. A close failure
    /// is returned after the session has been reset.
    pub async fn disconnect(&self) -> Result<(), DccError> {
        self.closing_tx.send_replace(true);
        let mut resources = self.resources.lock().await;
        if let Some(ReadLoop { cancel, handle }) = resources.reader.take() {
            // the loop may already have ended on its own
            let _ = cancel.send(());
            if let Err(err) = handle.await {
                warn!(error = %err, "read loop ended abnormally");
            }
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match tokio::time::timeout(RELEASE_FLUSH, writer.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(error = %err, "flush before release failed"),
                Err(_) => debug!("flush before release timed out"),
            }
        }
        let closed = match resources.device.take() {
            Some(mut device) => {
                let name = device.name().to_string();
                let result = device.close().await;
                if result.is_ok() {
                    info!(port = %name, "disconnected from DCC-EX");
                }
                result
            }
            None => Ok(()),
        };
        self.power_tx.send_replace(false);
        self.state_tx.send_replace(SessionState::Disconnected);
        closed
    }

    /// Write `text` plus a newline.
    ///
    /// Fails with [`DccError::NotConnected`] when no port is open or when a
    /// disconnect starts before the line is fully written.
    pub async fn send_command(&self, text: &str) -> Result<(), DccError> {
        let mut closing = self.closing_tx.subscribe();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(DccError::NotConnected)?;
        if *closing.borrow() {
            return Err(DccError::NotConnected);
        }
        let line = encode_line(text);
        tokio::select! {
            written = async {
                writer.write_all(&line).await?;
                writer.flush().await
            } => written?,
            _ = closing.wait_for(|closing| *closing) => {
                warn!(command = text, "write abandoned by disconnect");
                return Err(DccError::NotConnected);
            }
        }
        debug!(command = text, "sent");
        let power = match text.trim() {
            "<1>" => Some(true),
            "<0>" => Some(false),
            _ => None,
        };
        if let Some(on) = power {
            self.power_tx.send_replace(on);
        }
        Ok(())
    }

    pub async fn send(&self, command: &Command) -> Result<(), DccError> {
        self.send_command(&command.to_string()).await
    }

    /// Switch track power; the mirror only changes once the command is sent.
    pub async fn set_track_power(&self, on: bool) -> Result<(), DccError> {
        self.send(&Command::TrackPower(on)).await
    }

    pub async fn status(&self) -> Result<(), DccError> {
        self.send(&Command::Status).await
    }

    pub async fn emergency_stop(&self) -> Result<(), DccError> {
        self.send(&Command::EmergencyStop).await
    }
}

/// Pull chunks until end of data, a read error or cancellation.
async fn read_loop(
    mut reader: PortReader,
    mut cancelled: oneshot::Receiver<()>,
    response: watch::Sender<String>,
    chunk: usize,
) {
    let mut buf = vec![0u8; chunk];
    let mut pending = BytesMut::new();
    loop {
        tokio::select! {
            _ = &mut cancelled => {
                debug!("read loop cancelled");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("serial stream ended");
                    break;
                }
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    if let Some(text) = take_text(&mut pending) {
                        debug!(response = %text.trim_end(), "DCC-EX");
                        response.send_replace(text);
                    }
                }
                Err(err) => {
                    error!(error = %err, "serial read failed");
                    break;
                }
            },
        }
    }
}

/// Decode the complete UTF-8 prefix of `pending`, keeping a trailing partial
/// character for the next chunk. Invalid bytes are replaced.
fn take_text(pending: &mut BytesMut) -> Option<String> {
    let complete = match std::str::from_utf8(&pending[..]) {
        Ok(_) => pending.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => pending.len(),
    };
    if complete == 0 {
        return None;
    }
    let text = String::from_utf8_lossy(&pending[..complete]).into_owned();
    pending.advance(complete);
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PipeDevice, PipeProvider};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn session(provider: &PipeProvider) -> DccSession {
        DccSession::new(Arc::new(provider.clone()), SessionConfig::default())
    }

    #[tokio::test]
    async fn power_follows_commands_and_resets_on_disconnect() {
        let provider = PipeProvider::new();
        let station = provider.attach("pipe0", 1024);
        let session = session(&provider);

        session.connect().await.expect("connect");
        assert!(session.is_connected());
        assert!(!session.track_power());

        session.send_command("<1>").await.unwrap();
        assert!(session.track_power());
        session.set_track_power(false).await.unwrap();
        assert!(!session.track_power());
        session.set_track_power(true).await.unwrap();

        let mut lines = BufReader::new(station).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("<1>"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("<0>"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("<1>"));

        session.disconnect().await.unwrap();
        assert!(!session.track_power());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.send_command("<s>").await,
            Err(DccError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn responses_are_published() {
        let provider = PipeProvider::new();
        let mut station = provider.attach("pipe0", 1024);
        let session = session(&provider);
        let mut responses = session.subscribe_responses();
        session.connect().await.unwrap();

        station.write_all(b"<p1>\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), responses.changed())
            .await
            .expect("response in time")
            .unwrap();
        assert_eq!(session.last_response(), "<p1>\n");
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn failed_open_leaves_session_disconnected() {
        let provider = PipeProvider::new();
        provider.push(PipeDevice::busy("ttyACM0"));
        let session = session(&provider);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, DccError::Open { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);

        // nothing queued: the request itself fails
        assert!(matches!(
            session.connect().await,
            Err(DccError::PortUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let provider = PipeProvider::new();
        let session = session(&provider);
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let provider = PipeProvider::new();
        let _station = provider.attach("pipe0", 64);
        let session = session(&provider);
        session.connect().await.unwrap();
        assert!(matches!(
            session.connect().await,
            Err(DccError::AlreadyConnected)
        ));
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn station_hangup_ends_the_read_loop() {
        let provider = PipeProvider::new();
        let station = provider.attach("pipe0", 64);
        let session = session(&provider);
        session.connect().await.unwrap();
        drop(station);
        // the loop exits on end of data; disconnect still succeeds
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_abandons_a_stalled_write() {
        let provider = PipeProvider::new();
        // the station never reads, so a line longer than the pipe parks
        let _station = provider.attach("pipe0", 8);
        let session = Arc::new(session(&provider));
        session.connect().await.unwrap();

        let sender = Arc::clone(&session);
        let pending = tokio::spawn(async move { sender.send_command("<t 1 3 100 1>").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        tokio::time::timeout(Duration::from_secs(2), session.disconnect())
            .await
            .expect("disconnect in time")
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            pending.await.unwrap(),
            Err(DccError::NotConnected)
        ));
        assert!(matches!(
            session.send_command("<s>").await,
            Err(DccError::NotConnected)
        ));
    }

    #[test]
    fn split_characters_wait_for_the_rest() {
        let mut pending = BytesMut::from(&"<é"[..]);
        pending.truncate(2); // '<' plus the first byte of 'é'
        assert_eq!(take_text(&mut pending).as_deref(), Some("<"));
        assert_eq!(pending.len(), 1);
        assert_eq!(take_text(&mut pending), None);
        pending.extend_from_slice(&"é".as_bytes()[1..]);
        assert_eq!(take_text(&mut pending).as_deref(), Some("é"));
        assert!(pending.is_empty());
    }
}
