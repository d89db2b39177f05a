//! Native serial ports through the `serialport` crate.
//!
//! `serialport` is blocking. An open port is bridged to the async session
//! through an in-memory pipe: a blocking pump copies device bytes into the
//! pipe, and an async pump hands pipe bytes to blocking writes.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serialport::{SerialPort, SerialPortType};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace};

use crate::error::DccError;
use crate::transport::{PortProvider, PortReader, PortWriter, SerialDevice};

/// Read timeout of the blocking pump; bounds how long closing takes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PIPE_CAPACITY: usize = 4096;

/// Serial device discovered on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// List the serial devices the operating system reports.
pub fn available_ports() -> Result<Vec<PortInfo>, DccError> {
    let ports = serialport::available_ports()
        .map_err(|err| DccError::PortUnavailable(err.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            kind: describe(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe(kind: &SerialPortType) -> String {
    match kind {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("usb");
            format!("{product} ({:04x}:{:04x})", usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Provider for one configured device path.
#[derive(Debug, Clone)]
pub struct NativePortProvider {
    path: String,
}

impl NativePortProvider {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PortProvider for NativePortProvider {
    async fn request_port(&self) -> Result<Box<dyn SerialDevice>, DccError> {
        if self.path.is_empty() {
            return Err(DccError::PortUnavailable("no serial port configured".into()));
        }
        Ok(Box::new(NativePort::new(self.path.clone())))
    }
}

/// Serial device opened with `serialport`.
pub struct NativePort {
    path: String,
    reader: Option<PortReader>,
    writer: Option<PortWriter>,
    running: Arc<AtomicBool>,
}

impl NativePort {
    pub fn new(path: String) -> Self {
        Self {
            path,
            reader: None,
            writer: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl SerialDevice for NativePort {
    fn name(&self) -> &str {
        &self.path
    }

    async fn open(&mut self, baud_rate: u32) -> Result<(), DccError> {
        let path = self.path.clone();
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(&path, baud_rate)
                .timeout(POLL_INTERVAL)
                .open()
        })
        .await
        .map_err(|err| DccError::Open {
            port: self.path.clone(),
            reason: err.to_string(),
        })?;
        let port = opened.map_err(|err| DccError::Open {
            port: self.path.clone(),
            reason: err.to_string(),
        })?;
        let device_reader = port.try_clone().map_err(|err| DccError::Open {
            port: self.path.clone(),
            reason: err.to_string(),
        })?;

        let (session_end, bridge_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (bridge_rx, bridge_tx) = tokio::io::split(bridge_end);
        self.running.store(true, Ordering::SeqCst);
        spawn_read_pump(device_reader, bridge_tx, Arc::clone(&self.running));
        tokio::spawn(write_pump(port, bridge_rx));

        let (reader, writer) = tokio::io::split(session_end);
        self.reader = Some(Box::new(reader));
        self.writer = Some(Box::new(writer));
        info!(port = %self.path, baud_rate, "serial port opened");
        Ok(())
    }

    fn take_reader(&mut self) -> Option<PortReader> {
        self.reader.take()
    }

    fn take_writer(&mut self) -> Option<PortWriter> {
        self.writer.take()
    }

    async fn close(&mut self) -> Result<(), DccError> {
        self.running.store(false, Ordering::SeqCst);
        self.reader = None;
        self.writer = None;
        debug!(port = %self.path, "serial port closing");
        Ok(())
    }
}

/// Blocking device reads into the pipe until closed or the pipe is gone.
fn spawn_read_pump(
    mut device: Box<dyn SerialPort>,
    mut pipe: WriteHalf<DuplexStream>,
    running: Arc<AtomicBool>,
) {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 256];
        while running.load(Ordering::SeqCst) {
            match device.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    trace!(bytes = n, "serial rx");
                    if handle.block_on(pipe.write_all(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::TimedOut => continue,
                Err(err) => {
                    error!(error = %err, "serial device read failed");
                    break;
                }
            }
        }
        // dropping the pipe signals end of data to the session
        let _ = handle.block_on(pipe.shutdown());
    });
}

/// Hand every chunk written by the session to a blocking device write.
async fn write_pump(mut device: Box<dyn SerialPort>, mut pipe: ReadHalf<DuplexStream>) {
    let mut buf = vec![0u8; PIPE_CAPACITY];
    loop {
        let n = match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let chunk = buf[..n].to_vec();
        let written = tokio::task::spawn_blocking(move || {
            let result = device.write_all(&chunk).and_then(|()| device.flush());
            (device, result)
        })
        .await;
        match written {
            Ok((returned, Ok(()))) => device = returned,
            Ok((_, Err(err))) => {
                error!(error = %err, "serial device write failed");
                break;
            }
            Err(err) => {
                error!(error = %err, "serial write task failed");
                break;
            }
        }
    }
    debug!("serial write pump stopped");
}
