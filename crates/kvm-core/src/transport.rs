//! Async serial I/O for device connections
//!
//! Each driver owns exactly one serial connection, split into a read task and
//! a write task. The read task reassembles the byte stream into CRLF lines
//! and forwards them to the driver's processing task; the write task drains
//! an outbound command queue, appending the terminator. Both tasks report
//! failures as [`TransportEvent`]s so all driver state stays with the
//! processing task.
//!
//! The tasks are generic over the I/O type: real connections use
//! `tokio_serial::SerialStream`, tests use `tokio::io::duplex()` wired to a
//! virtual device.

use std::io::ErrorKind;
use std::time::Duration;

use kvm_protocol::LineCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use crate::error::DriverError;

/// Events forwarded from the I/O tasks to a driver's processing task
#[derive(Debug)]
pub enum TransportEvent {
    /// One complete reassembled line, terminator stripped
    Line(String),
    /// A queued command could not be written
    WriteFailed(String),
    /// The read path failed or reached EOF; fatal to the transport
    Closed(String),
}

/// Open a serial connection to a device
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream, DriverError> {
    tokio_serial::new(path, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|source| DriverError::Connection {
            path: path.to_string(),
            source,
        })
}

/// Spawn the read/write task pair for a connection
pub(crate) fn spawn_io_tasks<T>(
    io: T,
    event_tx: mpsc::Sender<TransportEvent>,
    write_rx: mpsc::Receiver<String>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    tokio::spawn(run_read_task(reader, event_tx.clone()));
    tokio::spawn(run_write_task(writer, write_rx, event_tx));
}

/// Read loop: bytes in, complete lines out
///
/// Every finished line from one read is forwarded before more bytes are
/// consumed; a partial trailing line stays buffered in the codec. Runs until
/// the connection dies or the processing task goes away.
async fn run_read_task<R>(mut reader: R, event_tx: mpsc::Sender<TransportEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = event_tx
                    .send(TransportEvent::Closed("connection closed".to_string()))
                    .await;
                break;
            }
            Ok(n) => {
                codec.push_bytes(&buf[..n]);
                while let Some(line) = codec.next_line() {
                    debug!(line = %line, "<== read line");
                    if event_tx.send(TransportEvent::Line(line)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                warn!("read error: {}", e);
                let _ = event_tx.send(TransportEvent::Closed(e.to_string())).await;
                break;
            }
        }
    }
}

/// Write loop: drains the outbound queue, one terminated command per send
async fn run_write_task<W>(
    mut writer: W,
    mut write_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<TransportEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = write_rx.recv().await {
        debug!(command = %command, "==> write command");
        let framed = format!("{command}\r\n");
        let result = async {
            writer.write_all(framed.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("error writing command {:?}: {}", command, e);
            let _ = event_tx
                .send(TransportEvent::WriteFailed(e.to_string()))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_task_reassembles_split_lines() {
        let (mut device, host) = tokio::io::duplex(64);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel::<String>(4);
        spawn_io_tasks(host, event_tx, write_rx);

        device.write_all(b"OUT01FR0").await.unwrap();
        device.write_all(b"2\r\nCH1\r\n").await.unwrap();

        let first = event_rx.recv().await.unwrap();
        assert!(matches!(first, TransportEvent::Line(ref l) if l == "OUT01FR02"));
        let second = event_rx.recv().await.unwrap();
        assert!(matches!(second, TransportEvent::Line(ref l) if l == "CH1"));
    }

    #[tokio::test]
    async fn test_write_task_appends_terminator() {
        let (mut device, host) = tokio::io::duplex(64);
        let (event_tx, _event_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(4);
        spawn_io_tasks(host, event_tx, write_rx);

        write_tx.send("STATUS".to_string()).await.unwrap();

        let mut buf = [0u8; 16];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"STATUS\r\n");
    }

    #[tokio::test]
    async fn test_dropped_connection_reports_closed() {
        let (device, host) = tokio::io::duplex(64);
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel::<String>(4);
        spawn_io_tasks(host, event_tx, write_rx);

        drop(device);

        let event = event_rx.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Closed(_)));
    }
}
