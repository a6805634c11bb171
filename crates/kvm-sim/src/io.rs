//! Async tasks serving virtual devices over a byte stream
//!
//! Wire a virtual device to one end of `tokio::io::duplex()` and hand the
//! other end to a driver: the driver cannot tell it from a serial port. The
//! device stays behind an `Arc<Mutex>` so tests can inspect and mutate it
//! while the task runs.

use std::io;
use std::sync::Arc;

use kvm_protocol::LineCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::{VirtualKvm, VirtualMatrix};

/// Serve a virtual matrix until the stream closes
pub async fn run_virtual_matrix<S>(
    mut stream: S,
    matrix: Arc<Mutex<VirtualMatrix>>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("virtual matrix serving");
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        codec.push_bytes(&buf[..n]);
        while let Some(line) = codec.next_line() {
            let replies = matrix.lock().await.process_command(&line);
            write_lines(&mut stream, &replies).await?;
        }
    }
    Ok(())
}

/// Serve a virtual KVM until the stream closes
///
/// Prints the boot banner first, exactly like the hardware does when it
/// powers up with the serial cable already attached.
pub async fn run_virtual_kvm<S>(mut stream: S, kvm: Arc<Mutex<VirtualKvm>>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("virtual kvm serving");
    let banner = kvm.lock().await.boot_banner();
    write_lines(&mut stream, &[banner]).await?;

    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        codec.push_bytes(&buf[..n]);
        while let Some(line) = codec.next_line() {
            let replies = kvm.lock().await.process_command(&line);
            write_lines(&mut stream, &replies).await?;
        }
    }
    Ok(())
}

async fn write_lines<S, L>(stream: &mut S, lines: &[L]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
    L: AsRef<str>,
{
    for line in lines {
        stream.write_all(line.as_ref().as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
    }
    stream.flush().await
}
