//! File transfer over one connection, both directions at once.
//!
//! Each side streams its input file in [`CHUNK_SIZE`] pieces followed by an
//! empty END, and writes whatever the peer sends to its output file until the
//! peer's END.  Payloads that arrive while this side is still sending are
//! written out between chunks, so the receive queue stays short.

use std::path::Path;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use crate::connection::{Connection, Received};
use crate::frame::MAX_PAYLOAD;

pub const CHUNK_SIZE: usize = MAX_PAYLOAD;

/// Byte totals of one completed transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub sent: u64,
    pub received: u64,
}

/// Send `input` to the peer, store the peer's stream in `output`, then close.
///
/// A partially written `output` is left in place on failure.
pub async fn run<S>(
    conn: &mut Connection<S>,
    input: &Path,
    output: &Path,
) -> anyhow::Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = File::open(input)
        .await
        .with_context(|| format!("opening {}", input.display()))?;
    let file = File::create(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    let report = transfer(conn, &mut reader, &mut writer).await?;
    writer.flush().await.context("flushing output")?;
    conn.close().await?;
    log::info!(
        "[xfer] sent {} bytes, received {} bytes",
        report.sent,
        report.received
    );
    Ok(report)
}

/// Pump `reader` into the connection and the connection into `writer` until
/// both directions have reached END.  Does not close the connection.
pub async fn transfer<S, R, W>(
    conn: &mut Connection<S>,
    reader: &mut R,
    writer: &mut W,
) -> anyhow::Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut report = TransferReport::default();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut peer_done = false;

    loop {
        let n = read_chunk(reader, &mut chunk)
            .await
            .context("reading input")?;
        if n == 0 {
            break;
        }
        conn.send(&chunk[..n]).await?;
        report.sent += n as u64;
        peer_done |= drain_ready(conn, writer, &mut report).await?;
    }
    conn.send_end(&[]).await?;
    conn.flush().await?;
    log::debug!("[xfer] input exhausted after {} bytes", report.sent);

    peer_done |= drain_ready(conn, writer, &mut report).await?;
    while !peer_done {
        match conn.receive().await? {
            Received::Data(payload) => {
                writer.write_all(&payload).await.context("writing output")?;
                report.received += payload.len() as u64;
            }
            Received::End => peer_done = true,
        }
    }
    Ok(report)
}

/// Write out everything already received; `true` once the peer's END is seen.
async fn drain_ready<S, W>(
    conn: &mut Connection<S>,
    writer: &mut W,
    report: &mut TransferReport,
) -> anyhow::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(item) = conn.try_receive() {
        match item {
            Received::Data(payload) => {
                writer.write_all(&payload).await.context("writing output")?;
                report.received += payload.len() as u64;
            }
            Received::End => return Ok(true),
        }
    }
    Ok(false)
}

/// Fill `buf` as far as the reader allows; short only at end of input.
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
