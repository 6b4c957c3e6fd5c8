use super::leg::Leg;
use super::Relay;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// 单次读取的块大小
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// 暂存缓冲区能容纳的块数（至少一块）
pub(crate) fn hold_capacity(hold_buffer_bytes: usize) -> usize {
    (hold_buffer_bytes / READ_CHUNK_SIZE).max(1)
}

/// 一个方向的转发
///
/// 读端把数据块送入有界通道，写端按暂停状态和速率上限写入 `to` 所在一侧。
/// 写端停滞时通道被填满，读端随之停止读取，形成背压。
/// 读端结束后若 `to` 处于暂停状态，立即停止 Relay 并丢弃暂存数据。
pub(crate) async fn forward<R, W>(relay: &Relay, reader: R, writer: W, to: &Leg, hold_chunks: usize)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::channel(hold_chunks);
    let drain = drain_writes(relay, writer, rx, to);
    tokio::pin!(drain);

    tokio::select! {
        _ = &mut drain => return,
        _ = pump_reads(relay, reader, tx, to) => {}
    }

    tokio::select! {
        biased;
        _ = &mut drain => {}
        _ = to.wait_paused() => {
            relay.finish(format_args!(
                "{} side closed while {} direction paused",
                to.side().opposite(),
                to.side().direction()
            ));
        }
    }
}

async fn pump_reads<R>(relay: &Relay, mut reader: R, tx: mpsc::Sender<Bytes>, to: &Leg)
where
    R: AsyncRead + Unpin,
{
    let from = to.side().opposite();
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("Relay '{}': {} side reached end of stream", relay.name(), from);
                // drop(tx) 通知写端排空后结束
                return;
            }
            Ok(_) => {
                if tx.send(buf.split().freeze()).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                relay.finish(format_args!("read from {} side failed: {}", from, e));
                return;
            }
        }
    }
}

async fn drain_writes<W>(relay: &Relay, mut writer: W, mut rx: mpsc::Receiver<Bytes>, to: &Leg)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        let mut rest = &chunk[..];
        while !rest.is_empty() {
            let n = loop {
                to.wait_resumed().await;
                let granted = to.limiter().acquire(rest.len()).await;
                if !to.is_paused() {
                    break granted;
                }
            };

            let written = async {
                writer.write_all(&rest[..n]).await?;
                writer.flush().await
            };
            if let Err(e) = written.await {
                relay.finish(format_args!("write to {} side failed: {}", to.side(), e));
                return;
            }
            if relay.is_stopped() {
                return;
            }
            to.record(n);
            rest = &rest[n..];
        }
    }

    let _ = writer.shutdown().await;
    relay.finish(format_args!("{} side closed", to.side().opposite()));
}
