use super::messages::{BusEnvelope, MAX_FRAME_BYTES};
use crate::error::BusError;
use crate::{info, warn};
use prost::Message;
use std::io::{Cursor, ErrorKind};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot};

const FANOUT_CAPACITY: usize = 64;

/// The coordination hub. Every frame received from any client is fanned out
/// to every connected client; routing by target is the clients' concern.
/// Run one relay per experiment, anywhere all runners can reach.
pub struct BusRelay {
    local_addr: SocketAddr,
    close: Option<oneshot::Sender<()>>,
}

impl BusRelay {
    /// Binds the relay and starts accepting clients. Use port `0` to let
    /// the OS pick (the chosen address is available via
    /// [`BusRelay::local_addr`]).
    pub async fn bind(addr: &str) -> Result<Self, BusError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Bus relay listening on {local_addr}");
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let (fanout_tx, _) = broadcast::channel::<Vec<u8>>(FANOUT_CAPACITY);

        tokio::spawn(async move {
            loop {
                let accept = tokio::select! {
                    accept = listener.accept() => accept,
                    _ = &mut close_rx => break,
                };
                let Ok((socket, peer)) = accept else { break };
                info!("Bus client connected from {peer}");
                let fanout_tx = fanout_tx.clone();
                let fanout_rx = fanout_tx.subscribe();
                tokio::spawn(async move {
                    let (read_half, write_half) = socket.into_split();
                    let result = tokio::select! {
                        res = Self::pump_in(read_half, &fanout_tx) => res,
                        res = Self::pump_out(write_half, fanout_rx) => res,
                    };
                    match result {
                        Err(e) if e.kind() == ErrorKind::UnexpectedEof
                            || e.kind() == ErrorKind::ConnectionReset
                            || e.kind() == ErrorKind::ConnectionAborted => {}
                        Err(e) => warn!("Bus client {peer} dropped: {e}"),
                        Ok(()) => {}
                    }
                    info!("Bus client {peer} disconnected");
                });
            }
        });
        Ok(Self { local_addr, close: Some(close_tx) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn pump_in(
        mut socket: OwnedReadHalf,
        fanout_tx: &broadcast::Sender<Vec<u8>>,
    ) -> Result<(), std::io::Error> {
        loop {
            let length = socket.read_u32().await?;
            if length > MAX_FRAME_BYTES {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("frame of {length} bytes exceeds limit"),
                ));
            }
            let mut buffer = vec![0u8; length as usize];
            socket.read_exact(&mut buffer).await?;
            // Validate before fanning out so one bad client cannot poison
            // every other one.
            if BusEnvelope::decode(&mut Cursor::new(&buffer)).is_err() {
                warn!("Dropping undecodable bus frame of {length} bytes");
                continue;
            }
            let _ = fanout_tx.send(buffer);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn pump_out(
        mut socket: OwnedWriteHalf,
        mut fanout_rx: broadcast::Receiver<Vec<u8>>,
    ) -> Result<(), std::io::Error> {
        loop {
            match fanout_rx.recv().await {
                Ok(buffer) => {
                    socket.write_u32(buffer.len() as u32).await?;
                    socket.write_all(&buffer).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Bus client fell behind, {skipped} frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Stops accepting clients. Existing connections drain and close on
    /// their own.
    pub fn close(&mut self) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for BusRelay {
    fn drop(&mut self) {
        self.close();
    }
}
