//! One TCP connection to one peer, with tag-routed receive channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};

use crate::error::{AdasumError, Result};
use crate::types::Rank;

type TagReceiverMap = HashMap<u64, Arc<Mutex<mpsc::Receiver<Vec<u8>>>>>;

/// Shared state between the recv loop and the connection.
///
/// When a frame arrives before `recv` has been called for its tag, the
/// payload is buffered in `pending`. When a receiver registers, any
/// pending payloads are flushed into the new channel first.
struct RecvState {
    senders: HashMap<u64, mpsc::Sender<Vec<u8>>>,
    pending: HashMap<u64, Vec<Vec<u8>>>,
}

/// Maximum frame size (4 GiB). A frame larger than this indicates a
/// corrupted length header, and the connection is dropped.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024 * 1024;

/// A bidirectional framed channel to a single peer.
///
/// Wire format: `[tag: u64 LE][len: u64 LE][payload]`. Tags carry the
/// communicator id, the collective call sequence number, and the phase
/// within the call, so distinct groups and successive calls over the
/// same connection never observe each other's frames.
pub struct PeerConnection {
    peer: Rank,
    writer: Mutex<tokio::io::WriteHalf<TcpStream>>,
    /// Shared state with the recv loop (senders + pending buffer).
    state: Arc<Mutex<RecvState>>,
    /// Per-tag receivers, each independently lockable so concurrent tags
    /// don't serialize on one lock.
    receivers: Mutex<TagReceiverMap>,
    _recv_handle: tokio::task::JoinHandle<()>,
}

impl PeerConnection {
    /// Wrap an already-connected stream. Spawns the background recv loop.
    pub fn from_stream(peer: Rank, stream: TcpStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        let state = Arc::new(Mutex::new(RecvState {
            senders: HashMap::new(),
            pending: HashMap::new(),
        }));

        let recv_state = Arc::clone(&state);
        let recv_handle = tokio::spawn(async move {
            recv_loop(peer, reader, recv_state).await;
        });

        Self {
            peer,
            writer: Mutex::new(writer),
            state,
            receivers: Mutex::new(HashMap::new()),
            _recv_handle: recv_handle,
        }
    }

    /// The world rank on the other end of this connection.
    pub fn peer(&self) -> Rank {
        self.peer
    }

    /// Send one framed payload.
    pub async fn send(&self, tag: u64, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&tag.to_le_bytes())
            .await
            .map_err(|e| AdasumError::transport(format!("write tag to rank {}: {e}", self.peer)))?;
        writer
            .write_all(&(data.len() as u64).to_le_bytes())
            .await
            .map_err(|e| AdasumError::transport(format!("write len to rank {}: {e}", self.peer)))?;
        writer.write_all(data).await.map_err(|e| {
            AdasumError::transport(format!("write payload to rank {}: {e}", self.peer))
        })?;
        writer
            .flush()
            .await
            .map_err(|e| AdasumError::transport(format!("flush to rank {}: {e}", self.peer)))?;
        Ok(())
    }

    /// Receive the next payload carrying `tag`.
    pub async fn recv(&self, tag: u64) -> Result<Vec<u8>> {
        let rx = self.tag_receiver(tag).await;
        let payload = rx.lock().await.recv().await;
        payload.ok_or(AdasumError::PeerDisconnected { rank: self.peer })
    }

    /// Get or create the receiver channel for a tag. Pending payloads that
    /// arrived before registration are flushed in arrival order.
    async fn tag_receiver(&self, tag: u64) -> Arc<Mutex<mpsc::Receiver<Vec<u8>>>> {
        // Fast path: already registered.
        {
            let map = self.receivers.lock().await;
            if let Some(rx) = map.get(&tag) {
                return Arc::clone(rx);
            }
        }
        // Slow path: create channel, register sender, flush pending
        // outside the state lock.
        let (tx, rx) = mpsc::channel(64);
        let flush_tx = tx.clone();
        let pending = {
            let mut st = self.state.lock().await;
            let pending = st.pending.remove(&tag);
            st.senders.insert(tag, tx);
            pending
        };
        if let Some(payloads) = pending {
            for payload in payloads {
                let _ = flush_tx.send(payload).await;
            }
        }
        let rx_arc = Arc::new(Mutex::new(rx));
        self.receivers.lock().await.insert(tag, Arc::clone(&rx_arc));
        rx_arc
    }
}

/// Background loop: read frames and route them to per-tag channels.
async fn recv_loop(
    peer: Rank,
    mut reader: tokio::io::ReadHalf<TcpStream>,
    state: Arc<Mutex<RecvState>>,
) {
    let mut tag_buf = [0u8; 8];
    let mut len_buf = [0u8; 8];
    loop {
        if let Err(e) = reader.read_exact(&mut tag_buf).await {
            tracing::debug!(peer, "recv loop ended: {e}");
            return;
        }
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            tracing::debug!(peer, "recv loop ended reading len: {e}");
            return;
        }
        let tag = u64::from_le_bytes(tag_buf);
        let len = u64::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            tracing::warn!(peer, len, "frame too large, closing connection");
            return;
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::debug!(peer, "recv loop ended reading payload: {e}");
            return;
        }

        // Clone the sender outside the lock so the channel send doesn't
        // hold it across an await.
        let tx = {
            let st = state.lock().await;
            st.senders.get(&tag).cloned()
        };
        if let Some(tx) = tx {
            if tx.send(payload).await.is_err() {
                return;
            }
        } else {
            let mut st = state.lock().await;
            st.pending.entry(tag).or_default().push(payload);
        }
    }
}
