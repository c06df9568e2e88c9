//! Full-mesh peer connection establishment.
//!
//! Rank discovery and process launch are the caller's problem; the mesh
//! only needs each rank's listen address. Every pair (i, j) with i < j is
//! connected once: j dials i's listener and identifies itself with a
//! 4-byte rank hello, so concurrent dials to one listener can't be
//! confused with each other.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::AdasumConfig;
use crate::error::{AdasumError, Result};
use crate::transport::PeerConnection;
use crate::types::Rank;

/// The process-wide set of peer connections, one per remote rank.
///
/// Communicators borrow (`Arc`-share) subsets of the mesh; the mesh
/// itself is plain data once formed.
pub struct Mesh {
    rank: Rank,
    world_size: u32,
    peers: HashMap<Rank, Arc<PeerConnection>>,
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size)
            .finish()
    }
}

impl Mesh {
    /// This worker's world rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total worker count across the job.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub(crate) fn peer(&self, rank: Rank) -> Result<&Arc<PeerConnection>> {
        self.peers.get(&rank).ok_or(AdasumError::InvalidRank {
            rank,
            group_size: self.world_size,
        })
    }

    /// Form the mesh for one rank: dial every lower rank, accept every
    /// higher one.
    ///
    /// `peer_addrs[i]` must be rank `i`'s listen address; entries at and
    /// above `rank` are ignored. All ranks must call this concurrently.
    pub async fn form(
        rank: Rank,
        world_size: u32,
        listener: TcpListener,
        peer_addrs: &[SocketAddr],
        config: &AdasumConfig,
    ) -> Result<Mesh> {
        if world_size == 0 || rank >= world_size {
            return Err(AdasumError::InvalidRank {
                rank,
                group_size: world_size,
            });
        }

        let formation = async {
            let mut peers = HashMap::new();

            // Dial lower ranks, announcing our own rank first.
            for lower in 0..rank {
                let addr = peer_addrs[lower as usize];
                let mut stream = TcpStream::connect(addr).await.map_err(|e| {
                    AdasumError::ConnectionFailed {
                        rank: lower,
                        reason: e.to_string(),
                    }
                })?;
                stream
                    .set_nodelay(true)
                    .map_err(|e| AdasumError::transport(format!("set_nodelay: {e}")))?;
                stream.write_all(&rank.to_le_bytes()).await.map_err(|e| {
                    AdasumError::ConnectionFailed {
                        rank: lower,
                        reason: format!("rank hello: {e}"),
                    }
                })?;
                peers.insert(lower, Arc::new(PeerConnection::from_stream(lower, stream)));
            }

            // Accept higher ranks; the hello tells us who dialed.
            for _ in (rank + 1)..world_size {
                let (mut stream, _) = listener
                    .accept()
                    .await
                    .map_err(|e| AdasumError::transport(format!("mesh accept: {e}")))?;
                stream
                    .set_nodelay(true)
                    .map_err(|e| AdasumError::transport(format!("set_nodelay: {e}")))?;
                let mut hello = [0u8; 4];
                stream
                    .read_exact(&mut hello)
                    .await
                    .map_err(|e| AdasumError::transport(format!("rank hello: {e}")))?;
                let peer = Rank::from_le_bytes(hello);
                if peer <= rank || peer >= world_size {
                    return Err(AdasumError::InvalidRank {
                        rank: peer,
                        group_size: world_size,
                    });
                }
                peers.insert(peer, Arc::new(PeerConnection::from_stream(peer, stream)));
            }

            tracing::debug!(rank, world_size, "mesh formed");
            Ok(Mesh {
                rank,
                world_size,
                peers,
            })
        };

        match tokio::time::timeout(config.bootstrap_timeout, formation).await {
            Ok(result) => result,
            Err(_) => Err(AdasumError::transport(format!(
                "mesh formation timed out after {}s",
                config.bootstrap_timeout.as_secs()
            ))),
        }
    }

    /// Bootstrap a whole mesh inside one process over loopback TCP.
    ///
    /// This is a convenience for tests and simple deployments where all
    /// ranks run in the same process (each as a tokio task). Returns one
    /// mesh per rank, sorted by rank.
    pub async fn bootstrap_local(world_size: u32) -> Result<Vec<Mesh>> {
        let config = AdasumConfig::default();

        let mut listeners = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..world_size {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .map_err(|e| AdasumError::transport(format!("mesh bind: {e}")))?;
            addrs.push(
                listener
                    .local_addr()
                    .map_err(|e| AdasumError::transport(format!("mesh local_addr: {e}")))?,
            );
            listeners.push(listener);
        }

        let mut handles = Vec::new();
        for (rank, listener) in listeners.into_iter().enumerate() {
            let addrs = addrs.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                Mesh::form(rank as Rank, world_size, listener, &addrs, &config).await
            }));
        }

        let mut meshes = Vec::new();
        for handle in handles {
            meshes.push(handle.await.map_err(|e| {
                AdasumError::transport_with_source("mesh formation task panicked", e)
            })??);
        }
        meshes.sort_by_key(|m| m.rank());
        Ok(meshes)
    }
}
