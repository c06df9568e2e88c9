//! Group-scoped view over the peer mesh: the communicator handle the
//! reduction engine exchanges frames through.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AdasumConfig;
use crate::error::{AdasumError, Result};
use crate::transport::{Mesh, PeerConnection};
use crate::types::Rank;

/// Tag space for one collective call on one communicator.
///
/// Wire tag layout: `[comm_id: 32][call seq: 24][phase: 8]`. Calls on a
/// group are serialized by the caller, so the per-communicator sequence
/// counter advances in lockstep on every member and the same call gets
/// the same tag space everywhere.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallTag(u64);

impl CallTag {
    pub(crate) fn with_phase(self, phase: u8) -> u64 {
        self.0 | phase as u64
    }
}

/// A communicator: this worker's rank and peers within one worker group.
///
/// Read-only after construction and safe to share across tasks; the
/// underlying connections are shared with other communicators over the
/// same mesh, with `comm_id` keeping their traffic apart.
pub struct Communicator {
    rank: Rank,
    size: u32,
    comm_id: u32,
    peers: HashMap<Rank, Arc<PeerConnection>>,
    call_seq: AtomicU64,
    config: Arc<AdasumConfig>,
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("comm_id", &self.comm_id)
            .finish()
    }
}

impl Communicator {
    /// Build a communicator over a subset of the mesh.
    ///
    /// `members` lists the world ranks in the group, sorted ascending;
    /// group ranks are positions in that list. The mesh's own rank must
    /// be a member.
    pub(crate) fn from_mesh(
        mesh: &Mesh,
        members: &[Rank],
        comm_id: u32,
        config: Arc<AdasumConfig>,
    ) -> Result<Self> {
        let rank = members
            .iter()
            .position(|&r| r == mesh.rank())
            .ok_or_else(|| AdasumError::InvalidConfig {
                reason: format!(
                    "world rank {} is not a member of communicator {comm_id}",
                    mesh.rank()
                ),
            })? as Rank;

        let mut peers = HashMap::new();
        for (group_rank, &world_rank) in members.iter().enumerate() {
            if world_rank != mesh.rank() {
                peers.insert(group_rank as Rank, Arc::clone(mesh.peer(world_rank)?));
            }
        }

        Ok(Self {
            rank,
            size: members.len() as u32,
            comm_id,
            peers,
            call_seq: AtomicU64::new(0),
            config,
        })
    }

    /// This worker's rank within the group.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of workers in the group.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub(crate) fn config(&self) -> &AdasumConfig {
        &self.config
    }

    /// Claim the tag space for the next collective call on this group.
    pub(crate) fn next_call(&self) -> CallTag {
        let seq = self.call_seq.fetch_add(1, Ordering::Relaxed);
        CallTag(((self.comm_id as u64) << 32) | ((seq & 0xFF_FFFF) << 8))
    }

    fn peer(&self, rank: Rank) -> Result<&Arc<PeerConnection>> {
        self.peers.get(&rank).ok_or(AdasumError::InvalidRank {
            rank,
            group_size: self.size,
        })
    }

    /// Send to a group member, bounded by the collective timeout.
    pub(crate) async fn send(
        &self,
        dest: Rank,
        tag: CallTag,
        phase: u8,
        data: &[u8],
        operation: &'static str,
    ) -> Result<()> {
        let peer = self.peer(dest)?;
        let timeout = self.config.collective_timeout;
        match tokio::time::timeout(timeout, peer.send(tag.with_phase(phase), data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AdasumError::CollectiveFailed {
                operation,
                rank: dest,
                reason: e.to_string(),
            }),
            Err(_) => Err(AdasumError::CollectiveFailed {
                operation,
                rank: dest,
                reason: format!("send timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    /// Receive from a group member, bounded by the collective timeout.
    pub(crate) async fn recv(
        &self,
        src: Rank,
        tag: CallTag,
        phase: u8,
        operation: &'static str,
    ) -> Result<Vec<u8>> {
        let peer = self.peer(src)?;
        let timeout = self.config.collective_timeout;
        match tokio::time::timeout(timeout, peer.recv(tag.with_phase(phase))).await {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(e)) => Err(AdasumError::CollectiveFailed {
                operation,
                rank: src,
                reason: e.to_string(),
            }),
            Err(_) => Err(AdasumError::CollectiveFailed {
                operation,
                rank: src,
                reason: format!("recv timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    /// Full-duplex exchange with a round partner: send our buffer and
    /// receive theirs concurrently.
    pub(crate) async fn exchange(
        &self,
        partner: Rank,
        tag: CallTag,
        phase: u8,
        data: &[u8],
        operation: &'static str,
    ) -> Result<Vec<u8>> {
        let (_, received) = tokio::try_join!(
            self.send(partner, tag, phase, data, operation),
            self.recv(partner, tag, phase, operation),
        )?;
        Ok(received)
    }
}
