//! Worker-group topology: an explicit, immutable context resolving named
//! groups to communicator handles.
//!
//! There is no process-wide singleton. A context is constructed once from
//! the job's rank layout plus a formed mesh, passed by reference into
//! every reduction call, and rebuilt from scratch between logical
//! training runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::communicator::Communicator;
use crate::config::AdasumConfig;
use crate::device::{DeviceTransfer, HostTransfer};
use crate::error::{AdasumError, Result};
use crate::transport::Mesh;
use crate::types::{GroupType, Rank};

const GLOBAL_COMM_ID: u32 = 1;
const NODE_LOCAL_COMM_ID: u32 = 2;

/// The job's rank layout from this worker's perspective.
///
/// Ranks are assumed node-contiguous: node 0 holds world ranks
/// `0..local_size`, node 1 the next `local_size`, and so on.
#[derive(Debug, Clone, Copy)]
pub struct DistributedConfig {
    pub world_rank: Rank,
    pub world_size: u32,
    pub local_rank: Rank,
    pub local_size: u32,
}

/// One resolved worker group: this worker's rank and size within it, plus
/// the communicator handle scoping transport to its members.
pub struct WorkerGroup {
    group_type: GroupType,
    rank: Rank,
    size: u32,
    comm: Arc<Communicator>,
}

impl WorkerGroup {
    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.comm
    }
}

/// Process-lifetime topology handle: group resolution plus the ambient
/// config and device-transfer capability shared by every reduction call.
///
/// Read-only after construction; safe for concurrent reads from multiple
/// calls.
pub struct DistributedContext {
    dist: DistributedConfig,
    node_index: u32,
    num_nodes: u32,
    groups: HashMap<GroupType, WorkerGroup>,
    transfer: Arc<dyn DeviceTransfer>,
}

impl fmt::Debug for DistributedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedContext")
            .field("dist", &self.dist)
            .field("node_index", &self.node_index)
            .field("num_nodes", &self.num_nodes)
            .finish()
    }
}

impl DistributedContext {
    /// Build a context for host-resident tensors.
    pub fn new(dist: DistributedConfig, mesh: &Mesh, config: AdasumConfig) -> Result<Self> {
        Self::with_transfer(dist, mesh, config, Arc::new(HostTransfer::new()))
    }

    /// Build a context with a custom device-transfer capability.
    pub fn with_transfer(
        dist: DistributedConfig,
        mesh: &Mesh,
        config: AdasumConfig,
        transfer: Arc<dyn DeviceTransfer>,
    ) -> Result<Self> {
        Self::validate(&dist, mesh)?;

        let config = Arc::new(config);
        let node_index = dist.world_rank / dist.local_size;
        let num_nodes = dist.world_size / dist.local_size;

        let global_members: Vec<Rank> = (0..dist.world_size).collect();
        let local_start = node_index * dist.local_size;
        let local_members: Vec<Rank> = (local_start..local_start + dist.local_size).collect();

        let mut groups = HashMap::new();
        groups.insert(
            GroupType::Global,
            WorkerGroup {
                group_type: GroupType::Global,
                rank: dist.world_rank,
                size: dist.world_size,
                comm: Arc::new(Communicator::from_mesh(
                    mesh,
                    &global_members,
                    GLOBAL_COMM_ID,
                    Arc::clone(&config),
                )?),
            },
        );
        groups.insert(
            GroupType::NodeLocal,
            WorkerGroup {
                group_type: GroupType::NodeLocal,
                rank: dist.local_rank,
                size: dist.local_size,
                comm: Arc::new(Communicator::from_mesh(
                    mesh,
                    &local_members,
                    NODE_LOCAL_COMM_ID,
                    Arc::clone(&config),
                )?),
            },
        );

        Ok(Self {
            dist,
            node_index,
            num_nodes,
            groups,
            transfer,
        })
    }

    fn validate(dist: &DistributedConfig, mesh: &Mesh) -> Result<()> {
        let fail = |reason: String| Err(AdasumError::InvalidConfig { reason });

        if dist.world_size == 0 || dist.local_size == 0 {
            return fail("world and local sizes must be non-zero".into());
        }
        if dist.world_size % dist.local_size != 0 {
            return fail(format!(
                "world size {} is not a multiple of local size {}",
                dist.world_size, dist.local_size
            ));
        }
        if dist.world_rank >= dist.world_size {
            return fail(format!(
                "world rank {} out of range for world size {}",
                dist.world_rank, dist.world_size
            ));
        }
        if dist.local_rank >= dist.local_size {
            return fail(format!(
                "local rank {} out of range for local size {}",
                dist.local_rank, dist.local_size
            ));
        }
        if dist.local_rank != dist.world_rank % dist.local_size {
            return fail(format!(
                "local rank {} inconsistent with world rank {} and local size {}",
                dist.local_rank, dist.world_rank, dist.local_size
            ));
        }
        if mesh.rank() != dist.world_rank || mesh.world_size() != dist.world_size {
            return fail(format!(
                "mesh is rank {}/{} but config says rank {}/{}",
                mesh.rank(),
                mesh.world_size(),
                dist.world_rank,
                dist.world_size
            ));
        }
        Ok(())
    }

    /// Resolve a group, failing with a configuration error if it is not
    /// registered in this context.
    pub fn group(&self, group: GroupType) -> Result<&WorkerGroup> {
        self.groups
            .get(&group)
            .ok_or(AdasumError::UnknownGroup { group })
    }

    /// This worker's rank within `group`.
    pub fn rank(&self, group: GroupType) -> Result<Rank> {
        Ok(self.group(group)?.rank())
    }

    /// Member count of `group`.
    pub fn size(&self, group: GroupType) -> Result<u32> {
        Ok(self.group(group)?.size())
    }

    /// The communicator handle for `group`.
    pub fn communicator(&self, group: GroupType) -> Result<&Arc<Communicator>> {
        Ok(self.group(group)?.communicator())
    }

    /// Index of this worker's node among all nodes.
    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    /// Total node count.
    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }

    pub fn dist_config(&self) -> &DistributedConfig {
        &self.dist
    }

    pub(crate) fn transfer(&self) -> Arc<dyn DeviceTransfer> {
        Arc::clone(&self.transfer)
    }
}
