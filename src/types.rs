/// Rank of a participant within a communicator group (0-indexed).
pub type Rank = u32;

/// Element types understood by the staging and transport layers.
///
/// The reduction engine itself only operates on `F32` and `F16`; presenting
/// any other tag fails before a single byte goes over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F16 = 1,
    F64 = 2,
    BF16 = 3,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F64 => 8,
            DataType::F16 | DataType::BF16 => 2,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F16 => "f16",
            DataType::F64 => "f64",
            DataType::BF16 => "bf16",
        }
    }

    /// Decode a wire tag written by [`DataType::as_u8`].
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DataType::F32),
            1 => Some(DataType::F16),
            2 => Some(DataType::F64),
            3 => Some(DataType::BF16),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How per-worker vectors are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Element-wise sum across workers.
    Sum,
    /// Element-wise sum divided by group size.
    Average,
    /// Adaptive summation: weights each pair of vectors by their
    /// disagreement (dot product vs. norms) instead of adding blindly.
    Adasum,
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Average => f.write_str("average"),
            ReduceOp::Adasum => f.write_str("adasum"),
        }
    }
}

/// Which reduction topology the call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReduceAlgo {
    /// Single-level reduction over the requested group.
    #[default]
    None,
    /// Flat Adasum over the global group, staged through host memory.
    CpuReduction,
    /// Node-local sum first, then Adasum across nodes only.
    GpuHierarchical,
}

impl std::fmt::Display for ReduceAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceAlgo::None => f.write_str("none"),
            ReduceAlgo::CpuReduction => f.write_str("cpu_reduction"),
            ReduceAlgo::GpuHierarchical => f.write_str("gpu_hierarchical"),
        }
    }
}

/// Named worker groups resolvable through a [`crate::DistributedContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupType {
    /// Every worker in the job.
    Global,
    /// Workers sharing this worker's node.
    NodeLocal,
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupType::Global => f.write_str("global"),
            GroupType::NodeLocal => f.write_str("node_local"),
        }
    }
}
