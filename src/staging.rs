//! Packing a list of tensors into one contiguous host staging buffer, and
//! unpacking the combined result back out.
//!
//! Fusing tensors into a single buffer lets one reduction call exchange all
//! gradients with a round's partner in a single frame instead of one per
//! tensor.

use std::sync::Arc;

use crate::device::DeviceTransfer;
use crate::error::{AdasumError, Result};
use crate::types::DataType;

/// One caller-owned tensor: a raw pointer plus its element count.
///
/// The pointer lives in whatever memory space the stager's
/// [`DeviceTransfer`] understands (host for [`crate::HostTransfer`]).
#[derive(Debug, Clone, Copy)]
pub struct TensorRegion {
    pub ptr: u64,
    pub elem_count: usize,
}

impl TensorRegion {
    pub fn new(ptr: u64, elem_count: usize) -> Self {
        Self { ptr, elem_count }
    }
}

/// Placement of one tensor within the fused staging buffer.
///
/// Offsets are the exclusive prefix sum of byte sizes in input order;
/// the descriptor list is fixed for the lifetime of one reduction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub elem_count: usize,
    pub byte_size: usize,
    pub dtype: DataType,
    pub offset: usize,
}

impl TensorDescriptor {
    /// Byte range of this tensor within the fused buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.byte_size
    }
}

/// Host scratch memory holding the fused byte representation of all
/// tensors in one reduction call.
///
/// Allocated per call and dropped at call end; never cached or shared
/// across calls.
pub struct StagingBuffer {
    bytes: Vec<u8>,
    descriptors: Vec<TensorDescriptor>,
}

impl StagingBuffer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn descriptors(&self) -> &[TensorDescriptor] {
        &self.descriptors
    }

    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// Copies tensors in and out of per-call staging buffers through an
/// injected [`DeviceTransfer`].
pub struct BufferStager {
    transfer: Arc<dyn DeviceTransfer>,
}

impl BufferStager {
    pub fn new(transfer: Arc<dyn DeviceTransfer>) -> Self {
        Self { transfer }
    }

    /// Lay out `regions` back to back and produce their descriptors.
    pub fn describe(regions: &[TensorRegion], dtype: DataType) -> Vec<TensorDescriptor> {
        let elem_size = dtype.size_in_bytes();
        let mut offset = 0;
        regions
            .iter()
            .map(|r| {
                let byte_size = r.elem_count * elem_size;
                let desc = TensorDescriptor {
                    elem_count: r.elem_count,
                    byte_size,
                    dtype,
                    offset,
                };
                offset += byte_size;
                desc
            })
            .collect()
    }

    /// Copy every input tensor into a freshly allocated staging buffer.
    ///
    /// All transfers are synchronous; the buffer is fully populated when
    /// this returns.
    ///
    /// # Safety
    /// Each region's `ptr` must be valid for `elem_count` elements of
    /// `dtype` in the transfer's memory space.
    pub unsafe fn pack(&self, regions: &[TensorRegion], dtype: DataType) -> Result<StagingBuffer> {
        let descriptors = Self::describe(regions, dtype);
        let total: usize = descriptors.iter().map(|d| d.byte_size).sum();
        let mut bytes = vec![0u8; total];

        for (region, desc) in regions.iter().zip(&descriptors) {
            unsafe {
                self.transfer
                    .copy_to_host(region.ptr, &mut bytes[desc.range()])?;
            }
        }

        Ok(StagingBuffer { bytes, descriptors })
    }

    /// Copy each staged tensor back out to its corresponding output region.
    ///
    /// Output shapes are taken from the descriptors, so each output region
    /// must have the same element count as the matching input.
    ///
    /// # Safety
    /// Each output's `ptr` must be valid for `elem_count` elements of the
    /// staged dtype in the transfer's memory space.
    pub unsafe fn unpack(&self, staged: &StagingBuffer, outputs: &[TensorRegion]) -> Result<()> {
        if outputs.len() != staged.descriptors.len() {
            return Err(AdasumError::TensorCountMismatch {
                inputs: staged.descriptors.len(),
                outputs: outputs.len(),
            });
        }

        for (region, desc) in outputs.iter().zip(&staged.descriptors) {
            let expected = desc.byte_size;
            let actual = region.elem_count * desc.dtype.size_in_bytes();
            if actual != expected {
                return Err(AdasumError::BufferSizeMismatch { expected, actual });
            }
            unsafe {
                self.transfer
                    .copy_to_device(&staged.bytes[desc.range()], region.ptr)?;
            }
        }

        Ok(())
    }
}
