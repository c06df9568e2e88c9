//! Host/device memory transfer capability.
//!
//! The engine only ever touches host memory: tensors living on an
//! accelerator are staged through a host buffer for the duration of one
//! reduction call. `DeviceTransfer` is the seam a platform backend
//! implements; the engine logic is platform-agnostic given it.

use crate::error::Result;

/// Blocking copies between caller-owned tensor memory and host staging
/// buffers.
///
/// Implementations may use asynchronous device streams internally as long
/// as the destination is fully coherent when the call returns.
pub trait DeviceTransfer: Send + Sync {
    /// Copy `dst.len()` bytes from tensor memory at `src` into `dst`.
    ///
    /// For host-resident tensors this is a plain memcpy; for device
    /// tensors, a device-to-host transfer.
    ///
    /// # Safety
    /// `src` must be valid for at least `dst.len()` bytes in the
    /// implementation's memory space.
    unsafe fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()>;

    /// Copy `src.len()` bytes from `src` into tensor memory at `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for at least `src.len()` bytes in the
    /// implementation's memory space.
    unsafe fn copy_to_device(&self, src: &[u8], dst: u64) -> Result<()>;
}

/// Built-in transfer for tensors already resident in host memory.
#[derive(Debug, Default)]
pub struct HostTransfer;

impl HostTransfer {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceTransfer for HostTransfer {
    unsafe fn copy_to_host(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    unsafe fn copy_to_device(&self, src: &[u8], dst: u64) -> Result<()> {
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }
}
