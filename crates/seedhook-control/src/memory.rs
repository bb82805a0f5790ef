//! Caller address space seam.

use std::collections::BTreeMap;

use crate::error::ControlError;

/// Destination for data copied out of the engine into caller-supplied
/// buffers.
pub trait UserMemory {
    /// Copy `bytes` to the caller address `addr`.
    ///
    /// # Errors
    ///
    /// [`ControlError::Fault`] if the range is not writable.
    fn copy_out(&mut self, addr: u64, bytes: &[u8]) -> Result<(), ControlError>;
}

/// In-process address space made of explicitly mapped regions.
#[derive(Debug, Default, Clone)]
pub struct VecUserMemory {
    regions: BTreeMap<u64, Vec<u8>>,
    copies: usize,
}

impl VecUserMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `len` zeroed bytes at `base`, replacing any region at that base.
    pub fn map(&mut self, base: u64, len: usize) {
        self.regions.insert(base, vec![0; len]);
    }

    #[must_use]
    pub fn region(&self, base: u64) -> Option<&[u8]> {
        self.regions.get(&base).map(Vec::as_slice)
    }

    /// Number of `copy_out` calls attempted, successful or not.
    #[must_use]
    pub fn copies(&self) -> usize {
        self.copies
    }
}

impl UserMemory for VecUserMemory {
    fn copy_out(&mut self, addr: u64, bytes: &[u8]) -> Result<(), ControlError> {
        self.copies += 1;
        let fault = ControlError::Fault { addr };
        let (base, region) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .ok_or(fault)?;
        let offset = usize::try_from(addr - *base).map_err(|_| fault)?;
        let end = offset.checked_add(bytes.len()).ok_or(fault)?;
        let dest = region.get_mut(offset..end).ok_or(fault)?;
        dest.copy_from_slice(bytes);
        Ok(())
    }
}
