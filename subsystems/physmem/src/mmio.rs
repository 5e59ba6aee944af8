//! # MMIO Bus
//!
//! An ordered set of non-overlapping memory-mapped regions. Each region is
//! backed by a [`MmioHandler`] trait object supplied by the embedder;
//! concrete device models live in `rvcore-devices`, not here.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::PhysMemError;
use crate::ram::PhysMem;
use crate::{AccessKind, MMIO_ALIGNMENT};

/// Behavior a memory-mapped device exposes to the bus: read/write dispatch,
/// declared operand-size bounds, and `update`/`remove`/`reset` lifecycle
/// hooks. `reset` is called on each attached region in attach order.
pub trait MmioHandler: Send + Sync {
    /// Handle a read of `buf.len()` bytes at `offset` (already normalized
    /// to the region's origin and aligned to [`Self::min_op_size`]).
    /// Returns `false` on failure, which the bus surfaces as an access
    /// fault to the caller.
    fn read(&self, offset: u64, buf: &mut [u8]) -> bool;

    /// Handle a write of `buf.len()` bytes at `offset`.
    fn write(&self, offset: u64, buf: &[u8]) -> bool;

    /// Smallest access size this device accepts, in bytes. Must be a power
    /// of two.
    fn min_op_size(&self) -> usize {
        1
    }

    /// Largest access size this device accepts, in bytes. Must be a power
    /// of two and `>= min_op_size`.
    fn max_op_size(&self) -> usize {
        8
    }

    /// A short name used in log messages and device-tree `compatible`
    /// strings.
    fn type_name(&self) -> &'static str {
        "generic-mmio"
    }

    /// Called periodically (~100 Hz) from the machine's event thread.
    fn update(&self) {}

    /// Called when the machine resets, in attach order.
    fn reset(&self) {}

    /// Called at teardown, in reverse attach order.
    fn remove(&self) {}
}

/// A registered MMIO region: address range plus its handler.
pub struct MmioRegion {
    base: u64,
    size: u64,
    handler: Arc<dyn MmioHandler>,
}

impl MmioRegion {
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn MmioHandler> {
        &self.handler
    }
}

/// Read-only view of an attached region, handed back to callers that need
/// to enumerate the bus (e.g. device-tree emission) without touching the
/// handler.
#[derive(Debug, Clone, Copy)]
pub struct MmioRegionInfo {
    pub base: u64,
    pub size: u64,
    pub type_name: &'static str,
}

/// The ordered collection of MMIO regions attached to a machine.
pub struct MmioBus {
    regions: RwLock<Vec<MmioRegion>>,
}

impl Default for MmioBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(Vec::new()),
        }
    }

    fn quantize(size: u64) -> u64 {
        size.div_ceil(MMIO_ALIGNMENT) * MMIO_ALIGNMENT
    }

    fn overlaps(a_base: u64, a_end: u64, b_base: u64, b_end: u64) -> bool {
        a_base < b_end && b_base < a_end
    }

    fn check_free(&self, ram: &PhysMem, base: u64, end: u64) -> Result<(), PhysMemError> {
        if Self::overlaps(base, end, ram.base(), ram.end()) {
            return Err(PhysMemError::OverlapsRam {
                base,
                end,
                ram_base: ram.base(),
                ram_end: ram.end(),
            });
        }
        for region in self.regions.read().iter() {
            if Self::overlaps(base, end, region.base(), region.end()) {
                return Err(PhysMemError::OverlapsRegion {
                    base,
                    end,
                    other_base: region.base(),
                    other_end: region.end(),
                });
            }
        }
        Ok(())
    }

    /// Attach a region at a fixed physical address.
    pub fn attach_fixed(
        &self,
        ram: &PhysMem,
        base: u64,
        size: u64,
        handler: Arc<dyn MmioHandler>,
    ) -> Result<u64, PhysMemError> {
        let size = Self::quantize(size.max(1));
        self.check_free(ram, base, base + size)?;
        log::info!(
            "mmio: attach {} at [{base:#x}, {:#x}) (fixed)",
            handler.type_name(),
            base + size
        );
        self.regions.write().push(MmioRegion {
            base,
            size,
            handler,
        });
        Ok(base)
    }

    /// Attach a region at the first free aligned slot at or after `hint`.
    pub fn attach_auto(
        &self,
        ram: &PhysMem,
        hint: u64,
        size: u64,
        handler: Arc<dyn MmioHandler>,
    ) -> Result<u64, PhysMemError> {
        let size = Self::quantize(size.max(1));
        let mut candidate = hint - (hint % MMIO_ALIGNMENT);
        if candidate < hint {
            candidate += MMIO_ALIGNMENT;
        }
        // Bound the search so a pathological hint can't spin forever.
        let search_limit = candidate.saturating_add(1 << 40);
        loop {
            if candidate >= search_limit {
                return Err(PhysMemError::OutOfAddressSpace { hint, size });
            }
            if self.check_free(ram, candidate, candidate + size).is_ok() {
                break;
            }
            candidate += MMIO_ALIGNMENT;
        }
        log::info!(
            "mmio: attach {} at [{candidate:#x}, {:#x}) (auto, hint {hint:#x})",
            handler.type_name(),
            candidate + size
        );
        self.regions.write().push(MmioRegion {
            base: candidate,
            size,
            handler,
        });
        Ok(candidate)
    }

    /// Find the region containing `addr`, if any.
    fn find(&self, addr: u64) -> Option<(u64, u64, Arc<dyn MmioHandler>)> {
        self.regions
            .read()
            .iter()
            .find(|r| r.contains(addr))
            .map(|r| (r.base(), r.size(), Arc::clone(r.handler())))
    }

    /// Dispatch a physical access of `buf.len()` bytes at `addr` to the
    /// owning region's handler, splitting into aligned `max_op_size`
    /// chunks when the requested size exceeds it.
    pub fn dispatch(
        &self,
        addr: u64,
        buf: &mut [u8],
        kind: AccessKind,
    ) -> Result<(), PhysMemError> {
        let (base, _size, handler) = self
            .find(addr)
            .ok_or(PhysMemError::AccessFault {
                addr,
                size: buf.len(),
            })?;

        let max_chunk = handler.max_op_size().max(1);
        let mut done = 0usize;
        while done < buf.len() {
            let chunk = (buf.len() - done).min(max_chunk);
            let offset = addr + done as u64 - base;
            let ok = match kind {
                AccessKind::Read => handler.read(offset, &mut buf[done..done + chunk]),
                AccessKind::Write => handler.write(offset, &buf[done..done + chunk]),
            };
            if !ok {
                return Err(PhysMemError::HandlerRejected {
                    addr,
                    size: buf.len(),
                });
            }
            done += chunk;
        }
        Ok(())
    }

    /// Whether `addr` is routed to a registered region (used by the MMU to
    /// decide RAM vs. MMIO dispatch).
    #[must_use]
    pub fn is_mmio(&self, addr: u64) -> bool {
        self.find(addr).is_some()
    }

    /// Tick every attached region's `update` hook; called once per sweep by
    /// the owning machine's low-frequency event thread.
    pub fn tick(&self) {
        for region in self.regions.read().iter() {
            region.handler().update();
        }
    }

    /// Reset every region in attach order.
    pub fn reset(&self) {
        for region in self.regions.read().iter() {
            region.handler().reset();
        }
    }

    /// Tear down every region in reverse attach order.
    pub fn teardown(&self) {
        for region in self.regions.read().iter().rev() {
            region.handler().remove();
        }
    }

    /// Snapshot of currently attached regions, in attach order, for device
    /// tree emission.
    #[must_use]
    pub fn regions_snapshot(&self) -> Vec<MmioRegionInfo> {
        self.regions
            .read()
            .iter()
            .map(|r| MmioRegionInfo {
                base: r.base(),
                size: r.size(),
                type_name: r.handler().type_name(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        value: AtomicU32,
    }

    impl MmioHandler for Counter {
        fn read(&self, offset: u64, buf: &mut [u8]) -> bool {
            if offset != 0 || buf.len() != 4 {
                return false;
            }
            buf.copy_from_slice(&self.value.load(Ordering::SeqCst).to_le_bytes());
            true
        }

        fn write(&self, offset: u64, buf: &[u8]) -> bool {
            if offset != 0 || buf.len() != 4 {
                return false;
            }
            let mut b = [0u8; 4];
            b.copy_from_slice(buf);
            self.value.store(u32::from_le_bytes(b), Ordering::SeqCst);
            true
        }

        fn min_op_size(&self) -> usize {
            4
        }

        fn max_op_size(&self) -> usize {
            4
        }
    }

    #[test]
    fn attach_fixed_rejects_ram_overlap() {
        let ram = PhysMem::new(0x8000_0000, 0x1000);
        let bus = MmioBus::new();
        let dev = Arc::new(Counter {
            value: AtomicU32::new(0),
        });
        let err = bus.attach_fixed(&ram, 0x8000_0000, 0x1000, dev).unwrap_err();
        assert!(matches!(err, PhysMemError::OverlapsRam { .. }));
    }

    #[test]
    fn attach_auto_finds_first_free_slot() {
        let ram = PhysMem::new(0x8000_0000, 0x1000);
        let bus = MmioBus::new();
        let a = Arc::new(Counter {
            value: AtomicU32::new(0),
        });
        let b = Arc::new(Counter {
            value: AtomicU32::new(0),
        });
        let base_a = bus.attach_auto(&ram, 0x1000_0000, 0x1000, a).unwrap();
        let base_b = bus.attach_auto(&ram, 0x1000_0000, 0x1000, b).unwrap();
        assert_eq!(base_a, 0x1000_0000);
        assert_eq!(base_b, 0x1000_1000);
    }

    #[test]
    fn dispatch_round_trips_through_handler() {
        let ram = PhysMem::new(0x8000_0000, 0x1000);
        let bus = MmioBus::new();
        let dev = Arc::new(Counter {
            value: AtomicU32::new(0),
        });
        let base = bus.attach_fixed(&ram, 0x1000_0000, 0x1000, dev).unwrap();
        let mut buf = 42u32.to_le_bytes();
        bus.dispatch(base, &mut buf, AccessKind::Write).unwrap();
        let mut out = [0u8; 4];
        bus.dispatch(base, &mut out, AccessKind::Read).unwrap();
        assert_eq!(u32::from_le_bytes(out), 42);
    }

    #[test]
    fn dispatch_to_unmapped_address_is_fault() {
        let bus = MmioBus::new();
        let mut buf = [0u8; 4];
        assert!(bus.dispatch(0x4000_0000, &mut buf, AccessKind::Read).is_err());
    }
}
