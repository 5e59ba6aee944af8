//! # PLIC MMIO Surface
//!
//! Decodes the guest-visible MMIO register layout onto the
//! [`Plic`] model: priorities, a read-only pending bitmap, per-context
//! enable bitmaps, and the per-context threshold/claim-complete pair. All
//! registers are 32-bit little-endian words.

use rvcore_physmem::MmioHandler;

use crate::plic::{ContextId, Plic};

const PRIORITY_BASE: u64 = 0x0000_0000;
const PRIORITY_END: u64 = 0x0000_1000;
const PENDING_BASE: u64 = 0x0000_1000;
const PENDING_END: u64 = 0x0000_1080;
const ENABLE_BASE: u64 = 0x0000_2000;
const ENABLE_END: u64 = 0x0020_0000;
const ENABLE_BLOCK_SIZE: u64 = 0x80;
const CONTEXT_BASE: u64 = 0x0020_0000;
const CONTEXT_END: u64 = 0x0400_0000;
const CONTEXT_BLOCK_SIZE: u64 = 0x1000;
const THRESHOLD_OFFSET: u64 = 0x00;
const CLAIM_OFFSET: u64 = 0x04;

/// Total MMIO footprint of one PLIC instance.
pub const PLIC_MMIO_SIZE: u64 = CONTEXT_END;

/// Adapts a [`Plic`] onto the [`MmioHandler`] contract so it can be attached
/// to an `rvcore-physmem::MmioBus`.
pub struct PlicMmio {
    plic: std::sync::Arc<Plic>,
}

impl PlicMmio {
    #[must_use]
    pub fn new(plic: std::sync::Arc<Plic>) -> Self {
        Self { plic }
    }

    fn read_word(&self, offset: u64) -> Option<u32> {
        match offset {
            PRIORITY_BASE..PRIORITY_END => {
                let source = (offset / 4) as usize;
                Some(self.plic.priority(source))
            }
            PENDING_BASE..PENDING_END => {
                let word = ((offset - PENDING_BASE) / 4) as usize;
                Some(self.plic.pending_word(word))
            }
            ENABLE_BASE..ENABLE_END => {
                let rel = offset - ENABLE_BASE;
                let ctx = ContextId((rel / ENABLE_BLOCK_SIZE) as usize);
                let word = ((rel % ENABLE_BLOCK_SIZE) / 4) as usize;
                Some(self.plic.enable_word(ctx, word))
            }
            CONTEXT_BASE..CONTEXT_END => {
                let rel = offset - CONTEXT_BASE;
                let ctx = ContextId((rel / CONTEXT_BLOCK_SIZE) as usize);
                match rel % CONTEXT_BLOCK_SIZE {
                    THRESHOLD_OFFSET => Some(self.plic.threshold(ctx)),
                    CLAIM_OFFSET => Some(self.plic.claim(ctx)),
                    _ => Some(0),
                }
            }
            _ => None,
        }
    }

    fn write_word(&self, offset: u64, value: u32) -> bool {
        match offset {
            PRIORITY_BASE..PRIORITY_END => {
                let source = (offset / 4) as usize;
                self.plic.set_priority(source, value);
                true
            }
            PENDING_BASE..PENDING_END => false, // read-only
            ENABLE_BASE..ENABLE_END => {
                let rel = offset - ENABLE_BASE;
                let ctx = ContextId((rel / ENABLE_BLOCK_SIZE) as usize);
                let word = ((rel % ENABLE_BLOCK_SIZE) / 4) as usize;
                self.plic.set_enable_word(ctx, word, value);
                true
            }
            CONTEXT_BASE..CONTEXT_END => {
                let rel = offset - CONTEXT_BASE;
                let ctx = ContextId((rel / CONTEXT_BLOCK_SIZE) as usize);
                match rel % CONTEXT_BLOCK_SIZE {
                    THRESHOLD_OFFSET => {
                        self.plic.set_threshold(ctx, value);
                        true
                    }
                    CLAIM_OFFSET => {
                        self.plic.complete(ctx, value);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl MmioHandler for PlicMmio {
    fn read(&self, offset: u64, buf: &mut [u8]) -> bool {
        if buf.len() != 4 || offset % 4 != 0 {
            return false;
        }
        match self.read_word(offset) {
            Some(word) => {
                buf.copy_from_slice(&word.to_le_bytes());
                true
            }
            None => false,
        }
    }

    fn write(&self, offset: u64, buf: &[u8]) -> bool {
        if buf.len() != 4 || offset % 4 != 0 {
            return false;
        }
        let value = u32::from_le_bytes(buf.try_into().expect("checked len == 4"));
        self.write_word(offset, value)
    }

    fn min_op_size(&self) -> usize {
        4
    }

    fn max_op_size(&self) -> usize {
        4
    }

    fn type_name(&self) -> &'static str {
        "sifive,plic-1.0.0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_priority_through_mmio() {
        let plic = std::sync::Arc::new(Plic::new(8, 1));
        let mmio = PlicMmio::new(plic.clone());
        mmio.write(4, &7u32.to_le_bytes());
        assert_eq!(plic.priority(1), 7);
        let mut buf = [0u8; 4];
        mmio.read(4, &mut buf);
        assert_eq!(u32::from_le_bytes(buf), 7);
    }

    #[test]
    fn claim_via_mmio_matches_literal_scenario() {
        // Register writes driven through MMIO offsets; send_irq is a
        // host-side device call, not a guest-visible register.
        let plic = std::sync::Arc::new(Plic::new(8, 1));
        let mmio = PlicMmio::new(plic.clone());
        mmio.write(5 * 4, &7u32.to_le_bytes()); // priority[5] = 7
        mmio.write(CONTEXT_BASE, &3u32.to_le_bytes()); // threshold[ctx0] = 3
        mmio.write(ENABLE_BASE, &(1u32 << 5).to_le_bytes()); // enable[ctx0][5]

        plic.send_irq(5);

        let mut claim_buf = [0u8; 4];
        mmio.read(CONTEXT_BASE + CLAIM_OFFSET, &mut claim_buf);
        assert_eq!(u32::from_le_bytes(claim_buf), 5);

        mmio.write(CONTEXT_BASE + CLAIM_OFFSET, &5u32.to_le_bytes()); // complete
        mmio.read(CONTEXT_BASE + CLAIM_OFFSET, &mut claim_buf);
        assert_eq!(u32::from_le_bytes(claim_buf), 0);
    }

    #[test]
    fn pending_register_rejects_writes() {
        let plic = std::sync::Arc::new(Plic::new(8, 1));
        let mmio = PlicMmio::new(plic);
        assert!(!mmio.write(PENDING_BASE, &1u32.to_le_bytes()));
    }
}
