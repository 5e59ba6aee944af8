//! # IRQ allocation and delivery
//!
//! Wraps a shared [`Plic`] with the source id a device was assigned at
//! attach time, so a device can raise/lower its own line without holding a
//! back-pointer to the bus or the machine.

use std::sync::Arc;

use rvcore_plic::Plic;

/// A device's handle to its own interrupt line. Allocated once at attach
/// time via [`IrqLine::alloc`]; cheap to clone and share across the threads
/// that drive a device.
#[derive(Clone)]
pub struct IrqLine {
    plic: Arc<Plic>,
    source: u32,
}

impl IrqLine {
    /// Allocate a fresh IRQ source from `plic` for a newly attached device.
    /// Returns `None` once the controller's source table is exhausted.
    #[must_use]
    pub fn alloc(plic: Arc<Plic>) -> Option<Self> {
        let source = plic.alloc_irq()?;
        Some(Self { plic, source })
    }

    #[must_use]
    pub fn source(&self) -> u32 {
        self.source
    }

    /// Edge-raise this line.
    pub fn assert_edge(&self) {
        self.plic.send_irq(self.source as usize);
    }

    /// Level-raise this line; stays pending until the guest completes and
    /// the device has since lowered it.
    pub fn assert_level(&self) {
        self.plic.raise_irq(self.source as usize);
    }

    /// Lower a level-raised line.
    pub fn deassert_level(&self) {
        self.plic.lower_irq(self.source as usize);
    }
}

impl std::fmt::Debug for IrqLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrqLine").field("source", &self.source).finish()
    }
}
