//! # Software TLB
//!
//! A direct-mapped, power-of-two-sized cache of recent virtual-to-physical
//! translations: a fixed-size array of `{tag, host_ptr, access_bits}`
//! entries. Owned exclusively by one hart's thread - no locking.

bitflags::bitflags! {
    /// Access rights a cached translation has already been verified for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessBits: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

#[derive(Clone, Copy)]
struct Entry {
    /// Virtual page number this slot caches, or `None` if the slot is empty.
    vpn: Option<u32>,
    access: AccessBits,
    /// Host pointer to the start of the backing 4 KiB page in RAM.
    host_page_ptr: *const u8,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            vpn: None,
            access: AccessBits::empty(),
            host_page_ptr: core::ptr::null(),
        }
    }
}

/// Direct-mapped software TLB. `SIZE` must be a power of two.
pub struct Tlb<const SIZE: usize> {
    entries: [Entry; SIZE],
}

impl<const SIZE: usize> Tlb<SIZE> {
    const _POW2_CHECK: () = assert!(SIZE.is_power_of_two(), "Tlb size must be a power of two");

    #[must_use]
    pub fn new() -> Self {
        let () = Self::_POW2_CHECK;
        Self {
            entries: [Entry::default(); SIZE],
        }
    }

    fn index(vpn: u32) -> usize {
        (vpn as usize) & (SIZE - 1)
    }

    /// Look up a cached translation. Returns the host pointer to the exact
    /// byte at `vaddr` if the VPN matches and `required` is a subset of the
    /// cached access bits.
    #[must_use]
    pub fn lookup(&self, vaddr: u32, required: AccessBits) -> Option<*const u8> {
        let vpn = vaddr >> 12;
        let entry = &self.entries[Self::index(vpn)];
        if entry.vpn == Some(vpn) && entry.access.contains(required) {
            // SAFETY: host_page_ptr was cached from a valid RAM page pointer
            // and the offset stays within the 4 KiB page.
            Some(unsafe { entry.host_page_ptr.add((vaddr & 0xFFF) as usize) })
        } else {
            None
        }
    }

    /// Cache a translation for `vpn`, pointing at the start of its backing
    /// RAM page.
    pub fn insert(&mut self, vpn: u32, access: AccessBits, host_page_ptr: *const u8) {
        self.entries[Self::index(vpn)] = Entry {
            vpn: Some(vpn),
            access,
            host_page_ptr,
        };
    }

    /// Flush every entry. Called on an SFENCE.VMA, a `satp` write, or a
    /// privilege change.
    pub fn flush_all(&mut self) {
        for entry in &mut self.entries {
            *entry = Entry::default();
        }
    }

    /// Flush only the entry for a specific virtual address, if present.
    pub fn flush_addr(&mut self, vaddr: u32) {
        let vpn = vaddr >> 12;
        let slot = &mut self.entries[Self::index(vpn)];
        if slot.vpn == Some(vpn) {
            *slot = Entry::default();
        }
    }
}

impl<const SIZE: usize> Default for Tlb<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the raw pointers cached here point into a `PhysMem` buffer that
// outlives the hart, and the TLB itself is only ever touched by the owning
// hart's thread; it is never shared.
unsafe impl<const SIZE: usize> Send for Tlb<SIZE> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_tlb() {
        let tlb: Tlb<32> = Tlb::new();
        assert!(tlb.lookup(0x1000, AccessBits::READ).is_none());
    }

    #[test]
    fn hit_after_insert() {
        let mut tlb: Tlb<32> = Tlb::new();
        let page = [0u8; 4096];
        tlb.insert(0x1, AccessBits::READ | AccessBits::WRITE, page.as_ptr());
        let ptr = tlb.lookup(0x1010, AccessBits::READ).unwrap();
        assert_eq!(ptr, unsafe { page.as_ptr().add(0x10) });
    }

    #[test]
    fn miss_when_required_access_not_cached() {
        let mut tlb: Tlb<32> = Tlb::new();
        let page = [0u8; 4096];
        tlb.insert(0x1, AccessBits::READ, page.as_ptr());
        assert!(tlb.lookup(0x1000, AccessBits::WRITE).is_none());
    }

    #[test]
    fn flush_all_clears_every_entry() {
        let mut tlb: Tlb<32> = Tlb::new();
        let page = [0u8; 4096];
        tlb.insert(0x1, AccessBits::READ, page.as_ptr());
        tlb.flush_all();
        assert!(tlb.lookup(0x1000, AccessBits::READ).is_none());
    }
}
