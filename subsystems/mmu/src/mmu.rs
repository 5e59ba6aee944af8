//! # SV32 Translation & Physical Dispatch
//!
//! Ties together [`crate::tlb::Tlb`], the [`crate::pte`] decoder and
//! `rvcore-physmem` into the walk/cache/dispatch pipeline. One [`Mmu`]
//! belongs to exactly one hart.

use rvcore_hal::privilege::PrivilegeMode;
use rvcore_hal::trap::{Exception, TrapCause};
use rvcore_physmem::{AccessKind, MmioBus, PhysMem};

use crate::pte::{Pte, PteFlags};
use crate::satp::Satp;
use crate::tlb::{AccessBits, Tlb};

const PAGE_SIZE: u32 = 0x1000;
const MEGAPAGE_SIZE: u64 = 0x40_0000;

/// Kind of memory access being translated, distinguishing the exception
/// variants raised on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    Read,
    Write,
    Exec,
}

impl MemAccess {
    const fn required(self) -> AccessBits {
        match self {
            MemAccess::Read => AccessBits::READ,
            MemAccess::Write => AccessBits::WRITE,
            MemAccess::Exec => AccessBits::EXEC,
        }
    }

    const fn page_fault(self) -> Exception {
        match self {
            MemAccess::Read => Exception::LoadPageFault,
            MemAccess::Write => Exception::StorePageFault,
            MemAccess::Exec => Exception::InstructionPageFault,
        }
    }

    const fn access_fault(self) -> Exception {
        match self {
            MemAccess::Read => Exception::LoadAccessFault,
            MemAccess::Write => Exception::StoreAccessFault,
            MemAccess::Exec => Exception::InstructionAccessFault,
        }
    }
}

enum Target {
    Ram { host_page_ptr: *const u8, page_off: usize },
    Mmio { phys_addr: u64 },
}

/// Per-hart MMU: SV32 walker plus its TLB.
pub struct Mmu {
    tlb: Tlb<32>,
}

impl Mmu {
    #[must_use]
    pub fn new() -> Self {
        Self { tlb: Tlb::new() }
    }

    /// Flush the whole TLB. Called on a `satp` write, an SFENCE.VMA, or a
    /// privilege change.
    pub fn flush_all(&mut self) {
        self.tlb.flush_all();
    }

    pub fn flush_addr(&mut self, vaddr: u32) {
        self.tlb.flush_addr(vaddr);
    }

    fn check_rights(flags: PteFlags, priv_mode: PrivilegeMode, sum: bool, access: MemAccess) -> bool {
        let has_bit = match access {
            MemAccess::Read => flags.contains(PteFlags::READ),
            MemAccess::Write => flags.contains(PteFlags::WRITE),
            MemAccess::Exec => flags.contains(PteFlags::EXEC),
        };
        if !has_bit {
            return false;
        }
        match priv_mode {
            PrivilegeMode::User => flags.contains(PteFlags::USER),
            PrivilegeMode::Supervisor => {
                if flags.contains(PteFlags::USER) {
                    access != MemAccess::Exec && sum
                } else {
                    true
                }
            }
            PrivilegeMode::Machine => true,
        }
    }

    /// Walk the SV32 page table, updating A/D bits atomically, and return
    /// the physical page base (page-size aligned) backing `vaddr`.
    fn walk(
        ram: &PhysMem,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        access: MemAccess,
    ) -> Result<(u64, u64), TrapCause> {
        let vpn1 = (vaddr >> 22) & 0x3FF;
        let vpn0 = (vaddr >> 12) & 0x3FF;

        let pte1_addr = satp.root_table_addr() + u64::from(vpn1) * 4;
        let pte1 = Self::read_pte(ram, pte1_addr, access)?;
        if !pte1.is_valid() {
            return Err(TrapCause::Exception(access.page_fault()));
        }

        let (leaf_addr, leaf, page_base, page_size) = if pte1.is_leaf() {
            if !pte1.megapage_aligned() {
                return Err(TrapCause::Exception(access.page_fault()));
            }
            (pte1_addr, pte1, u64::from(pte1.ppn()) << 12, MEGAPAGE_SIZE)
        } else {
            let pte0_addr = (u64::from(pte1.ppn()) << 12) + u64::from(vpn0) * 4;
            let pte0 = Self::read_pte(ram, pte0_addr, access)?;
            if !pte0.is_valid() || !pte0.is_leaf() {
                return Err(TrapCause::Exception(access.page_fault()));
            }
            (pte0_addr, pte0, u64::from(pte0.ppn()) << 12, u64::from(PAGE_SIZE))
        };

        if !Self::check_rights(leaf.flags(), priv_mode, sum, access) {
            return Err(TrapCause::Exception(access.page_fault()));
        }

        let updated = if access == MemAccess::Write {
            leaf.set_dirty()
        } else {
            leaf.set_accessed()
        };
        if updated != leaf {
            Self::store_pte(ram, leaf_addr, updated);
        }

        Ok((page_base, page_size))
    }

    fn read_pte(ram: &PhysMem, addr: u64, access: MemAccess) -> Result<Pte, TrapCause> {
        let mut buf = [0u8; 4];
        ram.read(addr, &mut buf)
            .map_err(|_| TrapCause::Exception(access.page_fault()))?;
        Ok(Pte::from_bits(u32::from_le_bytes(buf)))
    }

    fn store_pte(ram: &PhysMem, addr: u64, pte: Pte) {
        // SAFETY: `addr` was just read from successfully via `ram.read`, so
        // it lies within RAM; the word-aligned atomic store races benignly
        // with other harts walking the same table.
        unsafe {
            let ptr = ram.host_ptr_at(addr).cast_mut();
            rvcore_hal::memops::atomic_store_u32(ptr, pte.bits(), core::sync::atomic::Ordering::Release);
        }
    }

    fn resolve(
        &mut self,
        ram: &PhysMem,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        access: MemAccess,
    ) -> Result<Target, TrapCause> {
        if !satp.paging_enabled() || priv_mode == PrivilegeMode::Machine {
            let phys = u64::from(vaddr);
            return Ok(self.locate_phys(ram, phys));
        }

        if let Some(ptr) = self.tlb.lookup(vaddr, access.required()) {
            return Ok(Target::Ram {
                host_page_ptr: ptr,
                page_off: 0,
            });
        }

        let (page_base, page_size) = Self::walk(ram, satp, priv_mode, sum, vaddr, access)?;
        let page_off = u64::from(vaddr) & (page_size - 1);
        let phys = page_base + page_off;
        let target = self.locate_phys(ram, phys);

        if let Target::Ram { .. } = target {
            // The TLB always caches at 4 KiB granularity regardless of the
            // backing PTE's page size.
            let vpn = vaddr >> 12;
            let phys_4k_base = phys & !u64::from(PAGE_SIZE - 1);
            // SAFETY: `locate_phys` already proved `phys` lies within
            // `ram`'s bounds, and `phys_4k_base` is within the same page.
            let host_page_ptr = ram.host_ptr_at(phys_4k_base);
            self.tlb.insert(vpn, access.required(), host_page_ptr);
        }

        Ok(target)
    }

    fn locate_phys(&self, ram: &PhysMem, phys: u64) -> Target {
        if ram.contains(phys, 1) {
            let page_aligned = phys & !u64::from(PAGE_SIZE - 1);
            let host_page_ptr = ram.host_ptr_at(page_aligned);
            Target::Ram {
                host_page_ptr,
                page_off: (phys - page_aligned) as usize,
            }
        } else {
            Target::Mmio { phys_addr: phys }
        }
    }

    fn access_chunk(
        &mut self,
        ram: &PhysMem,
        bus: &MmioBus,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        buf: &mut [u8],
        access: MemAccess,
    ) -> Result<(), TrapCause> {
        match self.resolve(ram, satp, priv_mode, sum, vaddr, access)? {
            Target::Ram { host_page_ptr, page_off } => {
                // SAFETY: `host_page_ptr` points at a whole 4 KiB RAM page
                // and `page_off + buf.len() <= PAGE_SIZE` by construction of
                // the per-page chunking callers perform.
                unsafe {
                    let src = host_page_ptr.add(page_off);
                    if access == MemAccess::Write {
                        core::ptr::copy_nonoverlapping(buf.as_ptr(), src.cast_mut(), buf.len());
                    } else {
                        core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len());
                    }
                }
                Ok(())
            }
            Target::Mmio { phys_addr } => {
                let kind = match access {
                    MemAccess::Write => AccessKind::Write,
                    MemAccess::Read | MemAccess::Exec => AccessKind::Read,
                };
                bus.dispatch(phys_addr, buf, kind)
                    .map_err(|_| TrapCause::Exception(access.access_fault()))
            }
        }
    }

    /// Perform `buf.len()` bytes of access at `vaddr`, splitting the access
    /// at page boundaries when it crosses one.
    fn access(
        &mut self,
        ram: &PhysMem,
        bus: &MmioBus,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        buf: &mut [u8],
        access: MemAccess,
    ) -> Result<(), TrapCause> {
        let mut done = 0usize;
        while done < buf.len() {
            let page_off = (vaddr.wrapping_add(done as u32)) & (PAGE_SIZE - 1);
            let chunk = (buf.len() - done).min((PAGE_SIZE - page_off) as usize);
            self.access_chunk(
                ram,
                bus,
                satp,
                priv_mode,
                sum,
                vaddr.wrapping_add(done as u32),
                &mut buf[done..done + chunk],
                access,
            )?;
            done += chunk;
        }
        Ok(())
    }

    pub fn read(
        &mut self,
        ram: &PhysMem,
        bus: &MmioBus,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        buf: &mut [u8],
    ) -> Result<(), TrapCause> {
        self.access(ram, bus, satp, priv_mode, sum, vaddr, buf, MemAccess::Read)
    }

    pub fn write(
        &mut self,
        ram: &PhysMem,
        bus: &MmioBus,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        buf: &[u8],
    ) -> Result<(), TrapCause> {
        let mut scratch = [0u8; 8];
        scratch[..buf.len()].copy_from_slice(buf);
        self.access(ram, bus, satp, priv_mode, sum, vaddr, &mut scratch[..buf.len()], MemAccess::Write)
    }

    /// Fetch a single 16-bit halfword at `vaddr` (may be either half of a
    /// 32-bit instruction, or a whole compressed instruction).
    pub fn fetch16(
        &mut self,
        ram: &PhysMem,
        bus: &MmioBus,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
    ) -> Result<u16, TrapCause> {
        let mut buf = [0u8; 2];
        self.access(ram, bus, satp, priv_mode, sum, vaddr, &mut buf, MemAccess::Exec)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Resolve `vaddr` for an atomic memory operation and return a host
    /// pointer directly into RAM, validating rights as `access` (`Read` for
    /// `LR`, `Write` for `SC`/AMO read-modify-write ops). AMOs against MMIO
    /// have no host pointer to hand the atomic RMW and raise a store-access
    /// fault instead. This walker performs no alignment check of its own;
    /// the caller (the hart's `execute_amo`) must reject a `vaddr` that
    /// isn't naturally aligned to the access width before calling this, since
    /// host atomics over a misaligned pointer are undefined behavior.
    pub fn translate_amo(
        &mut self,
        ram: &PhysMem,
        satp: Satp,
        priv_mode: PrivilegeMode,
        sum: bool,
        vaddr: u32,
        access: MemAccess,
    ) -> Result<*mut u8, TrapCause> {
        match self.resolve(ram, satp, priv_mode, sum, vaddr, access)? {
            Target::Ram { host_page_ptr, page_off } => {
                // SAFETY: `resolve` just validated that `page_off` lies
                // within the page `host_page_ptr` points at. Natural
                // alignment of the returned pointer to the access width is
                // the caller's responsibility, not checked here.
                Ok(unsafe { host_page_ptr.add(page_off).cast_mut() })
            }
            Target::Mmio { .. } => Err(TrapCause::Exception(Exception::StoreAccessFault)),
        }
    }

    /// Translate a guest physical address into a host pointer to RAM, if
    /// backed by RAM (used by the hart for AMO/LR-SC, which operate on
    /// physical memory directly once `read`/`write` have already resolved
    /// the address).
    #[must_use]
    pub fn ram_ptr(&self, ram: &PhysMem, phys_addr: u64) -> Option<*mut u8> {
        if ram.contains(phys_addr, 1) {
            Some(ram.host_ptr_at(phys_addr).cast_mut())
        } else {
            None
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pte::PteFlags;
    use crate::satp::SatpMode;

    fn write_pte(ram: &mut PhysMem, addr: u64, flags: PteFlags, phys_target: u64) {
        let bits = (((phys_target >> 12) as u32) << 10) | flags.bits();
        ram.write(addr, &bits.to_le_bytes()).unwrap();
    }

    fn satp_for(root_addr: u64) -> Satp {
        Satp {
            mode: SatpMode::Sv32,
            asid: 0,
            ppn: (root_addr / 4096) as u32,
        }
    }

    #[test]
    fn identity_maps_when_paging_disabled() {
        let ram = PhysMem::new(0x8000_0000, 0x1000);
        let bus = MmioBus::new();
        let mut mmu = Mmu::new();
        let satp = Satp::from_bits(0);
        let mut out = [0u8; 4];
        mmu.read(&ram, &bus, satp, PrivilegeMode::Machine, false, 0x8000_0000, &mut out)
            .unwrap();
    }

    /// Two-level walk: root table `vpn1=0x300, vpn0=0x200` maps
    /// V/R/W to `0x81000000`; reading `0xC0200000` returns that physical
    /// byte and sets the PTE's A bit.
    #[test]
    fn page_table_walk_matches_literal_scenario() {
        let root_addr = 0x8000_0000u64;
        let leaf_table_addr = 0x8000_1000u64;
        let target_phys = 0x8100_0000u64;
        let mut ram = PhysMem::new(root_addr, 0x0200_0000);
        write_pte(&mut ram, root_addr + 0x300 * 4, PteFlags::VALID, leaf_table_addr);
        write_pte(
            &mut ram,
            leaf_table_addr + 0x200 * 4,
            PteFlags::VALID | PteFlags::READ | PteFlags::WRITE,
            target_phys,
        );
        ram.write(target_phys, &[0x42]).unwrap();

        let satp = satp_for(root_addr);
        let mut mmu = Mmu::new();
        let bus = MmioBus::new();
        let mut out = [0u8; 1];
        mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0xC020_0000, &mut out)
            .unwrap();
        assert_eq!(out[0], 0x42);

        let mut pte_bits = [0u8; 4];
        ram.read(leaf_table_addr + 0x200 * 4, &mut pte_bits).unwrap();
        assert_ne!(u32::from_le_bytes(pte_bits) & PteFlags::ACCESSED.bits(), 0);
    }

    /// LW from `0xFFFF_FFFE` straddles the last page of the address space
    /// and the first (the access wraps mod 2^32); both pages are mapped,
    /// and the four bytes must assemble little-endian across the split.
    #[test]
    fn cross_page_load_assembles_bytes_across_the_split() {
        let root_addr = 0x8000_0000u64;
        let leaf_table_a = 0x8000_1000u64;
        let leaf_table_b = 0x8000_2000u64;
        let target_phys_a = 0x8000_3000u64;
        let target_phys_b = 0x8000_4000u64;
        let mut ram = PhysMem::new(root_addr, 0x0001_0000);

        // vaddr 0xFFFF_F000's vpn1 == 0x3FF, vpn0 == 0x3FF.
        write_pte(&mut ram, root_addr + 0x3FF * 4, PteFlags::VALID, leaf_table_a);
        write_pte(
            &mut ram,
            leaf_table_a + 0x3FF * 4,
            PteFlags::VALID | PteFlags::READ | PteFlags::WRITE,
            target_phys_a,
        );
        // vaddr 0x0000_0000's vpn1 == 0, vpn0 == 0.
        write_pte(&mut ram, root_addr, PteFlags::VALID, leaf_table_b);
        write_pte(
            &mut ram,
            leaf_table_b,
            PteFlags::VALID | PteFlags::READ | PteFlags::WRITE,
            target_phys_b,
        );

        ram.write(target_phys_a + 0xFFE, &[0xEF, 0xBE]).unwrap();
        ram.write(target_phys_b, &[0xAD, 0xDE]).unwrap();

        let satp = satp_for(root_addr);
        let mut mmu = Mmu::new();
        let bus = MmioBus::new();
        let mut out = [0u8; 4];
        mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0xFFFF_FFFE, &mut out)
            .unwrap();
        assert_eq!(u32::from_le_bytes(out), 0xDEAD_BEEF);
    }

    #[test]
    fn misaligned_megapage_faults() {
        let root_addr = 0x8000_0000u64;
        let mut ram = PhysMem::new(root_addr, 0x0020_0000);
        // PPN low bits non-zero: not a valid megapage alignment.
        write_pte(&mut ram, root_addr + 0x300 * 4, PteFlags::VALID | PteFlags::READ, 0x8100_1000);
        let satp = satp_for(root_addr);
        let mut mmu = Mmu::new();
        let bus = MmioBus::new();
        let mut out = [0u8; 1];
        let result = mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0xC000_0000, &mut out);
        assert!(matches!(result, Err(TrapCause::Exception(Exception::LoadPageFault))));
    }

    #[test]
    fn supervisor_cannot_execute_user_page_even_with_sum() {
        let root_addr = 0x8000_0000u64;
        let leaf_table_addr = 0x8000_1000u64;
        let target_phys = 0x8000_2000u64;
        let mut ram = PhysMem::new(root_addr, 0x0001_0000);
        write_pte(&mut ram, root_addr, PteFlags::VALID, leaf_table_addr);
        write_pte(
            &mut ram,
            leaf_table_addr,
            PteFlags::VALID | PteFlags::READ | PteFlags::EXEC | PteFlags::USER,
            target_phys,
        );

        let satp = satp_for(root_addr);
        let mut mmu = Mmu::new();
        let bus = MmioBus::new();
        let result = mmu.fetch16(&ram, &bus, satp, PrivilegeMode::Supervisor, true, 0);
        assert!(result.is_err());
    }

    #[test]
    fn tlb_hit_skips_the_walk_on_second_access() {
        let root_addr = 0x8000_0000u64;
        let leaf_table_addr = 0x8000_1000u64;
        let target_phys = 0x8000_2000u64;
        let mut ram = PhysMem::new(root_addr, 0x0001_0000);
        write_pte(&mut ram, root_addr, PteFlags::VALID, leaf_table_addr);
        write_pte(
            &mut ram,
            leaf_table_addr,
            PteFlags::VALID | PteFlags::READ,
            target_phys,
        );
        ram.write(target_phys, &[7]).unwrap();

        let satp = satp_for(root_addr);
        let mut mmu = Mmu::new();
        let bus = MmioBus::new();
        let mut out = [0u8; 1];
        mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0, &mut out).unwrap();
        assert_eq!(out[0], 7);

        // Corrupt the page table; a cached TLB entry must still serve the
        // second access without re-walking.
        ram.write(root_addr, &[0u8; 4]).unwrap();
        mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0, &mut out).unwrap();
        assert_eq!(out[0], 7);

        mmu.flush_all();
        assert!(mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, 0, &mut out).is_err());
    }
}
