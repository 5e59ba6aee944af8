//! # Device tree emission
//!
//! Builds a flattened device tree blob (DTB) for guest firmware when no
//! external DTB file is loaded: a root node, `/cpus` with one `cpu@N` per
//! hart, `/memory`, and a `/soc` bus with a node per attached MMIO region.
//! No DTB-building crate is in the dependency pack (only parsers), so this
//! is a direct, minimal encoder of the structure/strings/header blocks the
//! format defines.

use rvcore_hal::xlen::Xlen;
use rvcore_physmem::MmioRegionInfo;

const FDT_MAGIC: u32 = 0xd00d_feed;
const FDT_VERSION: u32 = 17;
const FDT_LAST_COMP_VERSION: u32 = 16;

const FDT_BEGIN_NODE: u32 = 0x0000_0001;
const FDT_END_NODE: u32 = 0x0000_0002;
const FDT_PROP: u32 = 0x0000_0003;
const FDT_END: u32 = 0x0000_0009;

/// Maps an MMIO handler's `type_name()` to the `compatible` string(s) a
/// guest driver matches against.
fn compatible_for(type_name: &str) -> &'static str {
    match type_name {
        "plic" | "sifive,plic-1.0.0" => "sifive,plic-1.0.0",
        "ns16550a" | "uart" | "chardev" => "ns16550a",
        "i2c" | "i2c-ocores" => "opencores,i2c-ocores",
        "pci" | "pci-ecam" => "pci-host-ecam-generic",
        "gpio" | "gpio0" => "sifive,gpio0",
        _ => "generic,mmio",
    }
}

/// Incrementally builds the struct/strings blocks of a DTB, then packages
/// them with a header into a finished blob.
struct FdtWriter {
    struct_block: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    fn new() -> Self {
        Self {
            struct_block: Vec::new(),
            strings: Vec::new(),
        }
    }

    fn pad4(buf: &mut Vec<u8>) {
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    fn begin_node(&mut self, name: &str) {
        self.struct_block.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        self.struct_block.extend_from_slice(name.as_bytes());
        self.struct_block.push(0);
        Self::pad4(&mut self.struct_block);
    }

    fn end_node(&mut self) {
        self.struct_block.extend_from_slice(&FDT_END_NODE.to_be_bytes());
    }

    fn str_offset(&mut self, name: &str) -> u32 {
        // Reuse an existing entry if this exact name was already interned;
        // a full device tree has few enough distinct property names that a
        // linear scan is cheap.
        if let Some(pos) = find_subslice(&self.strings, name.as_bytes()) {
            return pos as u32;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset
    }

    fn property(&mut self, name: &str, value: &[u8]) {
        let name_off = self.str_offset(name);
        self.struct_block.extend_from_slice(&FDT_PROP.to_be_bytes());
        self.struct_block.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.struct_block.extend_from_slice(&name_off.to_be_bytes());
        self.struct_block.extend_from_slice(value);
        Self::pad4(&mut self.struct_block);
    }

    fn property_u32(&mut self, name: &str, value: u32) {
        self.property(name, &value.to_be_bytes());
    }

    fn property_str(&mut self, name: &str, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.property(name, &bytes);
    }

    fn property_cells(&mut self, name: &str, cells: &[u32]) {
        let mut bytes = Vec::with_capacity(cells.len() * 4);
        for cell in cells {
            bytes.extend_from_slice(&cell.to_be_bytes());
        }
        self.property(name, &bytes);
    }

    fn finish(mut self, boot_cpuid: u32) -> Vec<u8> {
        self.struct_block.extend_from_slice(&FDT_END.to_be_bytes());

        let header_size = 10 * 4;
        let mem_rsvmap_size = 16; // one terminating all-zero entry
        let off_mem_rsvmap = header_size;
        let off_dt_struct = off_mem_rsvmap + mem_rsvmap_size;
        let size_dt_struct = self.struct_block.len() as u32;
        let off_dt_strings = off_dt_struct + size_dt_struct;
        let size_dt_strings = self.strings.len() as u32;
        let total_size = off_dt_strings + size_dt_strings;

        let mut out = Vec::with_capacity(total_size as usize);
        out.extend_from_slice(&FDT_MAGIC.to_be_bytes());
        out.extend_from_slice(&total_size.to_be_bytes());
        out.extend_from_slice(&off_dt_struct.to_be_bytes());
        out.extend_from_slice(&off_dt_strings.to_be_bytes());
        out.extend_from_slice(&off_mem_rsvmap.to_be_bytes());
        out.extend_from_slice(&FDT_VERSION.to_be_bytes());
        out.extend_from_slice(&FDT_LAST_COMP_VERSION.to_be_bytes());
        out.extend_from_slice(&boot_cpuid.to_be_bytes());
        out.extend_from_slice(&size_dt_strings.to_be_bytes());
        out.extend_from_slice(&size_dt_struct.to_be_bytes());
        out.extend_from_slice(&[0u8; 16]); // empty mem reservation block
        out.extend_from_slice(&self.struct_block);
        out.extend_from_slice(&self.strings);
        out
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len() + 1).position(|w| w == [needle, &[0]].concat())
}

/// Inputs needed to emit a device tree for one machine instance.
pub struct FdtParams<'a> {
    pub xlen: Xlen,
    pub hart_count: usize,
    pub mem_base: u64,
    pub mem_size: u64,
    pub plic_base: u64,
    pub plic_num_sources: usize,
    pub devices: &'a [MmioRegionInfo],
}

/// Build a flattened device tree blob for `params`.
#[must_use]
pub fn build(params: &FdtParams<'_>) -> Vec<u8> {
    let mut w = FdtWriter::new();
    let address_cells = if params.xlen == Xlen::Rv64 { 2 } else { 1 };

    w.begin_node("");
    w.property_u32("#address-cells", address_cells);
    w.property_u32("#size-cells", address_cells);
    w.property_str("compatible", "rvcore,virt");
    w.property_str("model", "rvcore virtual machine");

    w.begin_node("cpus");
    w.property_u32("#address-cells", 1);
    w.property_u32("#size-cells", 0);
    w.property_u32("timebase-frequency", 10_000_000);
    for hart_id in 0..params.hart_count {
        w.begin_node(&format!("cpu@{hart_id:x}"));
        w.property_str("device_type", "cpu");
        w.property_u32("reg", hart_id as u32);
        w.property_str("status", "okay");
        w.property_str("compatible", "riscv");
        let isa = if params.xlen == Xlen::Rv64 { "rv64imac" } else { "rv32imac" };
        w.property_str("riscv,isa", isa);
        let mmu_type = if params.xlen == Xlen::Rv64 { "riscv,sv39" } else { "riscv,sv32" };
        w.property_str("mmu-type", mmu_type);

        w.begin_node("interrupt-controller");
        w.property_u32("#interrupt-cells", 1);
        w.property(
            "interrupt-controller",
            &[],
        );
        w.property_str("compatible", "riscv,cpu-intc");
        w.property_u32("phandle", (hart_id as u32) + 1);
        w.end_node();

        w.end_node();
    }
    w.end_node(); // cpus

    w.begin_node(&format!("memory@{:x}", params.mem_base));
    w.property_str("device_type", "memory");
    w.property_cells(
        "reg",
        &addr_size_cells(address_cells, params.mem_base, params.mem_size),
    );
    w.end_node();

    w.begin_node("soc");
    w.property_u32("#address-cells", address_cells);
    w.property_u32("#size-cells", address_cells);
    w.property_str("compatible", "simple-bus");
    w.property("ranges", &[]);

    w.begin_node(&format!("plic@{:x}", params.plic_base));
    w.property_str("compatible", "sifive,plic-1.0.0");
    w.property_cells(
        "reg",
        &addr_size_cells(address_cells, params.plic_base, 0x0400_0000),
    );
    w.property_u32("riscv,ndev", params.plic_num_sources as u32);
    w.property("interrupt-controller", &[]);
    w.property_u32("#interrupt-cells", 1);
    w.property_u32("phandle", 1000);
    w.end_node();

    for region in params.devices {
        let node_name = format!("{}@{:x}", slug(region.type_name), region.base);
        w.begin_node(&node_name);
        w.property_str("compatible", compatible_for(region.type_name));
        w.property_cells("reg", &addr_size_cells(address_cells, region.base, region.size));
        w.end_node();
    }
    w.end_node(); // soc

    w.end_node(); // root

    w.finish(0)
}

fn slug(type_name: &str) -> String {
    type_name.replace([',', ' '], "-")
}

fn addr_size_cells(cells: u32, addr: u64, size: u64) -> Vec<u32> {
    let mut out = Vec::new();
    if cells == 2 {
        out.push((addr >> 32) as u32);
    }
    out.push(addr as u32);
    if cells == 2 {
        out.push((size >> 32) as u32);
    }
    out.push(size as u32);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_magic_and_size_are_consistent() {
        let params = FdtParams {
            xlen: Xlen::Rv64,
            hart_count: 1,
            mem_base: 0x8000_0000,
            mem_size: 0x1000_0000,
            plic_base: 0x0C00_0000,
            plic_num_sources: 32,
            devices: &[],
        };
        let blob = build(&params);
        assert_eq!(&blob[0..4], &FDT_MAGIC.to_be_bytes());
        let total_size = u32::from_be_bytes(blob[4..8].try_into().unwrap());
        assert_eq!(total_size as usize, blob.len());
    }

    #[test]
    fn emits_one_cpu_node_per_hart() {
        let params = FdtParams {
            xlen: Xlen::Rv32,
            hart_count: 2,
            mem_base: 0x8000_0000,
            mem_size: 0x0200_0000,
            plic_base: 0x0C00_0000,
            plic_num_sources: 16,
            devices: &[],
        };
        let blob = build(&params);
        let needle = b"cpu@1\0";
        assert!(blob.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn device_compatible_strings_are_recognized() {
        assert_eq!(compatible_for("ns16550a"), "ns16550a");
        assert_eq!(compatible_for("gpio"), "sifive,gpio0");
        assert_eq!(compatible_for("unknown-thing"), "generic,mmio");
    }
}
