//! # Machine orchestrator
//!
//! Owns guest RAM, the MMIO bus, the PLIC, and every hart; drives the
//! `Created -> Attach -> Started -> (Paused <-> Running)* -> Reset | Freed`
//! lifecycle ([`crate::lifecycle::LifecycleStage`]) for a multi-threaded,
//! hosted emulator: `start` spawns one OS thread per hart plus a
//! low-frequency event thread; `pause` clears every hart's `wait_event`
//! flag and rendezvouses with them at a shared barrier; `free` tears down
//! every attached device in reverse attach order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rvcore_hal::privilege::PrivilegeMode;
use rvcore_hal::xlen::Xlen;
use rvcore_hart::Hart;
use rvcore_physmem::{MmioBus, MmioHandler, PhysMem, PhysMemError};
use rvcore_plic::{ContextId, Plic, PlicMmio, PLIC_MMIO_SIZE};

use crate::boot;
use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::fdt::{self, FdtParams};
use crate::lifecycle::LifecycleStage;

/// How often the event thread ticks device `update` hooks and hart timers.
const EVENT_TICK: Duration = Duration::from_millis(10);
/// How much each hart's `mtime` advances per event-thread tick. Chosen so a
/// default-configured machine runs at roughly a 1 MHz guest timebase; real
/// wall-clock fidelity is an embedder concern this crate does not promise.
const TIME_PER_TICK: u64 = 10_000;
/// Granularity at which a parked hart re-polls its `wait_event` flag while
/// paused.
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// The orchestrator tying harts, physical memory, the MMIO bus and the PLIC
/// together into one runnable guest.
pub struct Machine {
    config: MachineConfig,
    ram: Arc<PhysMem>,
    bus: Arc<MmioBus>,
    plic: Arc<Plic>,
    harts: Vec<Arc<RwLock<Hart>>>,
    stopping: Arc<AtomicBool>,
    pause_barrier: Arc<Barrier>,
    hart_threads: Mutex<Vec<JoinHandle<()>>>,
    event_thread: Mutex<Option<JoinHandle<()>>>,
    lifecycle: RwLock<LifecycleStage>,
}

impl Machine {
    /// Construct a machine: allocate RAM, the PLIC and one `Hart` per
    /// configured hart, and attach the PLIC's own MMIO surface to the bus.
    /// Stays in [`LifecycleStage::Created`] until [`Self::attach`] is
    /// called; hart threads do not exist yet.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        let xlen: Xlen = config.xlen.into();
        let ram = PhysMem::new(config.mem_base, config.mem_size);
        let bus = MmioBus::new();

        let num_contexts = config.plic_num_contexts.max(config.hart_count * 2).max(1);
        let plic = Arc::new(Plic::new(config.plic_num_sources.max(1), num_contexts));
        bus.attach_fixed(&ram, config.plic_base, PLIC_MMIO_SIZE, Arc::new(PlicMmio::new(Arc::clone(&plic))))?;

        let harts: Vec<Arc<RwLock<Hart>>> = (0..config.hart_count)
            .map(|id| Arc::new(RwLock::new(Hart::new(id as u64, xlen, config.reset_pc))))
            .collect();
        let pause_barrier = Arc::new(Barrier::new(harts.len() + 1));

        Ok(Self {
            config,
            ram: Arc::new(ram),
            bus: Arc::new(bus),
            plic,
            harts,
            stopping: Arc::new(AtomicBool::new(false)),
            pause_barrier,
            hart_threads: Mutex::new(Vec::new()),
            event_thread: Mutex::new(None),
            lifecycle: RwLock::new(LifecycleStage::Created),
        })
    }

    #[must_use]
    pub fn hart_count(&self) -> usize {
        self.harts.len()
    }

    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    #[must_use]
    pub fn ram(&self) -> &PhysMem {
        &self.ram
    }

    #[must_use]
    pub fn stage(&self) -> LifecycleStage {
        *self.lifecycle.read()
    }

    /// Shared handle to one hart, for inspection or boot-register setup
    /// before [`Self::start`].
    pub fn hart(&self, index: usize) -> Result<Arc<RwLock<Hart>>, MachineError> {
        self.harts.get(index).cloned().ok_or(MachineError::HartOutOfRange(index))
    }

    /// Copy `data` into guest RAM at `addr`. Intended for a loader writing
    /// bootrom/kernel images and the device tree before [`Self::start`] (or
    /// while paused); bypasses the typed `PhysMem` API the way the MMU's
    /// own page-table writes do, since RAM is shared via `Arc` across hart
    /// threads once the machine is running.
    pub fn load_image(&self, addr: u64, data: &[u8]) -> Result<(), MachineError> {
        if !self.ram.contains(addr, data.len() as u64) {
            return Err(PhysMemError::AccessFault { addr, size: data.len() }.into());
        }
        // SAFETY: caller is expected to serialize this against hart
        // execution (before `start` or while paused); bounds checked above.
        unsafe {
            let ptr = self.ram.host_ptr_at(addr).cast_mut();
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        Ok(())
    }

    /// Attach a device at a fixed guest physical address.
    pub fn attach_mmio_fixed(&self, base: u64, size: u64, handler: Arc<dyn MmioHandler>) -> Result<u64, MachineError> {
        self.bus.attach_fixed(&self.ram, base, size, handler).map_err(Into::into)
    }

    /// Attach a device at the first free slot at or after `hint`.
    pub fn attach_mmio_auto(&self, hint: u64, size: u64, handler: Arc<dyn MmioHandler>) -> Result<u64, MachineError> {
        self.bus.attach_auto(&self.ram, hint, size, handler).map_err(Into::into)
    }

    /// Allocate a fresh PLIC-backed IRQ line for a newly attached device.
    pub fn alloc_irq(&self) -> Result<rvcore_devices::IrqLine, MachineError> {
        rvcore_devices::IrqLine::alloc(Arc::clone(&self.plic)).ok_or(MachineError::IrqExhausted)
    }

    /// Guest physical address this machine places a generated device tree
    /// at: `mem_base + mem_size - 8 MiB`, rounded down to a 2 MiB boundary.
    #[must_use]
    pub fn dtb_address(&self) -> u64 {
        const EIGHT_MIB: u64 = 8 * 1024 * 1024;
        const TWO_MIB: u64 = 2 * 1024 * 1024;
        let raw = self.config.mem_base + self.config.mem_size - EIGHT_MIB;
        raw - (raw % TWO_MIB)
    }

    /// Build a flattened device tree reflecting the machine's current
    /// configuration and attached MMIO devices.
    #[must_use]
    pub fn build_fdt(&self) -> Vec<u8> {
        let devices = self.bus.regions_snapshot();
        fdt::build(&FdtParams {
            xlen: self.config.xlen.into(),
            hart_count: self.harts.len(),
            mem_base: self.config.mem_base,
            mem_size: self.config.mem_size,
            plic_base: self.config.plic_base,
            plic_num_sources: self.config.plic_num_sources,
            devices: &devices,
        })
    }

    /// Finalize device attachment (`Created -> Attached`). Devices may
    /// still be attached afterward; this only marks the boundary past
    /// which [`Self::start`] is legal.
    pub fn attach(&self) -> Result<(), MachineError> {
        let mut stage = self.lifecycle.write();
        stage.check_move_to(LifecycleStage::Attached)?;
        *stage = LifecycleStage::Attached;
        log::info!("machine: attached, {} hart(s)", self.harts.len());
        Ok(())
    }

    /// Write `a0`/`a1`(/`a2`) into every hart per the boot-register
    /// convention, using this machine's generated device tree address.
    pub fn set_boot_registers(&self, fw_dynamic_info_addr: Option<u64>) {
        let dtb_addr = self.dtb_address();
        for (id, hart) in self.harts.iter().enumerate() {
            boot::set_boot_registers(&mut hart.write(), id as u64, dtb_addr, fw_dynamic_info_addr);
        }
    }

    /// Spawn one OS thread per hart plus the low-frequency event thread
    /// (`Attached -> Running`).
    pub fn start(&self) -> Result<(), MachineError> {
        let mut stage = self.lifecycle.write();
        stage.check_move_to(LifecycleStage::Running)?;

        self.bus.reset();
        self.stopping.store(false, Ordering::Release);

        let mut threads = self.hart_threads.lock();
        for hart in &self.harts {
            let hart = Arc::clone(hart);
            let ram = Arc::clone(&self.ram);
            let bus = Arc::clone(&self.bus);
            let stopping = Arc::clone(&self.stopping);
            let barrier = Arc::clone(&self.pause_barrier);
            threads.push(std::thread::spawn(move || run_hart(&hart, &ram, &bus, &stopping, &barrier)));
        }

        let harts = self.harts.clone();
        let bus = Arc::clone(&self.bus);
        let plic = Arc::clone(&self.plic);
        let stopping = Arc::clone(&self.stopping);
        *self.event_thread.lock() = Some(std::thread::spawn(move || run_event_loop(&harts, &bus, &plic, &stopping)));

        *stage = LifecycleStage::Running;
        log::info!("machine: started");
        Ok(())
    }

    /// Clear every hart's `wait_event` flag and rendezvous with them at the
    /// pause barrier (`Running -> Paused`).
    pub fn pause(&self) -> Result<(), MachineError> {
        let mut stage = self.lifecycle.write();
        stage.check_move_to(LifecycleStage::Paused)?;
        for hart in &self.harts {
            hart.read().events().clear_wait_event();
        }
        self.pause_barrier.wait();
        *stage = LifecycleStage::Paused;
        log::debug!("machine: paused");
        Ok(())
    }

    /// Re-arm every hart's `wait_event` flag (`Paused -> Running`).
    pub fn resume(&self) -> Result<(), MachineError> {
        let mut stage = self.lifecycle.write();
        stage.check_move_to(LifecycleStage::Running)?;
        for hart in &self.harts {
            hart.read().events().set_wait_event(1);
        }
        *stage = LifecycleStage::Running;
        log::debug!("machine: resumed");
        Ok(())
    }

    /// Rewind every hart to its reset PC and privilege mode and clear its
    /// reservation, then resume execution.
    pub fn reset(&self) -> Result<(), MachineError> {
        {
            let mut stage = self.lifecycle.write();
            stage.check_move_to(LifecycleStage::Resetting)?;
            *stage = LifecycleStage::Resetting;
        }
        let reset_pc = self.config.reset_pc;
        for hart in &self.harts {
            let mut guard = hart.write();
            *guard = Hart::new(guard.hartid(), guard.xlen(), reset_pc);
        }
        self.bus.reset();
        log::info!("machine: reset");
        let mut stage = self.lifecycle.write();
        *stage = LifecycleStage::Running;
        Ok(())
    }

    /// Stop every hart thread, join them, tear down every attached device
    /// in reverse attach order, and join the event thread (`-> Freed`).
    pub fn free(&self) -> Result<(), MachineError> {
        {
            let mut stage = self.lifecycle.write();
            stage.check_move_to(LifecycleStage::Freed)?;
            *stage = LifecycleStage::Freed;
        }
        self.stopping.store(true, Ordering::Release);
        for hart in &self.harts {
            hart.read().events().set_wait_event(1);
        }
        for thread in self.hart_threads.lock().drain(..) {
            let _ = thread.join();
        }
        if let Some(thread) = self.event_thread.lock().take() {
            let _ = thread.join();
        }
        self.bus.teardown();
        log::info!("machine: freed");
        Ok(())
    }
}

/// Body of one hart's dedicated OS thread: step while running, rendezvous
/// at `barrier` and then poll for resume while paused, exit when `stopping`.
fn run_hart(hart: &Arc<RwLock<Hart>>, ram: &PhysMem, bus: &MmioBus, stopping: &AtomicBool, barrier: &Barrier) {
    loop {
        if stopping.load(Ordering::Acquire) {
            return;
        }
        if hart.read().events().wait_event() == 0 {
            barrier.wait();
            while hart.read().events().wait_event() == 0 && !stopping.load(Ordering::Acquire) {
                std::thread::park_timeout(PAUSE_POLL);
            }
            continue;
        }
        hart.write().step(ram, bus);
    }
}

/// Body of the machine's low-frequency event thread: ticks device `update`
/// hooks, advances each hart's timer, and folds PLIC external-interrupt
/// lines into each hart's pending bits.
fn run_event_loop(harts: &[Arc<RwLock<Hart>>], bus: &MmioBus, plic: &Plic, stopping: &AtomicBool) {
    while !stopping.load(Ordering::Acquire) {
        std::thread::sleep(EVENT_TICK);
        if stopping.load(Ordering::Acquire) {
            return;
        }
        bus.tick();
        for (id, hart) in harts.iter().enumerate() {
            hart.read().timer().advance(TIME_PER_TICK);
            let m_pending = plic.line_asserted(ContextId::machine(id));
            let s_pending = plic.line_asserted(ContextId::supervisor(id));
            let mut guard = hart.write();
            guard.set_external_pending(PrivilegeMode::Machine, m_pending);
            guard.set_external_pending(PrivilegeMode::Supervisor, s_pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(hart_count: usize) -> MachineConfig {
        MachineConfig {
            hart_count,
            mem_size: 0x0010_0000,
            plic_num_contexts: hart_count * 2,
            ..MachineConfig::default()
        }
    }

    #[test]
    fn new_machine_starts_created_with_plic_attached() {
        let machine = Machine::new(test_config(1)).unwrap();
        assert_eq!(machine.stage(), LifecycleStage::Created);
        let snapshot = machine.bus.regions_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].base, machine.config().plic_base);
    }

    #[test]
    fn lifecycle_rejects_start_before_attach() {
        let machine = Machine::new(test_config(1)).unwrap();
        assert!(machine.start().is_err());
    }

    #[test]
    fn load_image_rejects_out_of_bounds_address() {
        let machine = Machine::new(test_config(1)).unwrap();
        let err = machine.load_image(0xFFFF_FFFF, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, MachineError::Physmem(_)));
    }

    #[test]
    fn load_image_writes_guest_ram() {
        let machine = Machine::new(test_config(1)).unwrap();
        machine.load_image(machine.config().mem_base, &[0xAA, 0xBB]).unwrap();
        let mut out = [0u8; 2];
        machine.ram().read(machine.config().mem_base, &mut out).unwrap();
        assert_eq!(out, [0xAA, 0xBB]);
    }

    #[test]
    fn start_pause_resume_free_round_trip() {
        let machine = Machine::new(test_config(2)).unwrap();
        machine.attach().unwrap();
        machine.start().unwrap();
        assert_eq!(machine.stage(), LifecycleStage::Running);
        machine.pause().unwrap();
        assert_eq!(machine.stage(), LifecycleStage::Paused);
        machine.resume().unwrap();
        assert_eq!(machine.stage(), LifecycleStage::Running);
        machine.free().unwrap();
        assert_eq!(machine.stage(), LifecycleStage::Freed);
    }

    #[test]
    fn dtb_address_is_aligned_and_below_mem_top() {
        let machine = Machine::new(test_config(1)).unwrap();
        assert_eq!(machine.dtb_address() % (2 * 1024 * 1024), 0);
    }
}
