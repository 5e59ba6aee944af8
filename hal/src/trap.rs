//! # Trap Cause Taxonomy
//!
//! A single enum spanning both synchronous guest-trap causes (recovered
//! locally by trap entry) and asynchronous interrupt causes, so the CSR
//! file and the hart execute loop share one vocabulary for "what just
//! happened" instead of juggling raw cause bits everywhere.

use crate::csr::{exception, irq_cause};

/// Why a trap was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// Synchronous exception raised by instruction execution.
    Exception(Exception),
    /// Asynchronous interrupt.
    Interrupt(Interrupt),
}

/// Synchronous exception causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    InstructionMisaligned,
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadMisaligned,
    LoadAccessFault,
    StoreMisaligned,
    StoreAccessFault,
    EcallFromU,
    EcallFromS,
    EcallFromM,
    InstructionPageFault,
    LoadPageFault,
    StorePageFault,
}

/// Interrupt causes, one per `mip`/`mie` bit this core models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    SupervisorSoftware,
    MachineSoftware,
    SupervisorTimer,
    MachineTimer,
    SupervisorExternal,
    MachineExternal,
}

impl Exception {
    /// Raw `cause` code (interrupt bit clear).
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Exception::InstructionMisaligned => exception::INSTRUCTION_MISALIGNED,
            Exception::InstructionAccessFault => exception::INSTRUCTION_ACCESS_FAULT,
            Exception::IllegalInstruction => exception::ILLEGAL_INSTRUCTION,
            Exception::Breakpoint => exception::BREAKPOINT,
            Exception::LoadMisaligned => exception::LOAD_MISALIGNED,
            Exception::LoadAccessFault => exception::LOAD_ACCESS_FAULT,
            Exception::StoreMisaligned => exception::STORE_MISALIGNED,
            Exception::StoreAccessFault => exception::STORE_ACCESS_FAULT,
            Exception::EcallFromU => exception::ECALL_FROM_U,
            Exception::EcallFromS => exception::ECALL_FROM_S,
            Exception::EcallFromM => exception::ECALL_FROM_M,
            Exception::InstructionPageFault => exception::INSTRUCTION_PAGE_FAULT,
            Exception::LoadPageFault => exception::LOAD_PAGE_FAULT,
            Exception::StorePageFault => exception::STORE_PAGE_FAULT,
        }
    }
}

impl Interrupt {
    /// Raw `cause` code (interrupt bit clear; set separately by [`TrapCause::cause_value`]).
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Interrupt::SupervisorSoftware => irq_cause::SUPERVISOR_SOFTWARE,
            Interrupt::MachineSoftware => irq_cause::MACHINE_SOFTWARE,
            Interrupt::SupervisorTimer => irq_cause::SUPERVISOR_TIMER,
            Interrupt::MachineTimer => irq_cause::MACHINE_TIMER,
            Interrupt::SupervisorExternal => irq_cause::SUPERVISOR_EXTERNAL,
            Interrupt::MachineExternal => irq_cause::MACHINE_EXTERNAL,
        }
    }

    /// Bit position in `mip`/`mie`/`sip`/`sie` (same as [`Self::code`]).
    #[must_use]
    pub const fn ip_bit(self) -> u64 {
        1 << self.code()
    }
}

impl TrapCause {
    /// Value to write into `cause[priv]`, with XLEN's top bit set for
    /// interrupts per the RISC-V privileged spec.
    #[must_use]
    pub fn cause_value(self, xlen: crate::xlen::Xlen) -> u64 {
        let interrupt_bit = 1u64 << xlen.sign_bit();
        match self {
            TrapCause::Exception(e) => e.code(),
            TrapCause::Interrupt(i) => interrupt_bit | i.code(),
        }
    }

    /// Whether this is an exception that can be delegated via `medeleg`
    /// (interrupts use `mideleg` instead).
    #[must_use]
    pub const fn is_exception(self) -> bool {
        matches!(self, TrapCause::Exception(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlen::Xlen;

    #[test]
    fn rv32_interrupt_sets_bit_31() {
        let v = TrapCause::Interrupt(Interrupt::MachineTimer).cause_value(Xlen::Rv32);
        assert_eq!(v, (1u64 << 31) | 7);
    }

    #[test]
    fn rv64_interrupt_sets_bit_63() {
        let v = TrapCause::Interrupt(Interrupt::SupervisorExternal).cause_value(Xlen::Rv64);
        assert_eq!(v, (1u64 << 63) | 9);
    }

    #[test]
    fn exception_has_no_interrupt_bit() {
        let v = TrapCause::Exception(Exception::IllegalInstruction).cause_value(Xlen::Rv64);
        assert_eq!(v, 2);
    }
}
