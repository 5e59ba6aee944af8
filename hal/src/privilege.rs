//! # RISC-V Privilege Modes
//!
//! ```text
//! +-------+------------+-----+--------------------------------------+
//! | Level | Name       | Abb | Description                          |
//! +-------+------------+-----+--------------------------------------+
//! |   0   | User       |  U  | Unprivileged application code        |
//! |   1   | Supervisor |  S  | Operating system kernel              |
//! |   3   | Machine    |  M  | Firmware / bare metal                |
//! +-------+------------+-----+--------------------------------------+
//! ```
//!
//! Level 2 (Hypervisor) is reserved but unimplemented; this core does not
//! model the H-extension.

/// RISC-V privilege modes, ordered so that `Machine > Supervisor > User`
/// compares correctly - interrupt-acceptance priority follows this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PrivilegeMode {
    /// User mode (unprivileged).
    User = 0,
    /// Supervisor mode (kernel).
    Supervisor = 1,
    /// Machine mode (firmware).
    Machine = 3,
}

impl PrivilegeMode {
    /// Decode the two-bit privilege field found in CSR addresses and
    /// `mstatus.MPP`/`sstatus.SPP`. Returns `None` for the reserved
    /// hypervisor encoding (`0b10`).
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value & 0b11 {
            0 => Some(Self::User),
            1 => Some(Self::Supervisor),
            3 => Some(Self::Machine),
            _ => None,
        }
    }

    /// Raw two-bit encoding.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Index into per-privilege CSR arrays (`tvec[priv]`, `epc[priv]`, ...).
    /// User mode has no dedicated trap state in this emulator (there is no
    /// N-extension), so this indexes only `{Supervisor, Machine}` by
    /// collapsing `User` onto `Supervisor`'s slot - traps never originate
    /// from a `User`-mode delegation target since U-mode cannot be a trap
    /// handler.
    #[must_use]
    pub const fn trap_index(self) -> usize {
        match self {
            PrivilegeMode::User | PrivilegeMode::Supervisor => 0,
            PrivilegeMode::Machine => 1,
        }
    }

    /// Human-readable name used in log messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PrivilegeMode::User => "U",
            PrivilegeMode::Supervisor => "S",
            PrivilegeMode::Machine => "M",
        }
    }
}

impl Default for PrivilegeMode {
    fn default() -> Self {
        // Harts reset into Machine mode (RISC-V privileged spec).
        PrivilegeMode::Machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_priority() {
        assert!(PrivilegeMode::Machine > PrivilegeMode::Supervisor);
        assert!(PrivilegeMode::Supervisor > PrivilegeMode::User);
    }

    #[test]
    fn hypervisor_encoding_is_reserved() {
        assert_eq!(PrivilegeMode::from_u8(2), None);
    }

    #[test]
    fn round_trips() {
        for m in [
            PrivilegeMode::User,
            PrivilegeMode::Supervisor,
            PrivilegeMode::Machine,
        ] {
            assert_eq!(PrivilegeMode::from_u8(m.as_u8()), Some(m));
        }
    }
}
