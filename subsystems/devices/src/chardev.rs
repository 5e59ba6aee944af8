//! # Character device contract
//!
//! The backend behind a UART-style byte stream: guest writes drain out to
//! the host side, host-produced bytes queue up for the guest to read. The
//! core polls [`CharDev::poll`] from its MMIO register model and drives
//! [`CharDev::update`] from the machine's low-frequency event thread.

use bitflags::bitflags;

bitflags! {
    /// Readiness flags a character device reports back to its MMIO front end.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollFlags: u8 {
        /// At least one byte is available to read.
        const RX_READY = 0b01;
        /// The device can accept at least one more byte to write.
        const TX_READY = 0b10;
    }
}

/// A character-stream backend attached behind a UART-style MMIO front end.
pub trait CharDev: Send + Sync {
    /// Drain up to `buf.len()` bytes into `buf`; returns the number filled.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Accept up to `buf.len()` bytes from the guest; returns the number
    /// actually consumed (may be less than `buf.len()` if the backend's
    /// internal queue is full).
    fn write(&self, buf: &[u8]) -> usize;

    /// Current readiness.
    fn poll(&self) -> PollFlags;

    /// Called periodically from the machine's event thread; a backend that
    /// bridges to a real terminal or socket uses this to pump its queues and
    /// raise its [`crate::IrqLine`] when readiness changes.
    fn update(&self) {}

    /// Called at teardown, in reverse attach order.
    fn remove(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_flags_compose() {
        let flags = PollFlags::RX_READY | PollFlags::TX_READY;
        assert!(flags.contains(PollFlags::RX_READY));
        assert!(flags.contains(PollFlags::TX_READY));
    }
}
