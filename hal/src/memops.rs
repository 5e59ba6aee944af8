//! # Little-Endian Memory Operations
//!
//! Guest memory is always little-endian regardless of host byte order.
//! These helpers are the single place that encodes/decodes guest-visible
//! byte layout, and the single place that performs the atomic host
//! read-modify-write a guest AMO or LR/SC needs.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Decode `size` bytes (1, 2, 4 or 8) from the front of `buf` as an
/// unsigned little-endian integer.
///
/// # Panics
/// Panics if `buf` is shorter than `size` or `size` is not one of
/// `1/2/4/8`.
#[must_use]
pub fn load_le(buf: &[u8], size: usize) -> u64 {
    assert!(buf.len() >= size, "short buffer for {size}-byte load");
    let mut out = 0u64;
    for (i, byte) in buf[..size].iter().enumerate() {
        out |= u64::from(*byte) << (8 * i);
    }
    out
}

/// Encode the low `size` bytes of `value` into `buf` as little-endian.
///
/// # Panics
/// Panics if `buf` is shorter than `size` or `size` is not one of
/// `1/2/4/8`.
pub fn store_le(buf: &mut [u8], size: usize, value: u64) {
    assert!(buf.len() >= size, "short buffer for {size}-byte store");
    for (i, byte) in buf[..size].iter_mut().enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
}

/// Sign-extend a little-endian-loaded value of `size` bytes.
#[must_use]
pub fn load_le_signed(buf: &[u8], size: usize) -> u64 {
    crate::bitops::sign_extend(load_le(buf, size), (size * 8) as u32)
}

/// Atomically load a 32-bit word from a host RAM byte pointer.
///
/// # Safety
/// `ptr` must be valid for reads of 4 bytes, 4-byte aligned, and must stay
/// alive for the duration of the call. Misaligned guest atomics are
/// rejected by the hart's `execute_amo` before a pointer ever reaches here.
#[must_use]
pub unsafe fn atomic_load_u32(ptr: *const u8, order: Ordering) -> u32 {
    debug_assert_eq!(ptr as usize % 4, 0, "misaligned atomic word");
    // SAFETY: forwarded from the caller's contract.
    unsafe { AtomicU32::from_ptr(ptr.cast_mut().cast()).load(order) }
}

/// Atomically store a 32-bit word to a host RAM byte pointer.
///
/// # Safety
/// Same contract as [`atomic_load_u32`].
pub unsafe fn atomic_store_u32(ptr: *mut u8, value: u32, order: Ordering) {
    debug_assert_eq!(ptr as usize % 4, 0, "misaligned atomic word");
    // SAFETY: forwarded from the caller's contract.
    unsafe { AtomicU32::from_ptr(ptr.cast()).store(value, order) }
}

/// Atomic compare-and-swap on a 32-bit host word; used to implement
/// AMO ops without holding the reservation lock for longer than necessary.
///
/// # Safety
/// Same contract as [`atomic_load_u32`].
pub unsafe fn atomic_rmw_u32(
    ptr: *mut u8,
    order: Ordering,
    mut f: impl FnMut(u32) -> u32,
) -> u32 {
    debug_assert_eq!(ptr as usize % 4, 0, "misaligned atomic word");
    // SAFETY: forwarded from the caller's contract.
    let atomic = unsafe { AtomicU32::from_ptr(ptr.cast()) };
    let mut current = atomic.load(order);
    loop {
        let new = f(current);
        match atomic.compare_exchange_weak(current, new, order, Ordering::Relaxed) {
            Ok(prev) => return prev,
            Err(observed) => current = observed,
        }
    }
}

/// 64-bit analog of [`atomic_load_u32`] for `*.D` AMO variants on RV64.
///
/// # Safety
/// `ptr` must be valid for reads of 8 bytes and 8-byte aligned.
#[must_use]
pub unsafe fn atomic_load_u64(ptr: *const u8, order: Ordering) -> u64 {
    debug_assert_eq!(ptr as usize % 8, 0, "misaligned atomic doubleword");
    // SAFETY: forwarded from the caller's contract.
    unsafe { AtomicU64::from_ptr(ptr.cast_mut().cast()).load(order) }
}

/// 64-bit analog of [`atomic_rmw_u32`].
///
/// # Safety
/// Same contract as [`atomic_load_u64`].
pub unsafe fn atomic_rmw_u64(
    ptr: *mut u8,
    order: Ordering,
    mut f: impl FnMut(u64) -> u64,
) -> u64 {
    debug_assert_eq!(ptr as usize % 8, 0, "misaligned atomic doubleword");
    // SAFETY: forwarded from the caller's contract.
    let atomic = unsafe { AtomicU64::from_ptr(ptr.cast()) };
    let mut current = atomic.load(order);
    loop {
        let new = f(current);
        match atomic.compare_exchange_weak(current, new, order, Ordering::Relaxed) {
            Ok(prev) => return prev,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_store_round_trip() {
        let mut buf = [0u8; 8];
        store_le(&mut buf, 4, 0xDEAD_BEEF);
        assert_eq!(load_le(&buf, 4), 0xDEAD_BEEF);
        assert_eq!(buf, [0xEF, 0xBE, 0xAD, 0xDE, 0, 0, 0, 0]);
    }

    #[test]
    fn signed_byte_load_sign_extends() {
        let buf = [0x80u8];
        assert_eq!(load_le_signed(&buf, 1) as i64, -128);
    }

    #[test]
    fn atomic_add_word() {
        let mut word: u32 = 1;
        let ptr = core::ptr::addr_of_mut!(word).cast::<u8>();
        // SAFETY: `word` is a live, aligned u32 on the stack.
        let prev = unsafe { atomic_rmw_u32(ptr, Ordering::SeqCst, |v| v.wrapping_add(5)) };
        assert_eq!(prev, 1);
        assert_eq!(word, 6);
    }
}
