//! # Platform-Level Interrupt Controller
//!
//! Per-source priority/pending/raised state and per-context enable/threshold
//! state, with the `send_irq`/`raise_irq`/`lower_irq`/claim/complete state
//! machine. Every field is an atomic word, so a `Plic` is shared across
//! hart threads behind a plain reference, no mutex.

use std::sync::atomic::{AtomicU32, Ordering};

/// Context = `hart_id * 2 + mode` (0 = Machine-external, 1 = Supervisor-external),
/// the same numbering the reference RISC-V PLIC driver convention uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextId(pub usize);

impl ContextId {
    #[must_use]
    pub const fn machine(hart_id: usize) -> Self {
        Self(hart_id * 2)
    }

    #[must_use]
    pub const fn supervisor(hart_id: usize) -> Self {
        Self(hart_id * 2 + 1)
    }
}

const WORD_BITS: usize = 32;

fn word_and_bit(source: usize) -> (usize, u32) {
    (source / WORD_BITS, 1u32 << (source % WORD_BITS))
}

struct Context {
    enable: Box<[AtomicU32]>,
    threshold: AtomicU32,
    /// Level-summary of this context's external-interrupt line.
    line_asserted: AtomicU32,
}

impl Context {
    fn new(num_words: usize) -> Self {
        Self {
            enable: (0..num_words).map(|_| AtomicU32::new(0)).collect(),
            threshold: AtomicU32::new(0),
            line_asserted: AtomicU32::new(0),
        }
    }

    fn is_enabled(&self, source: usize) -> bool {
        let (word, bit) = word_and_bit(source);
        self.enable[word].load(Ordering::Acquire) & bit != 0
    }
}

/// The interrupt controller. IRQ source 0 is reserved and never
/// pending/enabled.
pub struct Plic {
    num_sources: usize,
    priority: Box<[AtomicU32]>,
    pending: Box<[AtomicU32]>,
    raised: Box<[AtomicU32]>,
    contexts: Box<[Context]>,
    next_irq: AtomicU32,
}

impl Plic {
    #[must_use]
    pub fn new(num_sources: usize, num_contexts: usize) -> Self {
        let num_words = num_sources.div_ceil(WORD_BITS).max(1);
        Self {
            num_sources,
            priority: (0..num_sources).map(|_| AtomicU32::new(0)).collect(),
            pending: (0..num_words).map(|_| AtomicU32::new(0)).collect(),
            raised: (0..num_words).map(|_| AtomicU32::new(0)).collect(),
            contexts: (0..num_contexts).map(|_| Context::new(num_words)).collect(),
            next_irq: AtomicU32::new(1),
        }
    }

    #[must_use]
    pub fn num_sources(&self) -> usize {
        self.num_sources
    }

    #[must_use]
    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Allocate the next free IRQ id from a monotonic counter.
    pub fn alloc_irq(&self) -> Option<u32> {
        let id = self.next_irq.fetch_add(1, Ordering::Relaxed);
        if (id as usize) < self.num_sources {
            Some(id)
        } else {
            None
        }
    }

    fn pending_bit(&self, source: usize) -> bool {
        let (word, bit) = word_and_bit(source);
        self.pending[word].load(Ordering::Acquire) & bit != 0
    }

    fn set_pending(&self, source: usize) {
        let (word, bit) = word_and_bit(source);
        self.pending[word].fetch_or(bit, Ordering::AcqRel);
    }

    /// Clear the pending bit iff it is currently set, returning whether this
    /// call was the one that cleared it (used by [`Self::claim`] to resolve
    /// the race between two contexts claiming the same source).
    fn try_clear_pending(&self, source: usize) -> bool {
        let (word, bit) = word_and_bit(source);
        self.pending[word].fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    fn raised_bit(&self, source: usize) -> bool {
        let (word, bit) = word_and_bit(source);
        self.raised[word].load(Ordering::Acquire) & bit != 0
    }

    fn priority_of(&self, source: usize) -> u32 {
        self.priority[source].load(Ordering::Acquire)
    }

    fn is_eligible(&self, ctx: &Context, source: usize) -> bool {
        source > 0
            && self.pending_bit(source)
            && ctx.is_enabled(source)
            && self.priority_of(source) > ctx.threshold.load(Ordering::Acquire)
    }

    /// Recompute one context's external-interrupt line from scratch.
    fn recompute_one(&self, id: ContextId) {
        let Some(ctx) = self.contexts.get(id.0) else {
            return;
        };
        let any = (1..self.num_sources).any(|s| self.is_eligible(ctx, s));
        ctx.line_asserted.store(u32::from(any), Ordering::Release);
    }

    fn recompute_all(&self) {
        for idx in 0..self.contexts.len() {
            self.recompute_one(ContextId(idx));
        }
    }

    /// Whether this context's external-interrupt line is currently asserted;
    /// polled by the owning hart to set `mip.[MS]EIP`.
    #[must_use]
    pub fn line_asserted(&self, id: ContextId) -> bool {
        self.contexts
            .get(id.0)
            .is_some_and(|ctx| ctx.line_asserted.load(Ordering::Acquire) != 0)
    }

    /// Set an IRQ pending and raise the line on every eligible context.
    pub fn send_irq(&self, source: usize) {
        if source == 0 || source >= self.num_sources {
            log::debug!("plic: send_irq({source}) out of range");
            return;
        }
        self.set_pending(source);
        for ctx in self.contexts.iter() {
            if self.is_eligible(ctx, source) {
                ctx.line_asserted.store(1, Ordering::Release);
            }
        }
    }

    /// Level-sensitive raise: marks the source `raised` so [`Self::complete`]
    /// re-asserts it if still held, then behaves like [`Self::send_irq`].
    pub fn raise_irq(&self, source: usize) {
        if source == 0 || source >= self.num_sources {
            return;
        }
        let (word, bit) = word_and_bit(source);
        self.raised[word].fetch_or(bit, Ordering::AcqRel);
        self.send_irq(source);
    }

    /// Lower a level-sensitive source. `pending` stays set until claimed.
    pub fn lower_irq(&self, source: usize) {
        if source == 0 || source >= self.num_sources {
            return;
        }
        let (word, bit) = word_and_bit(source);
        self.raised[word].fetch_and(!bit, Ordering::AcqRel);
    }

    /// `priority[source] = value`. Lowering a priority can make a source
    /// ineligible for contexts that aren't otherwise rescanned, so that
    /// direction forces a full recomputation, expected to be a rare path;
    /// raising only ever adds eligibility, which is cheap to check per
    /// context for just this one source.
    pub fn set_priority(&self, source: usize, value: u32) {
        if source == 0 || source >= self.num_sources {
            return;
        }
        let old = self.priority[source].swap(value, Ordering::AcqRel);
        if value < old {
            self.recompute_all();
        } else if value > old {
            for ctx in self.contexts.iter() {
                if self.is_eligible(ctx, source) {
                    ctx.line_asserted.store(1, Ordering::Release);
                }
            }
        }
    }

    #[must_use]
    pub fn priority(&self, source: usize) -> u32 {
        self.priority.get(source).map_or(0, |p| p.load(Ordering::Acquire))
    }

    /// Enable/disable `source` for one context. Disabling can remove the
    /// only eligible source keeping that context's line asserted, so it
    /// forces a full rescan of that one context; enabling only ever adds
    /// eligibility.
    pub fn set_enable(&self, id: ContextId, source: usize, enabled: bool) {
        if source == 0 || source >= self.num_sources {
            return;
        }
        let Some(ctx) = self.contexts.get(id.0) else {
            return;
        };
        let (word, bit) = word_and_bit(source);
        if enabled {
            ctx.enable[word].fetch_or(bit, Ordering::AcqRel);
            if self.is_eligible(ctx, source) {
                ctx.line_asserted.store(1, Ordering::Release);
            }
        } else {
            ctx.enable[word].fetch_and(!bit, Ordering::AcqRel);
            self.recompute_one(id);
        }
    }

    #[must_use]
    pub fn is_enabled(&self, id: ContextId, source: usize) -> bool {
        self.contexts.get(id.0).is_some_and(|ctx| ctx.is_enabled(source))
    }

    /// Raw pending bitmap word, for the MMIO `pending` register range: 32
    /// sources per word, read-only.
    #[must_use]
    pub fn pending_word(&self, word_idx: usize) -> u32 {
        self.pending.get(word_idx).map_or(0, |w| w.load(Ordering::Acquire))
    }

    /// Raw enable bitmap word for one context, for the MMIO `enable` range.
    #[must_use]
    pub fn enable_word(&self, id: ContextId, word_idx: usize) -> u32 {
        self.contexts
            .get(id.0)
            .and_then(|ctx| ctx.enable.get(word_idx))
            .map_or(0, |w| w.load(Ordering::Acquire))
    }

    /// Overwrite one enable word. Individual bit flips still go through
    /// [`Self::set_enable`] so the cheap/full recompute distinction holds.
    pub fn set_enable_word(&self, id: ContextId, word_idx: usize, value: u32) {
        let old = self.enable_word(id, word_idx);
        if old == value {
            return;
        }
        let changed = old ^ value;
        for bit in 0..WORD_BITS {
            if changed & (1 << bit) != 0 {
                let source = word_idx * WORD_BITS + bit;
                self.set_enable(id, source, value & (1 << bit) != 0);
            }
        }
    }

    /// Threshold writes always trigger a single-context recomputation.
    pub fn set_threshold(&self, id: ContextId, value: u32) {
        let Some(ctx) = self.contexts.get(id.0) else {
            return;
        };
        ctx.threshold.store(value, Ordering::Release);
        self.recompute_one(id);
    }

    #[must_use]
    pub fn threshold(&self, id: ContextId) -> u32 {
        self.contexts.get(id.0).map_or(0, |ctx| ctx.threshold.load(Ordering::Acquire))
    }

    /// Claim the highest-priority pending/enabled/above-threshold source for
    /// `id`, ties broken by lowest id, clearing its pending bit atomically.
    /// Returns 0 if none is eligible. The first of two racing claims to win
    /// the atomic clear is the context that gets the IRQ: first-match
    /// semantics.
    pub fn claim(&self, id: ContextId) -> u32 {
        let Some(ctx) = self.contexts.get(id.0) else {
            return 0;
        };
        loop {
            let mut best: Option<(u32, usize)> = None;
            for source in 1..self.num_sources {
                if self.is_eligible(ctx, source) {
                    let pri = self.priority_of(source);
                    let replace = match best {
                        None => true,
                        Some((best_pri, best_id)) => pri > best_pri || (pri == best_pri && source < best_id),
                    };
                    if replace {
                        best = Some((pri, source));
                    }
                }
            }
            let Some((_, source)) = best else {
                self.recompute_one(id);
                return 0;
            };
            if self.try_clear_pending(source) {
                self.recompute_one(id);
                return source as u32;
            }
            // Someone else claimed `source` first; rescan.
        }
    }

    /// Complete (acknowledge) `source` on context `id`. If still
    /// level-raised, re-pend it and renotify.
    pub fn complete(&self, id: ContextId, source: u32) {
        let source = source as usize;
        if source == 0 || source >= self.num_sources {
            return;
        }
        let _ = id;
        if self.raised_bit(source) {
            self.send_irq(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_routing_scenario() {
        let plic = Plic::new(16, 2);
        let ctx0 = ContextId(0);
        plic.set_priority(5, 7);
        plic.set_threshold(ctx0, 3);
        plic.set_enable(ctx0, 5, true);

        plic.send_irq(5);
        assert!(plic.line_asserted(ctx0));
        assert_eq!(plic.claim(ctx0), 5);
        plic.complete(ctx0, 5);
        assert_eq!(plic.claim(ctx0), 0);
    }

    #[test]
    fn below_threshold_never_asserts() {
        let plic = Plic::new(8, 1);
        let ctx0 = ContextId(0);
        plic.set_priority(2, 1);
        plic.set_threshold(ctx0, 3);
        plic.set_enable(ctx0, 2, true);
        plic.send_irq(2);
        assert!(!plic.line_asserted(ctx0));
        assert_eq!(plic.claim(ctx0), 0);
    }

    #[test]
    fn ties_broken_by_lowest_id() {
        let plic = Plic::new(8, 1);
        let ctx0 = ContextId(0);
        for source in [3, 4] {
            plic.set_priority(source, 5);
            plic.set_enable(ctx0, source, true);
        }
        plic.send_irq(4);
        plic.send_irq(3);
        assert_eq!(plic.claim(ctx0), 3);
        assert_eq!(plic.claim(ctx0), 4);
    }

    #[test]
    fn level_sensitive_source_rearms_on_complete() {
        let plic = Plic::new(8, 1);
        let ctx0 = ContextId(0);
        plic.set_priority(1, 1);
        plic.set_enable(ctx0, 1, true);
        plic.raise_irq(1);
        assert_eq!(plic.claim(ctx0), 1);
        plic.complete(ctx0, 1);
        // still raised, so complete re-pends it.
        assert_eq!(plic.claim(ctx0), 1);
        plic.lower_irq(1);
        plic.complete(ctx0, 1);
        assert_eq!(plic.claim(ctx0), 0);
    }

    #[test]
    fn lowering_priority_deasserts_line_when_no_longer_eligible() {
        let plic = Plic::new(8, 1);
        let ctx0 = ContextId(0);
        plic.set_priority(1, 5);
        plic.set_threshold(ctx0, 3);
        plic.set_enable(ctx0, 1, true);
        plic.send_irq(1);
        assert!(plic.line_asserted(ctx0));
        plic.set_priority(1, 1);
        assert!(!plic.line_asserted(ctx0));
    }

    #[test]
    fn irq_zero_is_reserved() {
        let plic = Plic::new(8, 1);
        let ctx0 = ContextId(0);
        plic.set_enable(ctx0, 0, true);
        plic.send_irq(0);
        assert!(!plic.line_asserted(ctx0));
    }
}
