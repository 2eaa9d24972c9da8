//! Growable bit vector with a sliding baseline.
//!
//! Each bit records whether the message at a given offset has been accepted
//! by the AMQP peer. Bit `i` represents offset `baseline + i`. The word
//! array only ever grows, so under a bounded number of in-flight messages
//! the window stops allocating in steady state.

use causeway_core::Offset;

const BITS_PER_WORD: u64 = 64;

/// A window of acknowledgment bits relative to a sliding baseline offset.
#[derive(Debug, Clone)]
pub struct BitWindow {
    /// Offset represented by bit 0.
    baseline: Offset,
    /// Backing words, low bits first. Grows, never shrinks.
    words: Vec<u64>,
}

impl BitWindow {
    /// Creates a window starting at `baseline` with all bits clear.
    #[must_use]
    pub fn new(baseline: Offset) -> Self {
        Self {
            baseline,
            words: vec![0],
        }
    }

    /// Returns the offset represented by bit 0.
    #[must_use]
    pub const fn baseline(&self) -> Offset {
        self.baseline
    }

    /// Marks the bit for `offset`. Idempotent on repeats.
    ///
    /// Grows the backing words lazily to cover `offset - baseline`. Callers
    /// must not pass offsets that have already been shifted out.
    ///
    /// # Panics
    ///
    /// Panics if `offset < baseline`.
    pub fn set(&mut self, offset: Offset) {
        assert!(
            offset.get() >= self.baseline.get(),
            "offset ({}) must be >= baseline ({})",
            offset.get(),
            self.baseline.get()
        );
        let index = offset.get() - self.baseline.get();
        #[allow(clippy::cast_possible_truncation)]
        let word = (index / BITS_PER_WORD) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % BITS_PER_WORD);
    }

    /// Shifts all bits down by `places`, advancing the baseline.
    ///
    /// Bits at positions `< places` are discarded; `places` may exceed one
    /// word's width. After this call the old bit at index `places` is the
    /// new bit 0. Returns the new baseline. Storage is retained, not shrunk.
    pub fn rshift(&mut self, places: u64) -> Offset {
        #[allow(clippy::cast_possible_truncation)]
        let shift_words = (places / BITS_PER_WORD) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let shift_bits = (places % BITS_PER_WORD) as u32;
        let len = self.words.len();

        // Whole-word moves first.
        if shift_words > 0 {
            if shift_words >= len {
                self.words.fill(0);
            } else {
                self.words.copy_within(shift_words.., 0);
                self.words[len - shift_words..].fill(0);
            }
        }

        // Then sub-word shifts, carrying the lost low bits of the next word.
        // A shift amount of 64 on u64 is undefined, hence the guard.
        if shift_bits > 0 {
            for i in 0..len {
                self.words[i] >>= shift_bits;
                if i + 1 < len {
                    self.words[i] |= self.words[i + 1] << (64 - shift_bits);
                }
            }
        }

        self.baseline = Offset::new(self.baseline.get() + places);
        self.baseline
    }

    /// Returns the count of contiguously set bits starting at bit 0.
    ///
    /// This is the number of offsets from the baseline that can be safely
    /// committed without claiming unaccepted messages. Zero if bit 0 is
    /// unset.
    #[must_use]
    pub fn lowest_set_bits(&self) -> u64 {
        let mut count = 0u64;
        for word in &self.words {
            let ones = u64::from(word.trailing_ones());
            count += ones;
            if ones < BITS_PER_WORD {
                break;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        let window = BitWindow::new(Offset::new(10));
        assert_eq!(window.baseline(), Offset::new(10));
        assert_eq!(window.lowest_set_bits(), 0);
    }

    #[test]
    fn test_set_and_lowest_bits() {
        let mut window = BitWindow::new(Offset::new(0));

        window.set(Offset::new(0));
        window.set(Offset::new(1));
        window.set(Offset::new(2));
        assert_eq!(window.lowest_set_bits(), 3);

        // Gap at 3, then 4.
        window.set(Offset::new(4));
        assert_eq!(window.lowest_set_bits(), 3);

        // Fill the gap.
        window.set(Offset::new(3));
        assert_eq!(window.lowest_set_bits(), 5);
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut window = BitWindow::new(Offset::new(0));
        window.set(Offset::new(0));
        window.set(Offset::new(0));
        assert_eq!(window.lowest_set_bits(), 1);
    }

    #[test]
    fn test_any_interleaving_fills_range() {
        // After setting every offset in [0, n) in scrambled order,
        // lowest_set_bits must equal n.
        let n = 200u64;
        let mut window = BitWindow::new(Offset::new(0));
        let mut offsets: Vec<u64> = (0..n).collect();
        // Deterministic scramble.
        offsets.sort_by_key(|o| (o.wrapping_mul(2_654_435_761)) % n);
        for offset in offsets {
            window.set(Offset::new(offset));
        }
        assert_eq!(window.lowest_set_bits(), n);
    }

    #[test]
    fn test_growth_past_one_word() {
        let mut window = BitWindow::new(Offset::new(0));
        window.set(Offset::new(200));
        assert_eq!(window.lowest_set_bits(), 0);

        for i in 0..200 {
            window.set(Offset::new(i));
        }
        assert_eq!(window.lowest_set_bits(), 201);
    }

    #[test]
    fn test_rshift_advances_baseline() {
        let mut window = BitWindow::new(Offset::new(100));
        let baseline = window.rshift(5);
        assert_eq!(baseline, Offset::new(105));
        assert_eq!(window.baseline(), Offset::new(105));
    }

    #[test]
    fn test_rshift_preserves_remaining_bits() {
        let mut window = BitWindow::new(Offset::new(0));
        for i in 0..10 {
            window.set(Offset::new(i));
        }
        assert_eq!(window.lowest_set_bits(), 10);

        // rshift(k) with k <= lowest_set_bits drops exactly k from the count.
        window.rshift(4);
        assert_eq!(window.lowest_set_bits(), 6);

        window.rshift(6);
        assert_eq!(window.lowest_set_bits(), 0);
    }

    #[test]
    fn test_rshift_across_word_boundaries() {
        let mut window = BitWindow::new(Offset::new(0));
        // Set bits 70..=80 (second word).
        for i in 70..=80 {
            window.set(Offset::new(i));
        }
        assert_eq!(window.lowest_set_bits(), 0);

        // Shift down by more than a word's width.
        window.rshift(70);
        assert_eq!(window.baseline(), Offset::new(70));
        assert_eq!(window.lowest_set_bits(), 11);
    }

    #[test]
    fn test_rshift_whole_words_exact() {
        let mut window = BitWindow::new(Offset::new(0));
        window.set(Offset::new(64));
        window.set(Offset::new(65));
        window.rshift(64);
        assert_eq!(window.lowest_set_bits(), 2);
    }

    #[test]
    fn test_rshift_beyond_stored_bits() {
        let mut window = BitWindow::new(Offset::new(0));
        window.set(Offset::new(0));
        window.rshift(500);
        assert_eq!(window.baseline(), Offset::new(500));
        assert_eq!(window.lowest_set_bits(), 0);
    }

    #[test]
    fn test_old_bit_at_places_becomes_bit_zero() {
        let mut window = BitWindow::new(Offset::new(0));
        window.set(Offset::new(3));
        window.rshift(3);
        assert_eq!(window.lowest_set_bits(), 1);
    }

    #[test]
    #[should_panic(expected = "must be >= baseline")]
    fn test_set_below_baseline_panics() {
        let mut window = BitWindow::new(Offset::new(100));
        window.set(Offset::new(99));
    }
}
