// Pattern - Fixed-width bit vector holding one channel's step states
// Stored as a single u64 word so register aggregation stays word-level bit math

use rand::Rng;

/// Widest pattern a single register word can hold
pub const MAX_LENGTH: u32 = 64;

/// Pattern width used when the configuration does not say otherwise
pub const DEFAULT_LENGTH: u32 = 32;

/// An L-bit step pattern, L in [1, 64]. Bit 0 is step 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    bits: u64,
    length: u32,
}

impl Pattern {
    /// Create an all-zero pattern. Length is clamped to [1, `MAX_LENGTH`].
    pub fn new(length: u32) -> Self {
        let length = length.clamp(1, MAX_LENGTH);
        Self { bits: 0, length }
    }

    /// Build from a raw word; bits above `length` are masked off.
    pub fn from_bits(bits: u64, length: u32) -> Self {
        let length = length.clamp(1, MAX_LENGTH);
        Self {
            bits: bits & Self::mask(length),
            length,
        }
    }

    fn mask(length: u32) -> u64 {
        if length >= 64 { u64::MAX } else { (1 << length) - 1 }
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Bit value at a step, taken modulo the pattern length.
    pub fn get(&self, step: u32) -> u8 {
        ((self.bits >> (step % self.length)) & 1) as u8
    }

    /// Replace one step. The step is taken modulo the pattern length so a
    /// write can never land outside the word.
    pub fn set(&mut self, step: u32, value: u8) {
        let bit = 1u64 << (step % self.length);
        if value & 1 == 1 {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
    }

    /// Replace the whole pattern from its wire form (list of 0/1, step 0 first).
    /// Missing trailing steps read as 0; excess entries are ignored.
    pub fn replace(&mut self, steps: &[u8]) {
        let mut bits = 0u64;
        for (step, value) in steps.iter().take(self.length as usize).enumerate() {
            bits |= u64::from(value & 1) << step;
        }
        self.bits = bits;
    }

    /// Wire form: one 0/1 entry per step, step 0 first.
    pub fn to_steps(&self) -> Vec<u8> {
        (0..self.length)
            .map(|step| ((self.bits >> step) & 1) as u8)
            .collect()
    }

    /// Replace the pattern with uniformly random bits.
    pub fn randomize(&mut self) {
        self.bits = rand::thread_rng().r#gen::<u64>() & Self::mask(self.length);
    }

    /// Zero every step.
    pub fn clear(&mut self) {
        self.bits = 0;
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_clamped() {
        assert_eq!(Pattern::new(0).length(), 1);
        assert_eq!(Pattern::new(32).length(), 32);
        assert_eq!(Pattern::new(200).length(), MAX_LENGTH);
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut pattern = Pattern::new(32);

        pattern.set(3, 1);
        assert_eq!(pattern.get(3), 1);
        assert_eq!(pattern.get(2), 0);

        pattern.set(3, 0);
        assert_eq!(pattern.get(3), 0);
    }

    #[test]
    fn test_step_indices_wrap_at_length() {
        let mut pattern = Pattern::new(8);

        // Step 9 wraps to step 1
        pattern.set(9, 1);
        assert_eq!(pattern.get(1), 1);
        assert_eq!(pattern.get(9), 1);
        assert_eq!(pattern.bits() >> 8, 0);
    }

    #[test]
    fn test_replace_round_trips_exactly() {
        let mut pattern = Pattern::new(8);
        let steps = vec![1, 0, 1, 1, 0, 0, 1, 0];

        pattern.replace(&steps);
        assert_eq!(pattern.to_steps(), steps);
        assert_eq!(pattern.bits(), 0b0100_1101);
    }

    #[test]
    fn test_replace_tolerates_short_and_long_input() {
        let mut pattern = Pattern::new(4);

        pattern.replace(&[1, 1]);
        assert_eq!(pattern.to_steps(), vec![1, 1, 0, 0]);

        pattern.replace(&[0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(pattern.to_steps(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_from_bits_masks_high_bits() {
        let pattern = Pattern::from_bits(u64::MAX, 8);
        assert_eq!(pattern.bits(), 0xFF);
    }

    #[test]
    fn test_randomize_stays_in_width() {
        let mut pattern = Pattern::new(8);
        for _ in 0..32 {
            pattern.randomize();
            assert_eq!(pattern.bits() >> 8, 0);
        }
    }

    #[test]
    fn test_clear() {
        let mut pattern = Pattern::from_bits(0b1010, 4);
        pattern.clear();
        assert_eq!(pattern.bits(), 0);
        assert_eq!(pattern.to_steps(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_full_width_pattern() {
        let mut pattern = Pattern::new(64);
        pattern.set(63, 1);
        assert_eq!(pattern.get(63), 1);
        assert_eq!(pattern.bits(), 1 << 63);
    }
}
