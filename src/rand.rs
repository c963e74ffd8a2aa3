///! Random generator implementation module

/// Park-Miller minimal standard generator.
/// Deterministic for a given seed, so compiles of the same map are reproducible.
#[derive(Copy, Clone, Debug)]
pub struct Lehmer {
    /// Current random generator state, never zero
    state: u32,
}

impl Lehmer {
    /// Generator modulus, 2^31 - 1
    pub const MODULUS: u32 = 2147483647;

    /// Generator multiplier
    pub const MULTIPLIER: u32 = 16807;

    /// Construct generator. Zero seed (the only degenerate one) is replaced by 1.
    pub fn new(seed: u32) -> Self {
        let state = seed % Self::MODULUS;

        Self { state: if state == 0 { 1 } else { state } }
    }

    /// Generate next number in [1, MODULUS) range
    pub fn next(&mut self) -> u32 {
        self.state = ((self.state as u64 * Self::MULTIPLIER as u64) % Self::MODULUS as u64) as u32;
        self.state
    }

    /// Generate next F64 in [0..1) range
    pub fn next_unit_f64(&mut self) -> f64 {
        self.next() as f64 / Self::MODULUS as f64
    }

    /// Shuffle slice in place. First element is never moved.
    pub fn shuffle_tail<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let k = ((self.next_unit_f64() * i as f64) as usize + 1).min(i);

            slice.swap(i, k);
        }
    }
}

impl Iterator for Lehmer {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        Some(Lehmer::next(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_standard_sequence() {
        let mut rand = Lehmer::new(1);

        assert_eq!(rand.next(), 16807);
        assert_eq!(rand.next(), 282475249);
        assert_eq!(rand.next(), 1622650073);
    }

    #[test]
    fn zero_seed_is_usable() {
        let mut rand = Lehmer::new(0);

        assert!(rand.take(100).all(|value| value != 0));
    }

    #[test]
    fn shuffle_keeps_first_element() {
        let mut rand = Lehmer::new(1376312589);
        let mut values = (0..16).collect::<Vec<u32>>();

        rand.shuffle_tail(&mut values);

        assert_eq!(values[0], 0);
        let mut sorted = values.clone();
        sorted.sort();
        assert_eq!(sorted, (0..16).collect::<Vec<u32>>());
    }
}

// rand.rs
