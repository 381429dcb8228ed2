//! Deterministic dice streams for the simulation engine
//!
//! `DiceStream` wraps a xorshift64* generator whose seed fully determines
//! the stream, and layers the composite roll primitives the combat resolver
//! consumes (quality tests, defense tests, morale). Streams are cheap,
//! worker-exclusive values; the batch driver derives one seed per work
//! batch so results never depend on which thread ran the batch.

use rand::{Error, Rng, RngCore};

/// SplitMix64 bit mixer. Used both to expand raw seeds into generator state
/// and to derive per-batch seeds from the master seed.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Seed for the dice stream of one work batch. Deliberately excludes any
/// worker or thread identity: the stream for `(master_seed, batch_index)`
/// must be identical at every thread count.
pub fn derive_batch_seed(master_seed: u64, batch_index: u64) -> u64 {
    splitmix64(master_seed ^ splitmix64(batch_index))
}

/// Seeded xorshift64* stream with d6-oriented roll primitives.
#[derive(Debug, Clone)]
pub struct DiceStream {
    state: u64,
}

impl DiceStream {
    pub fn new(seed: u64) -> Self {
        // xorshift state must be nonzero; splitmix64 maps exactly one input
        // to zero, so re-mix that case.
        let mut state = splitmix64(seed);
        if state == 0 {
            state = splitmix64(0x6A09_E667_F3BC_C909);
        }
        Self { state }
    }

    /// One unbiased six-sided die.
    pub fn roll_d6(&mut self) -> u8 {
        self.gen_range(1..=6u8)
    }

    /// Roll `n` dice against quality `q`. A die succeeds when
    /// `roll + modifier >= q`; natural sixes are counted separately so the
    /// resolver can drive procs (Rending, Lethal).
    pub fn roll_quality_test(&mut self, n: u32, q: u8, modifier: i8) -> (u32, u32) {
        let mut hits = 0;
        let mut sixes = 0;
        for _ in 0..n {
            let roll = self.roll_d6();
            if roll == 6 {
                sixes += 1;
            }
            if i16::from(roll) + i16::from(modifier) >= i16::from(q) {
                hits += 1;
            }
        }
        (hits, sixes)
    }

    /// Quality test that re-rolls natural 1s once (Reliable, Devout).
    pub fn roll_quality_test_rerolling_ones(&mut self, n: u32, q: u8, modifier: i8) -> (u32, u32) {
        let mut hits = 0;
        let mut sixes = 0;
        for _ in 0..n {
            let mut roll = self.roll_d6();
            if roll == 1 {
                roll = self.roll_d6();
            }
            if roll == 6 {
                sixes += 1;
            }
            if i16::from(roll) + i16::from(modifier) >= i16::from(q) {
                hits += 1;
            }
        }
        (hits, sixes)
    }

    /// Roll one save per incoming wound against defense `d` with `ap` added
    /// to the required roll. Returns the number of failed saves.
    ///
    /// Poison forces successful saves to be re-rolled and suppresses
    /// Regeneration; Regeneration re-rolls failed saves once.
    pub fn roll_defense_test(
        &mut self,
        wounds: u32,
        d: u8,
        ap: u8,
        regen: bool,
        poisoned: bool,
    ) -> u32 {
        let required = u16::from(d) + u16::from(ap);
        let mut failed = 0;
        for _ in 0..wounds {
            let mut saved = u16::from(self.roll_d6()) >= required;
            if saved && poisoned {
                saved = u16::from(self.roll_d6()) >= required;
            }
            if !saved && regen && !poisoned {
                saved = u16::from(self.roll_d6()) >= required;
            }
            if !saved {
                failed += 1;
            }
        }
        failed
    }

    /// Standard quality test used for morale.
    pub fn roll_morale(&mut self, q: u8, modifier: i8) -> bool {
        let roll = self.roll_d6();
        i16::from(roll) + i16::from(modifier) >= i16::from(q)
    }

    fn next_state(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

impl RngCore for DiceStream {
    fn next_u32(&mut self) -> u32 {
        // Upper bits of xorshift64* are the well-mixed ones.
        (self.next_state() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_state()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_state().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = DiceStream::new(42);
        let mut b = DiceStream::new(42);
        for _ in 0..1000 {
            assert_eq!(a.roll_d6(), b.roll_d6());
        }
    }

    #[test]
    fn zero_seed_has_nonzero_state() {
        let mut stream = DiceStream::new(0);
        // A zero xorshift state would emit zeros forever.
        assert!((0..16).any(|_| stream.next_u64() != 0));
    }

    #[test]
    fn quality_four_hits_about_half() {
        let mut stream = DiceStream::new(999);
        let (hits, _) = stream.roll_quality_test(10_000, 4, 0);
        let rate = hits as f64 / 10_000.0;
        assert!(rate > 0.45 && rate < 0.55, "hit rate {}", rate);
    }

    #[test]
    fn defense_four_fails_about_half() {
        let mut stream = DiceStream::new(777);
        let failed = stream.roll_defense_test(10_000, 4, 0, false, false);
        let rate = failed as f64 / 10_000.0;
        assert!(rate > 0.45 && rate < 0.55, "wound rate {}", rate);
    }

    #[test]
    fn impossible_save_always_fails() {
        let mut stream = DiceStream::new(5);
        assert_eq!(stream.roll_defense_test(100, 6, 2, false, false), 100);
    }

    #[test]
    fn batch_seed_ignores_nothing_but_inputs() {
        assert_eq!(derive_batch_seed(1, 2), derive_batch_seed(1, 2));
        assert_ne!(derive_batch_seed(1, 2), derive_batch_seed(1, 3));
        assert_ne!(derive_batch_seed(1, 2), derive_batch_seed(2, 2));
    }
}
