//! Insertion-ordered unique keys for appended children.
//!
//! Same layout the hosted database uses: 8 characters of millisecond time
//! followed by 12 random characters, drawn from an alphabet whose byte order
//! matches its lexicographic order. Keys generated in the same millisecond
//! reuse the random tail incremented by one, so they still sort by creation.

use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_time: i64,
    last_rand: [u8; 12],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id<R: Rng>(&mut self, now_ms: i64, rng: &mut R) -> String {
        // A clock step backwards still has to produce a larger key.
        let now_ms = now_ms.max(self.last_time);
        let duplicate_time = now_ms == self.last_time;
        self.last_time = now_ms;

        let mut id = [0u8; 20];
        let mut time = now_ms;
        for slot in id[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }

        if duplicate_time {
            for digit in self.last_rand.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            for digit in self.last_rand.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }

        for (slot, digit) in id[8..].iter_mut().zip(self.last_rand.iter()) {
            *slot = PUSH_CHARS[*digit as usize];
        }

        id.iter().map(|b| *b as char).collect()
    }
}
