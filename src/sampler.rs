//! # Sampler
//!
//! Sampling strategies evaluated by the [`crate::gate::Gate`] after the
//! filter chain passes. Rates are clamped to `[0, 1]` at configuration time
//! so the gate itself never has to reject an out-of-range value.

use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::record::{Fields, Level};

/// FNV-1a 32-bit hash, used by [`SamplerStrategy::Consistent`] to turn a
/// caller-supplied key into a stable `[0, 1000)` bucket.
fn fnv32a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Capability set a sampler exposes to the gate and to reconfiguration calls.
pub trait Sampler: Send + Sync {
    fn should_sample(&self, level: Level, message: &str, fields: &Fields) -> bool;
    fn rate(&self) -> f64;
    fn set_rate(&self, rate: f64);
}

fn clamp_rate(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// Emits every record.
pub struct NoneSampler;

impl Sampler for NoneSampler {
    fn should_sample(&self, _level: Level, _message: &str, _fields: &Fields) -> bool {
        true
    }
    fn rate(&self) -> f64 {
        1.0
    }
    fn set_rate(&self, _rate: f64) {}
}

/// Emits a record with probability `p`, drawn independently each time from a
/// thread-local xorshift generator seeded from [`std::hash::RandomState`]'s
/// entropy source via `std::collections::hash_map::DefaultHasher` mixed with
/// a monotonically advancing counter — no dedicated RNG crate needed for a
/// single `[0, 1)` draw per call.
pub struct RandomSampler {
    rate_bits: AtomicU64,
    counter: AtomicU64,
}

impl RandomSampler {
    pub fn new(p: f64) -> Self {
        RandomSampler {
            rate_bits: AtomicU64::new(clamp_rate(p).to_bits()),
            counter: AtomicU64::new(0),
        }
    }

    fn draw(&self) -> f64 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut h = std::collections::hash_map::DefaultHasher::new();
        h.write_u64(n);
        h.write_u64(std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0));
        let bits = h.finish();
        (bits >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Sampler for RandomSampler {
    fn should_sample(&self, _level: Level, _message: &str, _fields: &Fields) -> bool {
        self.draw() < self.rate()
    }

    fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    fn set_rate(&self, rate: f64) {
        self.rate_bits
            .store(clamp_rate(rate).to_bits(), Ordering::Relaxed);
    }
}

/// Deterministic sampling: same key always yields the same decision for a
/// given rate, for the lifetime of the process.
pub struct ConsistentSampler {
    rate_bits: AtomicU64,
    key_fn: Box<dyn Fn(Level, &str, &Fields) -> String + Send + Sync>,
}

impl ConsistentSampler {
    pub fn new(p: f64, key_fn: impl Fn(Level, &str, &Fields) -> String + Send + Sync + 'static) -> Self {
        ConsistentSampler {
            rate_bits: AtomicU64::new(clamp_rate(p).to_bits()),
            key_fn: Box::new(key_fn),
        }
    }
}

impl Sampler for ConsistentSampler {
    fn should_sample(&self, level: Level, message: &str, fields: &Fields) -> bool {
        let key = (self.key_fn)(level, message, fields);
        let hash = fnv32a(key.as_bytes());
        let bucket = (hash % 1000) as f64 / 1000.0;
        bucket < self.rate()
    }

    fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    fn set_rate(&self, rate: f64) {
        self.rate_bits
            .store(clamp_rate(rate).to_bits(), Ordering::Relaxed);
    }
}

/// Emits the first message of every `N`, so `c mod N == 1` always admits the
/// very first call. The counter resets to zero on reconfiguration (see
/// `IntervalSampler::reset`).
pub struct IntervalSampler {
    n: AtomicU64,
    counter: AtomicU64,
}

impl IntervalSampler {
    pub fn new(n: u64) -> Self {
        IntervalSampler {
            n: AtomicU64::new(n.max(1)),
            counter: AtomicU64::new(0),
        }
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }

    pub fn set_interval(&self, n: u64) {
        self.n.store(n.max(1), Ordering::Relaxed);
        self.reset();
    }
}

impl Sampler for IntervalSampler {
    fn should_sample(&self, _level: Level, _message: &str, _fields: &Fields) -> bool {
        let n = self.n.load(Ordering::Relaxed);
        let c = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        c % n == 1
    }

    fn rate(&self) -> f64 {
        1.0 / self.n.load(Ordering::Relaxed) as f64
    }

    fn set_rate(&self, rate: f64) {
        let n = if rate <= 0.0 {
            u64::MAX
        } else {
            (1.0 / clamp_rate(rate)).round().max(1.0) as u64
        };
        self.set_interval(n);
    }
}

/// Strategy selector used by [`crate::config::SamplerConfig`].
pub enum SamplerStrategy {
    None,
    Random(f64),
    Consistent(f64),
    Interval(u64),
}

pub fn build_sampler(strategy: &SamplerStrategy) -> Box<dyn Sampler> {
    match strategy {
        SamplerStrategy::None => Box::new(NoneSampler),
        SamplerStrategy::Random(p) => Box::new(RandomSampler::new(*p)),
        SamplerStrategy::Consistent(p) => {
            Box::new(ConsistentSampler::new(*p, |_level, message, _fields| {
                message.to_string()
            }))
        }
        SamplerStrategy::Interval(n) => Box::new(IntervalSampler::new(*n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_sampler_emits_first_of_every_n() {
        let sampler = IntervalSampler::new(3);
        let mut emitted = Vec::new();
        for i in 1..=20 {
            if sampler.should_sample(Level::Info, &format!("m{i}"), &vec![]) {
                emitted.push(i);
            }
        }
        assert_eq!(emitted, vec![1, 4, 7, 10, 13, 16, 19]);
    }

    #[test]
    fn consistent_sampler_is_deterministic_per_key() {
        let sampler = ConsistentSampler::new(0.5, |_l, msg, _f| msg.to_string());
        let first = sampler.should_sample(Level::Info, "stable-key", &vec![]);
        for _ in 0..10 {
            assert_eq!(
                sampler.should_sample(Level::Info, "stable-key", &vec![]),
                first
            );
        }
    }

    #[test]
    fn rate_is_clamped() {
        let sampler = RandomSampler::new(5.0);
        assert_eq!(sampler.rate(), 1.0);
        sampler.set_rate(-1.0);
        assert_eq!(sampler.rate(), 0.0);
    }
}
