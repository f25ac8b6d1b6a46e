//! # Gate
//!
//! The first stop for every submitted record, run synchronously on the
//! producer thread so rejected work never reaches the ingestion channel.
//! Order of evaluation is level check, then filter chain, then sampler —
//! each stage short-circuits the next on rejection.

use parking_lot::RwLock;

use crate::filter::FilterChain;
use crate::record::{Fields, Level};
use crate::sampler::{build_sampler, NoneSampler, Sampler, SamplerStrategy};

/// Gate configuration and runtime state, shared by all producer threads.
pub struct Gate {
    min_level: RwLock<Level>,
    filters: RwLock<FilterChain>,
    sampler: RwLock<Box<dyn Sampler>>,
}

impl Gate {
    pub fn new(min_level: Level) -> Self {
        Gate {
            min_level: RwLock::new(min_level),
            filters: RwLock::new(FilterChain::default()),
            sampler: RwLock::new(Box::new(NoneSampler)),
        }
    }

    pub fn set_min_level(&self, level: Level) {
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> Level {
        *self.min_level.read()
    }

    pub fn set_filters(&self, chain: FilterChain) {
        *self.filters.write() = chain;
    }

    pub fn with_filters_mut(&self, f: impl FnOnce(&mut FilterChain)) {
        f(&mut self.filters.write());
    }

    pub fn set_sampler(&self, strategy: &SamplerStrategy) {
        *self.sampler.write() = build_sampler(strategy);
    }

    /// Returns `true` if the record should be submitted to the channel.
    pub fn admit(&self, level: Level, message: &str, fields: &Fields) -> bool {
        if level < *self.min_level.read() {
            return false;
        }
        if !self.filters.read().evaluate(level, message, fields) {
            return false;
        }
        self.sampler.read().should_sample(level, message, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ExcludeRegexFilter;

    #[test]
    fn level_below_minimum_is_rejected() {
        let gate = Gate::new(Level::Info);
        assert!(!gate.admit(Level::Debug, "msg", &vec![]));
        assert!(gate.admit(Level::Info, "msg", &vec![]));
    }

    #[test]
    fn filter_rejection_short_circuits_sampler() {
        let gate = Gate::new(Level::Trace);
        gate.with_filters_mut(|chain| {
            chain.push(Box::new(ExcludeRegexFilter::new("secret").unwrap()));
        });
        gate.set_sampler(&SamplerStrategy::Interval(1));
        assert!(!gate.admit(Level::Info, "secret value", &vec![]));
        assert!(gate.admit(Level::Info, "public value", &vec![]));
    }

    #[test]
    fn interval_sampler_applies_after_filters_pass() {
        let gate = Gate::new(Level::Trace);
        gate.set_sampler(&SamplerStrategy::Interval(2));
        let admitted: Vec<bool> = (0..4).map(|_| gate.admit(Level::Info, "m", &vec![])).collect();
        assert_eq!(admitted, vec![true, false, true, false]);
    }
}
