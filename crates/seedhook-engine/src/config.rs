//! Hook configuration.
//!
//! A [`HookConfig`] is replaced wholesale by [`SeedHook::set_config`]. The
//! initial value can be taken from the environment:
//! - `SEEDHOOK_FLAGS`: flag list, e.g. `enabled|record-seed|hook2` or `0x13`
//! - `SEEDHOOK_CAPACITY`: ring capacity in records (default 1024)
//! - `SEEDHOOK_FUZZ_PROBABILITY`: inline mutation probability, 0-100
//!
//! Unparseable values fall back to the defaults.
//!
//! [`SeedHook::set_config`]: crate::SeedHook::set_config

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Default ring capacity installed at construction.
pub const DEFAULT_CAPACITY: u32 = 1024;

/// Upper bound applied to `mutation_probability` on use.
pub const MAX_MUTATION_PROBABILITY: u32 = 100;

bitflags! {
    /// Configuration flag bits. Values are part of the control protocol.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HookFlags: u32 {
        /// Engine active; gates Hook 1 and everything behind it.
        const ENABLED = 0x0000_0001;
        /// Store seeds in the ring.
        const RECORD_SEED = 0x0000_0002;
        /// Mutate a copy of outgoing RPC parameters.
        const INLINE_FUZZ = 0x0000_0004;
        /// Store response bytes alongside the request.
        const RECORD_RESPONSE = 0x0000_0008;
        /// Activate Hook 2 and the dedup correlator.
        const HOOK2_ENABLED = 0x0000_0010;
    }
}

impl HookFlags {
    /// Parse a flag list (case-insensitive).
    ///
    /// Tokens are separated by `|`, `,`, `+` or whitespace. A single numeric
    /// token (`19` or `0x13`) is taken as raw bits. Unknown tokens are ignored.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        let trimmed = s.trim();
        if let Some(bits) = parse_u32(trimmed) {
            return Self::from_bits_truncate(bits);
        }

        let mut flags = Self::empty();
        for token in trimmed
            .split(|c: char| matches!(c, '|' | ',' | '+') || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            flags |= match token.to_ascii_lowercase().replace('_', "-").as_str() {
                "enabled" | "enable" | "on" | "hook1" => Self::ENABLED,
                "record-seed" | "record" | "seed" | "seeds" => Self::RECORD_SEED,
                "inline-fuzz" | "fuzz" | "mutate" => Self::INLINE_FUZZ,
                "record-response" | "response" | "responses" => Self::RECORD_RESPONSE,
                "hook2" | "hook2-enabled" => Self::HOOK2_ENABLED,
                "all" => Self::all(),
                _ => Self::empty(),
            };
        }
        flags
    }
}

/// Engine configuration snapshot.
///
/// The backing-buffer location is deliberately not part of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookConfig {
    pub flags: HookFlags,
    /// Ring capacity in records. Zero means no ring is allocated.
    pub capacity: u32,
    /// Percent chance (0-100) that an RPC-path call is mutated. Larger values
    /// are accepted and clamped on use.
    pub mutation_probability: u32,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            flags: HookFlags::empty(),
            capacity: DEFAULT_CAPACITY,
            mutation_probability: 0,
        }
    }
}

impl HookConfig {
    /// All-zero snapshot returned when the engine is not initialized.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            flags: HookFlags::empty(),
            capacity: 0,
            mutation_probability: 0,
        }
    }

    /// Configuration with the given flags and default capacity.
    #[must_use]
    pub fn with_flags(flags: HookFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// Builder-style capacity override.
    #[must_use]
    pub const fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder-style probability override.
    #[must_use]
    pub const fn mutation_probability(mut self, probability: u32) -> Self {
        self.mutation_probability = probability;
        self
    }

    /// Probability clamped to `[0, 100]`.
    #[must_use]
    pub fn clamped_probability(&self) -> u32 {
        self.mutation_probability.min(MAX_MUTATION_PROBABILITY)
    }

    /// Build a configuration from `SEEDHOOK_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            flags: lookup("SEEDHOOK_FLAGS")
                .map(|v| HookFlags::from_str_loose(&v))
                .unwrap_or(defaults.flags),
            capacity: lookup("SEEDHOOK_CAPACITY")
                .and_then(|v| parse_u32(v.trim()))
                .unwrap_or(defaults.capacity),
            mutation_probability: lookup("SEEDHOOK_FUZZ_PROBABILITY")
                .and_then(|v| parse_u32(v.trim()))
                .unwrap_or(defaults.mutation_probability),
        }
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    let s = s.replace('_', "");
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_flag_lists() {
        assert_eq!(
            HookFlags::from_str_loose("enabled|record-seed"),
            HookFlags::ENABLED | HookFlags::RECORD_SEED
        );
        assert_eq!(
            HookFlags::from_str_loose("ENABLED, Record_Seed + hook2"),
            HookFlags::ENABLED | HookFlags::RECORD_SEED | HookFlags::HOOK2_ENABLED
        );
        assert_eq!(HookFlags::from_str_loose("fuzz response"), HookFlags::INLINE_FUZZ | HookFlags::RECORD_RESPONSE);
        assert_eq!(HookFlags::from_str_loose("all"), HookFlags::all());
        assert_eq!(HookFlags::from_str_loose("bogus"), HookFlags::empty());
        assert_eq!(HookFlags::from_str_loose(""), HookFlags::empty());
    }

    #[test]
    fn parse_numeric_flags() {
        assert_eq!(HookFlags::from_str_loose("0x13").bits(), 0x13);
        assert_eq!(HookFlags::from_str_loose("3"), HookFlags::ENABLED | HookFlags::RECORD_SEED);
        // Unknown bits are dropped.
        assert_eq!(HookFlags::from_str_loose("0xff").bits(), 0x1f);
    }

    #[test]
    fn default_is_disabled_with_1024_slots() {
        let cfg = HookConfig::default();
        assert!(cfg.flags.is_empty());
        assert_eq!(cfg.capacity, 1024);
        assert_eq!(cfg.mutation_probability, 0);
    }

    #[test]
    fn probability_is_clamped_not_rejected() {
        let cfg = HookConfig::default().mutation_probability(250);
        assert_eq!(cfg.mutation_probability, 250);
        assert_eq!(cfg.clamped_probability(), 100);
        assert_eq!(HookConfig::default().mutation_probability(37).clamped_probability(), 37);
    }

    #[test]
    fn env_lookup_overrides_and_falls_back() {
        let vars: HashMap<&str, &str> = [
            ("SEEDHOOK_FLAGS", "enabled|seed"),
            ("SEEDHOOK_CAPACITY", "0x40"),
            ("SEEDHOOK_FUZZ_PROBABILITY", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let cfg = HookConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(cfg.flags, HookFlags::ENABLED | HookFlags::RECORD_SEED);
        assert_eq!(cfg.capacity, 64);
        assert_eq!(cfg.mutation_probability, 0);

        let empty = HookConfig::from_lookup(|_| None);
        assert_eq!(empty, HookConfig::default());
    }
}
