//! Run-time settings.

use once_cell::sync::OnceCell;
use std::env;

/// Bounds that keep a walk from running away on garbage registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WalkLimits {
    /// Addresses below this (or this close to the top of the address space)
    /// are never code.
    pub min_valid_pc: usize,
    /// How far above the initial sp a walk may reach.
    pub max_walk_size: usize,
    /// The largest single frame.
    pub max_frame_size: usize,
    /// A PLT stub has pushed its second word once `pc & 15` reaches this.
    pub plt_parity_threshold: usize,
}

impl WalkLimits {
    pub const DEFAULT: WalkLimits = WalkLimits {
        min_valid_pc: 0x1000,
        max_walk_size: 0x100000,
        max_frame_size: 0x40000,
        plt_parity_threshold: 11,
    };
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub limits: WalkLimits,
    /// Initial state of the global enable flag.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: WalkLimits::DEFAULT,
            enabled: true,
        }
    }
}

impl Config {
    /// Defaults overridden by `CGOTRACEBACK_ENABLED`,
    /// `CGOTRACEBACK_MAX_FRAME_SIZE` and `CGOTRACEBACK_MAX_WALK_SIZE`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("CGOTRACEBACK_ENABLED") {
            config.enabled = !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off");
        }
        if let Some(size) = lookup("CGOTRACEBACK_MAX_FRAME_SIZE").and_then(|v| parse_size(&v)) {
            config.limits.max_frame_size = size;
        }
        if let Some(size) = lookup("CGOTRACEBACK_MAX_WALK_SIZE").and_then(|v| parse_size(&v)) {
            config.limits.max_walk_size = size;
        }
        config
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

static LIMITS: OnceCell<WalkLimits> = OnceCell::new();

/// Stores `limits` unless some were stored already. Returns whether they
/// were taken.
pub(crate) fn set_limits(limits: WalkLimits) -> bool {
    LIMITS.set(limits).is_ok()
}

/// The limits in effect; the defaults before [crate::init_with] ran.
#[inline]
pub fn limits() -> &'static WalkLimits {
    LIMITS.get().unwrap_or(&WalkLimits::DEFAULT)
}
