//! Two-dimensional random walk over entropy bits.
//!
//! Each byte is consumed as four bit pairs, lowest bits first. The first bit
//! of a pair moves x, the second moves y, one fixed step up for a `1` and
//! down otherwise. Positions are clamped to `[-bound, bound]`. An unbiased
//! source produces a walk with no visible drift; short-range bias shows up
//! as streaks, which is why points are kept in strict processing order.
//!
//! The walk is for visual audit only and is never part of delivered output.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

/// One walk position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkPoint {
    pub x: f64,
    pub y: f64,
}

/// `[walk]` section: bound and step of the lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    pub bound: f64,
    pub step: f64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            bound: 8.0,
            step: 0.1,
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.bound.is_finite()
            && self.step.is_finite()
            && self.bound > 0.0
            && self.step > 0.0
            && self.step <= self.bound;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidWalk)
        }
    }
}

/// Running walk state.
///
/// Positions are tracked as whole steps so that repeated stepping cannot
/// accumulate floating-point drift past the bound.
#[derive(Debug, Clone)]
pub struct WalkTransform {
    step: f64,
    bound: f64,
    limit: i64,
    x: i64,
    y: i64,
}

impl WalkTransform {
    /// Starts a walk at the origin.
    pub fn new(config: &WalkConfig) -> Self {
        let limit = (config.bound / config.step + 1e-9).floor() as i64;
        Self {
            step: config.step,
            bound: config.bound,
            limit,
            x: 0,
            y: 0,
        }
    }

    /// Starts a walk at the lattice point nearest `(x, y)`, clamped to the bound.
    pub fn starting_at(config: &WalkConfig, x: f64, y: f64) -> Self {
        let mut walk = Self::new(config);
        walk.x = walk.to_steps(x);
        walk.y = walk.to_steps(y);
        walk
    }

    /// Current position.
    pub fn position(&self) -> WalkPoint {
        WalkPoint {
            x: self.to_coord(self.x),
            y: self.to_coord(self.y),
        }
    }

    /// Advances the walk over `bytes`, appending four points per byte.
    pub fn extend(&mut self, bytes: &[u8], out: &mut Vec<WalkPoint>) {
        out.reserve(bytes.len() * 4);
        for &byte in bytes {
            let mut bits = byte;
            for _ in 0..4 {
                self.x = Self::advance(self.x, bits & 1 == 1, self.limit);
                bits >>= 1;
                self.y = Self::advance(self.y, bits & 1 == 1, self.limit);
                bits >>= 1;
                out.push(self.position());
            }
        }
    }

    /// Convenience wrapper returning the points for `bytes`.
    pub fn walk(&mut self, bytes: &[u8]) -> Vec<WalkPoint> {
        let mut out = Vec::new();
        self.extend(bytes, &mut out);
        out
    }

    // A set bit at the upper bound falls through to the downward step.
    fn advance(pos: i64, up: bool, limit: i64) -> i64 {
        if up && pos < limit {
            pos + 1
        } else if pos > -limit {
            pos - 1
        } else {
            pos
        }
    }

    fn to_coord(&self, steps: i64) -> f64 {
        (steps as f64 * self.step).clamp(-self.bound, self.bound)
    }

    fn to_steps(&self, coord: f64) -> i64 {
        ((coord / self.step).round() as i64).clamp(-self.limit, self.limit)
    }
}
