// ===============================
// src/curve.rs (bell-curve liquidity plan)
// ===============================
//
// For every tick in [center - radius, center + radius]:
//   weight   = exp(-(tick - center)^2 / (2 * stddev^2))
//   amount_X = floor(peak_X * weight * r),   r ~ U[1 - jitter, 1 + jitter]
// One draw per tick, shared by both legs, so the A:B ratio at a tick follows
// the curve. A tick whose legs both floor to zero is left for the caller to skip.
//
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeedError};
use crate::slot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub center: i64,
    pub radius: u32,
    pub stddev: f64,
    pub peak_a: u64,
    pub peak_b: u64,
    pub jitter: f64,
}

impl CurveParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.stddev.is_finite() && self.stddev > 0.0) {
            return Err(SeedError::Config(format!(
                "curve stddev must be > 0, got {}",
                self.stddev
            )));
        }
        if !(self.jitter.is_finite() && (0.0..1.0).contains(&self.jitter)) {
            return Err(SeedError::Config(format!(
                "curve jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        let (lo, hi) = self.tick_bounds();
        slot::encode(lo)?;
        slot::encode(hi)?;
        Ok(())
    }

    pub fn tick_bounds(&self) -> (i64, i64) {
        let r = self.radius as i64;
        (self.center.saturating_sub(r), self.center.saturating_add(r))
    }
}

/// Per-tick deposit. Derived each run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickAllocation {
    pub tick: i64,
    pub amount_a: u64,
    pub amount_b: u64,
}

impl TickAllocation {
    pub fn is_empty(&self) -> bool {
        self.amount_a == 0 && self.amount_b == 0
    }
}

pub fn weight(tick: i64, center: i64, stddev: f64) -> f64 {
    let d = (tick - center) as f64;
    (-(d * d) / (2.0 * stddev * stddev)).exp()
}

fn scaled(peak: u64, w: f64, r: f64) -> u64 {
    let v = (peak as f64 * w * r).floor();
    if v <= 0.0 {
        0
    } else {
        v as u64
    }
}

/// Allocation for every tick of the range, in increasing tick order.
pub fn plan<R: Rng + ?Sized>(params: &CurveParams, rng: &mut R) -> Result<Vec<TickAllocation>> {
    params.validate()?;
    let (lo, hi) = params.tick_bounds();
    let j = params.jitter;

    let mut out = Vec::with_capacity((hi - lo + 1) as usize);
    for tick in lo..=hi {
        let w = weight(tick, params.center, params.stddev);
        let r = if j == 0.0 {
            1.0
        } else {
            rng.gen_range((1.0 - j)..=(1.0 + j))
        }
        .max(0.0);
        out.push(TickAllocation {
            tick,
            amount_a: scaled(params.peak_a, w, r),
            amount_b: scaled(params.peak_b, w, r),
        });
    }
    Ok(out)
}

/// Sum of both legs over the plan.
pub fn totals(plan: &[TickAllocation]) -> (u64, u64) {
    plan.iter().fold((0u64, 0u64), |(a, b), t| {
        (a.saturating_add(t.amount_a), b.saturating_add(t.amount_b))
    })
}
