//! Hysteresis engine: prevents alert fatigue when a loan flaps around a tier boundary.
//!
//! Prices move on every tick, so a loan sitting near 90% of its threshold can
//! cross between `medium` and `high` over and over. The hysteresis engine
//! requires the loan to stay at or above the alert tier for N consecutive
//! price ticks before firing, and after firing only fires again when the
//! loan escalates to a worse tier.
//!
//! State is held in-memory per loan ID and records tiers only, never an
//! assessment. If the process restarts, hysteresis resets.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use loanwatch_common::types::RiskTier;

/// Default number of consecutive ticks required before an alert fires.
pub const DEFAULT_HYSTERESIS_TICKS: u64 = 1;

/// Per-loan hysteresis tracking state.
#[derive(Debug, Clone)]
struct HysteresisState {
    /// Number of consecutive ticks at or above the alert tier.
    consecutive_count: u64,
    /// Tick when the streak started.
    first_qualified_tick: u64,
    /// Most recent tick in the streak.
    last_tick: Option<u64>,
    /// Worst tier alerted since the loan last fell below the alert tier.
    /// A tick gap restarts the streak but keeps this.
    alerted_tier: Option<RiskTier>,
}

/// In-memory tier hysteresis engine.
pub struct TierHysteresis {
    required_ticks: u64,
    min_tier: RiskTier,
    states: HashMap<Uuid, HysteresisState>,
}

impl TierHysteresis {
    /// `required_ticks` below 1 is treated as 1.
    pub fn new(required_ticks: u64, min_tier: RiskTier) -> Self {
        Self {
            required_ticks: required_ticks.max(1),
            min_tier,
            states: HashMap::new(),
        }
    }

    pub fn min_tier(&self) -> RiskTier {
        self.min_tier
    }

    /// Record a loan's tier at a price tick and decide whether to alert.
    ///
    /// - `loan_id`: the loan being evaluated
    /// - `tier`: the loan's tier at this tick
    /// - `tick`: monotonically increasing price-tick number
    ///
    /// Returns `true` when the loan has been at or above the alert tier for
    /// the required number of consecutive ticks and `tier` is worse than any
    /// tier already alerted since the loan last fell below the alert tier.
    pub fn check(&mut self, loan_id: Uuid, tier: RiskTier, tick: u64) -> bool {
        if tier < self.min_tier {
            // Below alert tier → reset state
            self.states.remove(&loan_id);
            return false;
        }

        let state = self.states.entry(loan_id).or_insert(HysteresisState {
            consecutive_count: 0,
            first_qualified_tick: tick,
            last_tick: None,
            alerted_tier: None,
        });

        match state.last_tick {
            // Same tick again: idempotent
            Some(last) if last == tick => {}
            None => {
                state.consecutive_count = 1;
                state.last_tick = Some(tick);
            }
            Some(last) if tick == last + 1 => {
                state.consecutive_count += 1;
                state.last_tick = Some(tick);
            }
            Some(_) => {
                // Gap in ticks → restart streak
                state.consecutive_count = 1;
                state.first_qualified_tick = tick;
                state.last_tick = Some(tick);
            }
        }

        if state.consecutive_count < self.required_ticks {
            return false;
        }

        match state.alerted_tier {
            Some(alerted) if tier <= alerted => {
                tracing::debug!(
                    loan_id = %loan_id,
                    tier = %tier,
                    alerted_tier = %alerted,
                    streak_start = state.first_qualified_tick,
                    "Alert suppressed: tier already alerted"
                );
                false
            }
            _ => {
                state.alerted_tier = Some(tier);
                true
            }
        }
    }

    /// Reset hysteresis state for a loan.
    pub fn reset(&mut self, loan_id: Uuid) {
        self.states.remove(&loan_id);
    }

    /// Drop state for loans that are no longer being monitored.
    pub fn retain_loans(&mut self, live: &HashSet<Uuid>) {
        self.states.retain(|id, _| live.contains(id));
    }

    /// Get the number of tracked loans (for monitoring).
    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for TierHysteresis {
    fn default() -> Self {
        Self::new(DEFAULT_HYSTERESIS_TICKS, RiskTier::High)
    }
}
