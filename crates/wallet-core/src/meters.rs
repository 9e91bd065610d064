//! Resource meter calculator
//!
//! Reproduces the chain's linear mana regeneration for voting mana, downvote
//! mana and resource credits, and estimates vote payouts from the reward
//! pool. All intermediate values are arbitrary-precision integers; the only
//! float conversion happens when a finished basis-point or milli-unit value
//! is turned into a display number.
//!
//! The calculator is pure: the caller supplies `now`, so identical inputs
//! always produce identical outputs.

use std::cmp::min;

use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::amount::PriceRatio;
use crate::snapshot::{AccountSnapshot, RewardFund};

/// Seconds for an empty bar to regenerate completely (5 days).
pub const REGEN_PERIOD_SECS: u64 = 432_000;

/// 100% expressed in basis points.
pub const FULL_BPS: u32 = 10_000;

/// At or above this a bar is reported as "Full".
const FULL_DISPLAY_BPS: u32 = 9_950;

/// Full vote weight (100%).
const VOTE_WEIGHT_FULL: u32 = 10_000;

/// Share of mana spent by a full-weight vote at 100% power (1/50).
const VOTE_POWER_DIVISOR: u32 = 50;

/// Label used when a bar is full.
pub const FULL_LABEL: &str = "Full";

/// One regenerated mana bar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManaReading {
    /// Mana after regeneration
    pub current: BigUint,
    /// Capacity
    pub max: BigUint,
    /// Fill level, 0..=10000
    pub percent_bps: u32,
}

impl ManaReading {
    /// Fill level in percent with two decimals.
    pub fn percent(&self) -> f64 {
        f64::from(self.percent_bps) / 100.0
    }

    /// Seconds until the bar is full again.
    pub fn seconds_to_full(&self) -> u64 {
        seconds_to_full(self.percent_bps)
    }

    /// Human readable recharge time.
    pub fn recharge_label(&self) -> String {
        format_recharge(self.percent_bps)
    }
}

/// Regenerate a stored mana value up to `now`.
///
/// Negative stored mana is treated as empty and a zero maximum reads as a full
/// bar, so the result is always within `0..=max` and `0..=10000` bps.
pub fn regenerate(stored: &BigInt, max: &BigUint, last_update_time: u64, now: u64) -> ManaReading {
    if max.is_zero() {
        return ManaReading {
            current: BigUint::zero(),
            max: BigUint::zero(),
            percent_bps: FULL_BPS,
        };
    }

    let stored = stored.to_biguint().unwrap_or_default();
    let elapsed = now.saturating_sub(last_update_time);
    let regenerated = max * BigUint::from(elapsed) / BigUint::from(REGEN_PERIOD_SECS);
    let current = min(stored + regenerated, max.clone());
    let percent_bps = (&current * BigUint::from(FULL_BPS) / max)
        .to_u32()
        .map_or(FULL_BPS, |bps| bps.min(FULL_BPS));

    ManaReading {
        current,
        max: max.clone(),
        percent_bps,
    }
}

/// `(100 − percent) / 100 × REGEN_PERIOD`, in whole seconds.
pub fn seconds_to_full(percent_bps: u32) -> u64 {
    let missing = u64::from(FULL_BPS.saturating_sub(percent_bps));
    missing * REGEN_PERIOD_SECS / u64::from(FULL_BPS)
}

/// Format the time to full as minutes below an hour, hours below a day and
/// days otherwise; "Full" once the bar reaches 99.5%.
pub fn format_recharge(percent_bps: u32) -> String {
    if percent_bps >= FULL_DISPLAY_BPS {
        return FULL_LABEL.to_string();
    }
    let secs = seconds_to_full(percent_bps) as f64;
    if secs < 3_600.0 {
        format!("{:.0}m", secs / 60.0)
    } else if secs < 86_400.0 {
        format!("{:.1}h", secs / 3_600.0)
    } else {
        format!("{:.1}d", secs / 86_400.0)
    }
}

/// Estimated vote payout in milli-SBD.
///
/// `rshares = (bps × weight / 10000 / 50) × vests / 10000`, then
/// `payout = rshares × reward_balance / recent_claims`, converted through
/// the price. Multiplications happen before divisions to keep precision.
/// Missing or zero inputs yield zero.
pub fn vote_value(
    percent_bps: u32,
    effective_vests: &BigUint,
    reward_fund: Option<&RewardFund>,
    price: Option<&PriceRatio>,
) -> BigUint {
    let (Some(fund), Some(price)) = (reward_fund, price) else {
        return BigUint::zero();
    };
    let recent_claims = fund.recent_claims.to_biguint().unwrap_or_default();
    if recent_claims.is_zero() {
        return BigUint::zero();
    }

    let used_power = u64::from(percent_bps) * u64::from(VOTE_WEIGHT_FULL)
        / u64::from(FULL_BPS)
        / u64::from(VOTE_POWER_DIVISOR);
    let rshares = BigUint::from(used_power) * effective_vests / BigUint::from(FULL_BPS);
    let payout_steem = rshares * fund.reward_balance.non_negative() / recent_claims;
    price.steem_to_sbd(&payout_steem)
}

/// Recharge labels for each bar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeTimes {
    /// Upvote mana
    pub voting: String,
    /// Downvote mana
    pub downvote: String,
    /// Resource credits
    pub resource_credits: String,
}

/// Display-ready meters. Percentages are within `[0, 100]`; vote values are in SBD.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeters {
    /// Upvote mana percentage
    pub voting_power: f64,
    /// Downvote mana percentage
    pub downvote_power: f64,
    /// Resource credit percentage
    pub resource_credits: f64,
    /// Time to full for each bar
    pub recharge_times: RechargeTimes,
    /// Vote value at the current voting power
    pub current_vote_value: f64,
    /// Vote value at 100% voting power
    pub full_vote_value: f64,
}

/// Exact readings behind a [`ResourceMeters`] value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterReadings {
    pub voting: ManaReading,
    pub downvote: ManaReading,
    /// `None` when the snapshot carries no RC data
    pub resource_credits: Option<ManaReading>,
    pub effective_vests: BigUint,
    /// milli-SBD
    pub current_vote_value: BigUint,
    /// milli-SBD
    pub full_vote_value: BigUint,
}

impl MeterReadings {
    /// Convert to the display form.
    pub fn to_meters(&self) -> ResourceMeters {
        let (rc_percent, rc_label) = match &self.resource_credits {
            Some(rc) => (rc.percent(), rc.recharge_label()),
            None => (0.0, String::new()),
        };
        ResourceMeters {
            voting_power: self.voting.percent(),
            downvote_power: self.downvote.percent(),
            resource_credits: rc_percent,
            recharge_times: RechargeTimes {
                voting: self.voting.recharge_label(),
                downvote: self.downvote.recharge_label(),
                resource_credits: rc_label,
            },
            current_vote_value: sbd_units_to_f64(&self.current_vote_value),
            full_vote_value: sbd_units_to_f64(&self.full_vote_value),
        }
    }
}

fn sbd_units_to_f64(units: &BigUint) -> f64 {
    units.to_f64().unwrap_or(0.0) / 1_000.0
}

/// Stateless calculator entry point.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceMeterCalculator;

impl ResourceMeterCalculator {
    /// Compute display meters for a snapshot at `now` (unix seconds).
    pub fn compute(snapshot: &AccountSnapshot, now: u64) -> ResourceMeters {
        Self::readings(snapshot, now).to_meters()
    }

    /// Compute the exact readings for a snapshot at `now` (unix seconds).
    pub fn readings(snapshot: &AccountSnapshot, now: u64) -> MeterReadings {
        let effective_vests = snapshot.vesting.effective().to_biguint().unwrap_or_default();
        let voting_max = effective_vests.clone();
        let downvote_max = &voting_max / BigUint::from(4u32);

        let voting = regenerate(
            &snapshot.voting_manabar.current_mana,
            &voting_max,
            snapshot.voting_manabar.last_update_time,
            now,
        );
        let downvote = regenerate(
            &snapshot.downvote_manabar.current_mana,
            &downvote_max,
            snapshot.downvote_manabar.last_update_time,
            now,
        );
        let resource_credits = snapshot.rc_manabar.as_ref().map(|rc| {
            regenerate(
                &rc.current_mana,
                &rc.max_mana.to_biguint().unwrap_or_default(),
                rc.last_update_time,
                now,
            )
        });

        let fund = snapshot.reward_fund.as_ref();
        let price = snapshot.price.as_ref();
        let current_vote_value = vote_value(voting.percent_bps, &effective_vests, fund, price);
        let full_vote_value = vote_value(FULL_BPS, &effective_vests, fund, price);

        MeterReadings {
            voting,
            downvote,
            resource_credits,
            effective_vests,
            current_vote_value,
            full_vote_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKey;
    use crate::amount::{Asset, AssetSymbol};
    use crate::snapshot::{Balances, ManaBar, RcManaBar, Vesting};
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000;
    const MAX: u64 = 1_000_000_000;

    fn snapshot(stored: i64, last_update: u64) -> AccountSnapshot {
        AccountSnapshot {
            account: AccountKey::parse("alice").unwrap(),
            balances: Balances::default(),
            vesting: Vesting {
                own: BigInt::from(MAX),
                ..Vesting::default()
            },
            voting_manabar: ManaBar {
                current_mana: BigInt::from(stored),
                last_update_time: last_update,
            },
            downvote_manabar: ManaBar {
                current_mana: BigInt::from(stored / 4),
                last_update_time: last_update,
            },
            rc_manabar: Some(RcManaBar {
                current_mana: BigInt::from(stored),
                max_mana: BigInt::from(MAX),
                last_update_time: last_update,
            }),
            reward_fund: None,
            price: None,
            reputation: BigInt::zero(),
        }
    }

    #[test]
    fn full_regeneration_after_five_days() {
        let meters = ResourceMeterCalculator::compute(&snapshot(0, NOW - 432_000), NOW);
        assert_eq!(meters.voting_power, 100.0);
        assert_eq!(meters.recharge_times.voting, "Full");
        assert_eq!(meters.resource_credits, 100.0);
    }

    #[test]
    fn half_regeneration_after_two_and_a_half_days() {
        let meters = ResourceMeterCalculator::compute(&snapshot(0, NOW - 216_000), NOW);
        assert_eq!(meters.voting_power, 50.0);
        assert_eq!(meters.recharge_times.voting, "2.5d");
        assert_eq!(meters.downvote_power, 50.0);
    }

    #[test]
    fn recharge_labels_switch_units() {
        assert_eq!(format_recharge(9_990), "Full");
        // 0.6% missing = 2592s
        assert_eq!(format_recharge(9_940), "43m");
        assert_eq!(format_recharge(9_900), "1.2h");
        // 10% missing = 43200s = 12 hours
        assert_eq!(format_recharge(9_000), "12.0h");
        assert_eq!(format_recharge(0), "5.0d");
    }

    #[test]
    fn zero_max_mana_reads_full() {
        let reading = regenerate(&BigInt::from(5), &BigUint::zero(), 0, NOW);
        assert_eq!(reading.percent_bps, FULL_BPS);
        assert_eq!(reading.recharge_label(), "Full");
    }

    #[test]
    fn future_update_time_does_not_underflow() {
        let reading = regenerate(&BigInt::from(100), &BigUint::from(1_000u32), NOW + 50, NOW);
        assert_eq!(reading.percent_bps, 1_000);
    }

    #[test]
    fn vote_value_requires_price_and_claims() {
        let vests = BigUint::from(1_000_000_000_000u64);
        let fund = RewardFund {
            reward_balance: Asset::parse("800000.000 STEEM").unwrap(),
            recent_claims: BigInt::from(400_000_000_000_000u64),
        };
        let price = PriceRatio::from_decimal("0.25").unwrap();
        assert!(vote_value(FULL_BPS, &vests, Some(&fund), None).is_zero());

        let empty_fund = RewardFund {
            reward_balance: Asset::zero(AssetSymbol::Steem),
            recent_claims: BigInt::zero(),
        };
        assert!(vote_value(FULL_BPS, &vests, Some(&empty_fund), Some(&price)).is_zero());

        // used power 200 → rshares = 200 * 1e12 / 1e4 = 2e10
        // payout = 2e10 * 8e8 / 4e14 = 40000 milli-STEEM → 10000 milli-SBD
        let full = vote_value(FULL_BPS, &vests, Some(&fund), Some(&price));
        assert_eq!(full, BigUint::from(10_000u32));
        let half = vote_value(5_000, &vests, Some(&fund), Some(&price));
        assert_eq!(half, BigUint::from(5_000u32));
    }

    #[test]
    fn missing_price_reports_zero_values_without_failing() {
        let mut snap = snapshot(0, NOW - 216_000);
        snap.reward_fund = Some(RewardFund {
            reward_balance: Asset::parse("800000.000 STEEM").unwrap(),
            recent_claims: BigInt::from(400_000_000_000_000u64),
        });
        let meters = ResourceMeterCalculator::compute(&snap, NOW);
        assert_eq!(meters.current_vote_value, 0.0);
        assert_eq!(meters.full_vote_value, 0.0);
        assert_eq!(meters.voting_power, 50.0);
    }

    #[test]
    fn missing_rc_reads_empty() {
        let mut snap = snapshot(0, NOW);
        snap.rc_manabar = None;
        let meters = ResourceMeterCalculator::compute(&snap, NOW);
        assert_eq!(meters.resource_credits, 0.0);
        assert!(meters.recharge_times.resource_credits.is_empty());
    }

    proptest! {
        #[test]
        fn percentages_stay_within_bounds(
            stored in any::<i64>(),
            max in any::<u64>(),
            last in any::<u64>(),
            now in any::<u64>(),
        ) {
            let reading = regenerate(&BigInt::from(stored), &BigUint::from(max), last, now);
            prop_assert!(reading.percent() >= 0.0 && reading.percent() <= 100.0);
            prop_assert!(reading.current <= reading.max);
        }

        #[test]
        fn compute_is_deterministic(stored in 0i64..2_000_000_000, age in 0u64..1_000_000) {
            let snap = snapshot(stored, NOW - age);
            let a = ResourceMeterCalculator::compute(&snap, NOW);
            let b = ResourceMeterCalculator::compute(&snap, NOW);
            prop_assert_eq!(a.voting_power.to_bits(), b.voting_power.to_bits());
            prop_assert_eq!(a.resource_credits.to_bits(), b.resource_credits.to_bits());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn regeneration_is_monotonic(stored in 0i64..999_999_999, t1 in 0u64..600_000, dt in 1u64..600_000) {
            let snap = snapshot(stored, NOW);
            let earlier = ResourceMeterCalculator::compute(&snap, NOW + t1);
            let later = ResourceMeterCalculator::compute(&snap, NOW + t1 + dt);
            prop_assert!(later.voting_power >= earlier.voting_power);
            prop_assert!(later.downvote_power >= earlier.downvote_power);
        }
    }
}
