//! Weighted prize selection.
//!
//! ALGORITHM (fixed, published, integer-only so replays are bit-exact):
//!   1. Offered tiers: regular tiers with remaining > 0, ordered by level
//!      ascending (level 1 = top prize). The last-one tier is never offered.
//!   2. Effective weight, with r = profit rate in thousandths and
//!      W = Σ declared weights of the offered tiers:
//!        r <= 1000 : effective(w) = w
//!        r >  1000 : c = max(1, W·1000 / (r − 1000))
//!                    effective(w) = max(1, w·2^32 / (w + c))
//!      The transform is non-decreasing in w, so declared-weight ordering is
//!      preserved, and it compresses heavy tiers harder as r grows.
//!   3. target = random_value mod Σ effective.
//!   4. Walk the cumulative distribution; tier i owns [lower_i, upper_i).
//!
//! The final ticket of a product never reaches step 1: see
//! `is_final_ticket`.

use crate::{
    error::{DrawError, DrawResult},
    types::{TicketNumber, TierId},
};
use serde::{Deserialize, Serialize};

/// Profit rate fixed point: 1000 = 1.0.
pub const PROFIT_RATE_UNIT: u64 = 1000;

const EFFECTIVE_SCALE: u128 = 1 << 32;

/// One offered tier as recorded in a draw snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierWeight {
    pub tier_id: TierId,
    pub level:   u32,
    pub weight:  u64,
}

/// Everything needed to replay one ticket's selection.
/// Stored as JSON on every ticket record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawSnapshot {
    pub profit_rate_milli: u64,
    pub total_tickets:     u64,
    /// Number of tickets issued for the product before this one.
    pub position:          u64,
    pub last_one_tier:     Option<TierId>,
    /// Offered regular tiers, level ascending.
    pub tiers:             Vec<TierWeight>,
}

impl DrawSnapshot {
    /// Resolve the winning tier for `random_value`.
    /// Returns the tier and whether it is the last-one award.
    pub fn resolve(&self, random_value: u64) -> DrawResult<(TierId, bool)> {
        if let Some(last) = &self.last_one_tier {
            if is_final_ticket(self.position, self.total_tickets) {
                return Ok((last.clone(), true));
            }
        }
        let weighted = effective_weights(&self.tiers, self.profit_rate_milli)?;
        Ok((select(random_value, &weighted)?, false))
    }
}

/// Convert an operator profit rate into the fixed-point form the selector
/// uses. Non-finite or non-positive rates yield `None`.
pub fn profit_rate_milli(rate: f64) -> Option<u64> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    let milli = (rate * PROFIT_RATE_UNIT as f64).round();
    if milli < 1.0 || milli > u64::MAX as f64 {
        return None;
    }
    Some(milli as u64)
}

/// Step 2: declared weights → effective weights, in input order.
pub fn effective_weights(
    tiers: &[TierWeight],
    profit_rate_milli: u64,
) -> DrawResult<Vec<(TierId, u64)>> {
    if let Some(bad) = tiers.iter().find(|t| t.weight == 0) {
        return Err(DrawError::InvalidWeight {
            tier_id: bad.tier_id.clone(),
        });
    }
    if profit_rate_milli <= PROFIT_RATE_UNIT {
        return Ok(tiers.iter().map(|t| (t.tier_id.clone(), t.weight)).collect());
    }

    let declared_total: u128 = tiers.iter().map(|t| t.weight as u128).sum();
    let excess = (profit_rate_milli - PROFIT_RATE_UNIT) as u128;
    let c = (declared_total * PROFIT_RATE_UNIT as u128 / excess).max(1);

    Ok(tiers
        .iter()
        .map(|t| {
            let w = t.weight as u128;
            let scaled = (w * EFFECTIVE_SCALE / (w + c)).max(1);
            // scaled < 2^32, always fits
            (t.tier_id.clone(), scaled as u64)
        })
        .collect())
}

/// Steps 3–4: pick exactly one tier with half-open cumulative intervals.
pub fn select(random_value: u64, weighted: &[(TierId, u64)]) -> DrawResult<TierId> {
    if weighted.is_empty() {
        return Err(DrawError::InventoryExhausted);
    }
    if let Some((tier_id, _)) = weighted.iter().find(|(_, w)| *w == 0) {
        return Err(DrawError::InvalidWeight {
            tier_id: tier_id.clone(),
        });
    }

    let total: u128 = weighted.iter().map(|(_, w)| *w as u128).sum();
    let target = random_value as u128 % total;

    let mut upper: u128 = 0;
    for (tier_id, w) in weighted {
        upper += *w as u128;
        if target < upper {
            return Ok(tier_id.clone());
        }
    }
    // target < total, so the walk always returns above.
    Err(DrawError::InventoryExhausted)
}

/// True when the ticket about to be issued is the product's last one:
/// `issued_before == total_tickets − 1`.
pub fn is_final_ticket(issued_before: TicketNumber, total_tickets: u64) -> bool {
    total_tickets > 0 && issued_before + 1 == total_tickets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(id: &str, level: u32, weight: u64) -> TierWeight {
        TierWeight { tier_id: id.into(), level, weight }
    }

    fn pairs(items: &[(&str, u64)]) -> Vec<(TierId, u64)> {
        items.iter().map(|(id, w)| (id.to_string(), *w)).collect()
    }

    #[test]
    fn half_open_boundaries_belong_to_the_next_tier() {
        let w = pairs(&[("A", 1), ("B", 9)]);
        assert_eq!(select(0, &w).unwrap(), "A");
        assert_eq!(select(1, &w).unwrap(), "B");
        assert_eq!(select(9, &w).unwrap(), "B");
        assert_eq!(select(10, &w).unwrap(), "A"); // wraps: 10 mod 10 = 0
        assert_eq!(select(11, &w).unwrap(), "B");
    }

    #[test]
    fn empty_tier_set_is_inventory_exhausted() {
        assert!(matches!(select(42, &[]), Err(DrawError::InventoryExhausted)));
    }

    #[test]
    fn zero_weight_is_rejected() {
        let err = effective_weights(&[tier("A", 1, 0)], PROFIT_RATE_UNIT).unwrap_err();
        assert!(matches!(err, DrawError::InvalidWeight { tier_id } if tier_id == "A"));
    }

    #[test]
    fn unit_profit_rate_keeps_declared_weights() {
        let tiers = [tier("A", 1, 1), tier("B", 2, 9)];
        let w = effective_weights(&tiers, PROFIT_RATE_UNIT).unwrap();
        assert_eq!(w, pairs(&[("A", 1), ("B", 9)]));
    }

    #[test]
    fn higher_profit_rate_compresses_heavy_tiers_and_keeps_order() {
        let tiers = [tier("A", 1, 1), tier("B", 2, 4), tier("C", 3, 15)];
        let base = effective_weights(&tiers, 1000).unwrap();
        let skewed = effective_weights(&tiers, 3000).unwrap();

        let share = |w: &[(TierId, u64)], i: usize| {
            w[i].1 as f64 / w.iter().map(|(_, x)| *x as f64).sum::<f64>()
        };
        assert!(share(&skewed, 2) < share(&base, 2));
        assert!(skewed[0].1 <= skewed[1].1 && skewed[1].1 <= skewed[2].1);
        assert!(skewed.iter().all(|(_, w)| *w >= 1));
    }

    #[test]
    fn profit_rate_conversion() {
        assert_eq!(profit_rate_milli(1.0), Some(1000));
        assert_eq!(profit_rate_milli(1.25), Some(1250));
        assert_eq!(profit_rate_milli(0.0), None);
        assert_eq!(profit_rate_milli(-2.0), None);
        assert_eq!(profit_rate_milli(f64::NAN), None);
    }

    #[test]
    fn final_ticket_bypasses_selection() {
        let snap = DrawSnapshot {
            profit_rate_milli: 1000,
            total_tickets: 3,
            position: 2,
            last_one_tier: Some("LAST".into()),
            tiers: vec![],
        };
        assert_eq!(snap.resolve(12345).unwrap(), ("LAST".to_string(), true));

        let earlier = DrawSnapshot { position: 1, ..snap };
        assert!(matches!(earlier.resolve(1), Err(DrawError::InventoryExhausted)));
    }

    #[test]
    fn final_ticket_detection() {
        assert!(is_final_ticket(2, 3));
        assert!(!is_final_ticket(1, 3));
        assert!(is_final_ticket(0, 1));
        assert!(!is_final_ticket(0, 0));
    }
}
