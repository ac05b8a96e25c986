//! Product and prize-tier definitions supplied by the catalog/admin surface.

use crate::{
    error::{DrawError, DrawResult},
    selector::profit_rate_milli,
    types::{ProductId, TierId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound on tickets per product. Random checkouts list every free
/// number, so this also bounds that allocation.
pub const MAX_TICKETS_PER_PRODUCT: u64 = 10_000_000;

/// Counters and weights are stored as SQLite INTEGER.
const MAX_STORED: u64 = i64::MAX as u64;

fn default_profit_rate() -> f64 {
    1.0
}

/// A product as submitted for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSpec {
    pub product_id:    ProductId,
    pub title:         String,
    pub total_tickets: u64,
    #[serde(default = "default_profit_rate")]
    pub profit_rate:   f64,
    pub tiers:         Vec<TierSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier_id:  TierId,
    pub level:    u32,
    pub label:    String,
    #[serde(default)]
    pub weight:   u64,
    pub total:    u64,
    #[serde(default)]
    pub last_one: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    OnSale,
    SoldOut,
    Closed,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnSale  => "on_sale",
            Self::SoldOut => "sold_out",
            Self::Closed  => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on_sale"  => Some(Self::OnSale),
            "sold_out" => Some(Self::SoldOut),
            "closed"   => Some(Self::Closed),
            _ => None,
        }
    }

    /// Seeds may be revealed once no further ticket can be drawn.
    pub fn allows_reveal(&self) -> bool {
        matches!(self, Self::SoldOut | Self::Closed)
    }
}

/// Current product state as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id:        ProductId,
    pub title:             String,
    pub total_tickets:     u64,
    pub remaining:         u64,
    pub profit_rate_milli: u64,
    pub status:            ProductStatus,
}

/// Current tier state as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeTier {
    pub tier_id:   TierId,
    pub level:     u32,
    pub label:     String,
    pub weight:    u64,
    pub total:     u64,
    pub remaining: u64,
    pub last_one:  bool,
}

impl ProductSpec {
    /// Validate and return the fixed-point profit rate.
    pub fn validate(&self) -> DrawResult<u64> {
        let invalid = |reason: String| DrawError::InvalidCatalog {
            product_id: self.product_id.clone(),
            reason,
        };

        if self.product_id.trim().is_empty() {
            return Err(invalid("product id is empty".into()));
        }
        if self.total_tickets == 0 {
            return Err(invalid("total_tickets must be at least 1".into()));
        }
        if self.total_tickets > MAX_TICKETS_PER_PRODUCT {
            return Err(invalid(format!(
                "total_tickets {} exceeds the limit of {MAX_TICKETS_PER_PRODUCT}",
                self.total_tickets
            )));
        }
        let rate = profit_rate_milli(self.profit_rate)
            .filter(|&r| r <= MAX_STORED)
            .ok_or_else(|| invalid(format!("profit_rate {} is out of range", self.profit_rate)))?;

        let mut ids = HashSet::new();
        let mut levels = HashSet::new();
        for t in &self.tiers {
            if !ids.insert(t.tier_id.as_str()) {
                return Err(invalid(format!("duplicate tier id '{}'", t.tier_id)));
            }
            if !levels.insert(t.level) {
                return Err(invalid(format!("duplicate tier level {}", t.level)));
            }
            if t.weight > MAX_STORED || t.total > MAX_STORED {
                return Err(invalid(format!(
                    "tier '{}' weight or total exceeds {MAX_STORED}",
                    t.tier_id
                )));
            }
        }

        let last_ones: Vec<&TierSpec> = self.tiers.iter().filter(|t| t.last_one).collect();
        if last_ones.len() > 1 {
            return Err(invalid("at most one last-one tier is allowed".into()));
        }
        if let Some(last) = last_ones.first() {
            if last.total != 1 {
                return Err(invalid(format!(
                    "last-one tier '{}' must have total 1",
                    last.tier_id
                )));
            }
        }

        let regular: Vec<&TierSpec> = self.tiers.iter().filter(|t| !t.last_one).collect();
        if regular.is_empty() {
            return Err(invalid("at least one regular tier is required".into()));
        }
        for t in &regular {
            if t.weight == 0 {
                return Err(invalid(format!("tier '{}' has zero weight", t.tier_id)));
            }
            if t.total == 0 {
                return Err(invalid(format!("tier '{}' has zero quantity", t.tier_id)));
            }
        }

        // Every non-final ticket needs a regular prize to land on.
        let regular_stock = regular
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.total));
        let needed = if last_ones.is_empty() {
            self.total_tickets
        } else {
            self.total_tickets - 1
        };
        if regular_stock < needed {
            return Err(invalid(format!(
                "regular tiers hold {regular_stock} prizes but {needed} tickets need one"
            )));
        }

        Ok(rate)
    }
}
