//! Tier and percentage utilities shared by the classifier and the cohort tracker
//!
//! All tier boundaries are decided with integer arithmetic on raw balances:
//! `delta * 100 >= t * baseline` instead of comparing a rounded float
//! percentage. A change of exactly +25% therefore always lands in the 25
//! tier. `change_pct` is only used for display.

use serde::{ser::SerializeMap, Serialize, Serializer};

/// Percent step between classification tiers
pub const TIER_STEP: u8 = 10;

/// Highest classification tier
pub const MAX_TIER: u8 = 100;

/// Changes strictly below this magnitude are `unchanged`
pub const UNCHANGED_BELOW_PCT: u8 = 10;

const TIER_COUNT: usize = (MAX_TIER / TIER_STEP) as usize;

/// A 10-percent classification tier (10, 20, ..., 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tier(u8);

impl Tier {
    pub fn new(pct: u8) -> Option<Self> {
        if pct >= TIER_STEP && pct <= MAX_TIER && pct % TIER_STEP == 0 {
            Some(Self(pct))
        } else {
            None
        }
    }

    pub fn pct(self) -> u8 {
        self.0
    }

    /// All tiers, highest first (scan order)
    pub fn descending() -> impl Iterator<Item = Tier> {
        (1..=TIER_COUNT as u8).rev().map(|i| Tier(i * TIER_STEP))
    }

    fn index(self) -> usize {
        (self.0 / TIER_STEP) as usize - 1
    }
}

/// Where one owner lands in a single classification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Bought(Tier),
    Sold(Tier),
    Unchanged,
    /// Still absent after the poll that already counted the exit
    Exited,
}

impl Bucket {
    pub fn label(&self) -> String {
        match self {
            Bucket::Bought(t) => format!("bought{}", t.pct()),
            Bucket::Sold(t) => format!("sold{}", t.pct()),
            Bucket::Unchanged => "unchanged".to_string(),
            Bucket::Exited => "exited".to_string(),
        }
    }
}

fn delta(baseline: u64, current: u64) -> i128 {
    current as i128 - baseline as i128
}

/// True when `current` moved by at least `pct` percent of `baseline` upward
pub fn gained_at_least(baseline: u64, current: u64, pct: u32) -> bool {
    delta(baseline, current) * 100 >= pct as i128 * baseline as i128
}

/// True when `current` moved by at least `pct` percent of `baseline` downward
pub fn lost_at_least(baseline: u64, current: u64, pct: u32) -> bool {
    delta(baseline, current) * 100 <= -(pct as i128 * baseline as i128)
}

/// Percentage change from baseline, `None` for a zero baseline
pub fn change_pct(baseline: u64, current: u64) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    Some(delta(baseline, current) as f64 * 100.0 / baseline as f64)
}

/// Step-tier classification of a present holder against its baseline
///
/// Returns `None` only for a zero baseline.
pub fn classify_change(baseline: u64, current: u64) -> Option<Bucket> {
    if baseline == 0 {
        return None;
    }

    let d = delta(baseline, current);
    if d.abs() * 100 < UNCHANGED_BELOW_PCT as i128 * baseline as i128 {
        return Some(Bucket::Unchanged);
    }

    let bucket = if d > 0 {
        Tier::descending()
            .find(|t| gained_at_least(baseline, current, t.pct() as u32))
            .map(Bucket::Bought)
    } else {
        Tier::descending()
            .find(|t| lost_at_least(baseline, current, t.pct() as u32))
            .map(Bucket::Sold)
    };

    Some(bucket.unwrap_or(Bucket::Unchanged))
}

/// Per-poll classification tallies
///
/// Serializes as a flat `label -> count` map: `bought10..bought100`,
/// `sold10..sold100`, `unchanged`, `exited`, plus the `current`, `total`
/// and `skipped` aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepBuckets {
    bought: [u32; TIER_COUNT],
    sold: [u32; TIER_COUNT],
    pub unchanged: u32,
    pub exited: u32,
    /// Owners present in this poll's snapshot
    pub current: u32,
    /// Owners ever seen in this session
    pub total: u32,
    /// Records left unclassified because of a zero baseline
    pub skipped: u32,
}

impl StepBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::Bought(t) => self.bought[t.index()] += 1,
            Bucket::Sold(t) => self.sold[t.index()] += 1,
            Bucket::Unchanged => self.unchanged += 1,
            Bucket::Exited => self.exited += 1,
        }
    }

    pub fn count(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Bought(t) => self.bought[t.index()],
            Bucket::Sold(t) => self.sold[t.index()],
            Bucket::Unchanged => self.unchanged,
            Bucket::Exited => self.exited,
        }
    }

    pub fn bought(&self, pct: u8) -> u32 {
        Tier::new(pct).map(|t| self.bought[t.index()]).unwrap_or(0)
    }

    pub fn sold(&self, pct: u8) -> u32 {
        Tier::new(pct).map(|t| self.sold[t.index()]).unwrap_or(0)
    }

    /// Sum over every bucket (excludes the aggregates)
    pub fn bucket_sum(&self) -> u32 {
        self.bought.iter().sum::<u32>()
            + self.sold.iter().sum::<u32>()
            + self.unchanged
            + self.exited
    }
}

impl Serialize for StepBuckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TIER_COUNT * 2 + 5))?;
        for i in 0..TIER_COUNT {
            let pct = (i as u8 + 1) * TIER_STEP;
            map.serialize_entry(&format!("bought{}", pct), &self.bought[i])?;
            map.serialize_entry(&format!("sold{}", pct), &self.sold[i])?;
        }
        map.serialize_entry("unchanged", &self.unchanged)?;
        map.serialize_entry("exited", &self.exited)?;
        map.serialize_entry("current", &self.current)?;
        map.serialize_entry("total", &self.total)?;
        map.serialize_entry("skipped", &self.skipped)?;
        map.end()
    }
}

/// Coarse tiers used for the original top cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortTier {
    Sold100,
    Sold50,
    Sold25,
    Bought100,
    Bought50,
    Bought25,
    Bought10,
    Steady,
}

/// First matching branch wins: full exit, then sells, then buys (largest first)
pub fn cohort_tier(initial: u64, current: u64) -> CohortTier {
    if current == 0 {
        return CohortTier::Sold100;
    }
    if initial == 0 {
        return CohortTier::Steady;
    }
    if lost_at_least(initial, current, 50) {
        CohortTier::Sold50
    } else if lost_at_least(initial, current, 25) {
        CohortTier::Sold25
    } else if gained_at_least(initial, current, 100) {
        CohortTier::Bought100
    } else if gained_at_least(initial, current, 50) {
        CohortTier::Bought50
    } else if gained_at_least(initial, current, 25) {
        CohortTier::Bought25
    } else if gained_at_least(initial, current, 10) {
        CohortTier::Bought10
    } else {
        CohortTier::Steady
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSales {
    pub sold100: u32,
    pub sold50: u32,
    pub sold25: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortBuys {
    pub bought100: u32,
    pub bought50: u32,
    pub bought25: u32,
    pub bought10: u32,
}

/// Sale/purchase tallies for the original cohort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortTiers {
    pub sales: CohortSales,
    pub buys: CohortBuys,
    /// Members whose change fell inside (-25%, +10%)
    pub steady: u32,
}

impl CohortTiers {
    pub fn record(&mut self, tier: CohortTier) {
        match tier {
            CohortTier::Sold100 => self.sales.sold100 += 1,
            CohortTier::Sold50 => self.sales.sold50 += 1,
            CohortTier::Sold25 => self.sales.sold25 += 1,
            CohortTier::Bought100 => self.buys.bought100 += 1,
            CohortTier::Bought50 => self.buys.bought50 += 1,
            CohortTier::Bought25 => self.buys.bought25 += 1,
            CohortTier::Bought10 => self.buys.bought10 += 1,
            CohortTier::Steady => self.steady += 1,
        }
    }

    pub fn sum(&self) -> u32 {
        self.sales.sold100
            + self.sales.sold50
            + self.sales.sold25
            + self.buys.bought100
            + self.buys.bought50
            + self.buys.bought25
            + self.buys.bought10
            + self.steady
    }
}
