use {
    serde::{Deserialize, Serialize},
    std::collections::{hash_map, HashMap},
};

/// Per-owner state kept for the lifetime of a tracking session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub owner: String,
    /// Balance at first observation, never changed afterwards
    baseline: u64,
    /// Latest observed balance, zero while the owner is absent
    pub current: u64,
    /// Millisecond timestamp of the last poll the owner was present in
    pub last_seen: i64,
    /// Set once the disappearance was reported as a full exit
    #[serde(default)]
    pub exit_counted: bool,
}

impl HolderRecord {
    pub fn new(owner: impl Into<String>, amount: u64, now: i64) -> Self {
        Self {
            owner: owner.into(),
            baseline: amount,
            current: amount,
            last_seen: now,
            exit_counted: false,
        }
    }

    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    pub fn is_present(&self) -> bool {
        self.current > 0
    }
}

/// Every owner observed during a session, keyed by owner
///
/// Records are never removed: an owner that leaves keeps its record with
/// `current = 0`. The first-seen order is preserved so that exports and
/// restores are deterministic.
#[derive(Debug, Clone, Default)]
pub struct HolderRegistry {
    records: HashMap<String, HolderRecord>,
    order: Vec<String>,
}

impl HolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry from previously persisted records
    ///
    /// Later duplicates of the same owner are ignored so the first baseline
    /// wins.
    pub fn from_records(records: impl IntoIterator<Item = HolderRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            if let hash_map::Entry::Vacant(slot) = registry.records.entry(record.owner.clone()) {
                registry.order.push(record.owner.clone());
                slot.insert(record);
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, owner: &str) -> Option<&HolderRecord> {
        self.records.get(owner)
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.records.contains_key(owner)
    }

    /// Insert a first observation; returns false if the owner is already known
    pub fn observe_new(&mut self, owner: &str, amount: u64, now: i64) -> bool {
        match self.records.entry(owner.to_string()) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(HolderRecord::new(owner, amount, now));
                self.order.push(owner.to_string());
                true
            }
        }
    }

    /// Records in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &HolderRecord> {
        self.order.iter().filter_map(|owner| self.records.get(owner))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut HolderRecord> {
        self.records.values_mut()
    }

    /// Owners currently holding a positive balance
    pub fn present_count(&self) -> usize {
        self.records.values().filter(|r| r.is_present()).count()
    }

    pub fn to_records(&self) -> Vec<HolderRecord> {
        self.iter().cloned().collect()
    }
}
