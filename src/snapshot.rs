use {
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

/// One owner's balance in raw base units of the tracked mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderBalance {
    pub owner: String,
    pub amount: u64,
}

impl HolderBalance {
    pub fn new(owner: impl Into<String>, amount: u64) -> Self {
        Self {
            owner: owner.into(),
            amount,
        }
    }
}

/// Point-in-time read of every holder of one mint
///
/// Order is the order the upstream returned accounts in. The analytics treat
/// it as stable: cohort ties and draw order both follow it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub mint: String,
    pub decimals: u8,
    pub taken_at: i64,
    pub holders: Vec<HolderBalance>,
}

impl Snapshot {
    pub fn new(
        mint: impl Into<String>,
        decimals: u8,
        taken_at: i64,
        holders: Vec<HolderBalance>,
    ) -> Self {
        Self {
            mint: mint.into(),
            decimals,
            taken_at,
            holders,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Owner -> balance lookup
    ///
    /// Zero balances are left out (treated as absent). A duplicated owner
    /// resolves to its last occurrence.
    pub fn balance_map(&self) -> HashMap<&str, u64> {
        let mut map = HashMap::with_capacity(self.holders.len());
        for holder in &self.holders {
            if holder.amount > 0 {
                map.insert(holder.owner.as_str(), holder.amount);
            } else {
                map.remove(holder.owner.as_str());
            }
        }
        map
    }

    /// Drop zero balances and collapse duplicate owners in place
    ///
    /// The surviving entry keeps the position of the owner's first
    /// occurrence and the amount of its last one.
    pub fn normalize(&mut self) {
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<HolderBalance> = Vec::with_capacity(self.holders.len());

        for holder in self.holders.drain(..) {
            match position.get(&holder.owner) {
                Some(&idx) => merged[idx].amount = holder.amount,
                None => {
                    position.insert(holder.owner.clone(), merged.len());
                    merged.push(holder);
                }
            }
        }

        merged.retain(|h| h.amount > 0);
        self.holders = merged;
    }

    /// Holders sorted by balance, largest first; ties keep snapshot order
    ///
    /// One entry per owner, taken from its last occurrence so it agrees with
    /// `balance_map`. Zero balances are left out.
    pub fn sorted_desc(&self) -> Vec<&HolderBalance> {
        let mut last: HashMap<&str, usize> = HashMap::with_capacity(self.holders.len());
        for (idx, holder) in self.holders.iter().enumerate() {
            last.insert(holder.owner.as_str(), idx);
        }

        let mut sorted: Vec<&HolderBalance> = self
            .holders
            .iter()
            .enumerate()
            .filter(|(idx, h)| h.amount > 0 && last.get(h.owner.as_str()) == Some(idx))
            .map(|(_, h)| h)
            .collect();
        sorted.sort_by(|a, b| b.amount.cmp(&a.amount));
        sorted
    }

    /// Sum of all positive balances
    pub fn total_supply(&self) -> u128 {
        self.holders.iter().map(|h| h.amount as u128).sum()
    }
}
