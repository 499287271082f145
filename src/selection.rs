//! Stake-weighted random selection with a per-owner streak bonus
//!
//! A draw picks one owner from a pre-filtered eligible set. Each win bumps the
//! winner's streak by one; streaks never reset. The first time an owner's
//! streak reaches the bonus length it is added to `bonus_achievers`, and that
//! win is flagged as the one that triggered the bonus.

use {
    crate::snapshot::HolderBalance,
    rand::Rng,
    serde::{Deserialize, Serialize},
    std::{
        collections::{HashMap, HashSet, VecDeque},
        fmt,
        str::FromStr,
    },
};

/// Streak length that triggers the bonus
pub const BONUS_STREAK: u32 = 3;

/// Number of recent draws kept for display
pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Probability proportional to balance
    #[default]
    Weighted,
    /// Every eligible holder has the same chance
    Uniform,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weighted" | "stake" => Ok(SelectionMode::Weighted),
            "uniform" | "random" => Ok(SelectionMode::Uniform),
            other => Err(format!("unknown selection mode '{}'", other)),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Weighted => write!(f, "weighted"),
            SelectionMode::Uniform => write!(f, "uniform"),
        }
    }
}

/// Outcome of one draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub owner: String,
    pub amount: u64,
    pub mode: SelectionMode,
    /// Winner's consecutive-win count including this win
    pub streak: u32,
    /// This win is the one that first reached the bonus streak
    pub bonus_triggered: bool,
    pub eligible_count: usize,
    pub total_weight: u128,
    /// Odds of this winner before the draw, in percent
    pub chance_pct: f64,
    pub drawn_at: i64,
}

/// Streak bookkeeping owned by the selection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionState {
    streak_by_owner: HashMap<String, u32>,
    bonus_achievers: HashSet<String>,
    recent: VecDeque<Winner>,
    bonus_streak: u32,
    history_cap: usize,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(BONUS_STREAK, HISTORY_CAP)
    }
}

impl SelectionState {
    pub fn new(bonus_streak: u32, history_cap: usize) -> Self {
        Self {
            streak_by_owner: HashMap::new(),
            bonus_achievers: HashSet::new(),
            recent: VecDeque::with_capacity(history_cap),
            bonus_streak: bonus_streak.max(1),
            history_cap,
        }
    }

    pub fn streak(&self, owner: &str) -> u32 {
        self.streak_by_owner.get(owner).copied().unwrap_or(0)
    }

    pub fn bonus_achievers(&self) -> &HashSet<String> {
        &self.bonus_achievers
    }

    pub fn is_bonus_achiever(&self, owner: &str) -> bool {
        self.bonus_achievers.contains(owner)
    }

    /// Most recent draws, oldest first
    pub fn recent(&self) -> &VecDeque<Winner> {
        &self.recent
    }

    pub fn bonus_streak(&self) -> u32 {
        self.bonus_streak
    }

    /// Replace the bonus length and history cap, trimming history to fit
    pub fn set_limits(&mut self, bonus_streak: u32, history_cap: usize) {
        self.bonus_streak = bonus_streak.max(1);
        self.history_cap = history_cap;
        while self.recent.len() > history_cap {
            self.recent.pop_front();
        }
    }

    /// Bump the owner's streak; returns (new streak, bonus triggered now)
    fn record_win(&mut self, owner: &str) -> (u32, bool) {
        let streak = self.streak_by_owner.entry(owner.to_string()).or_insert(0);
        *streak += 1;
        let streak = *streak;

        let triggered =
            streak >= self.bonus_streak && self.bonus_achievers.insert(owner.to_string());
        (streak, triggered)
    }

    fn push_recent(&mut self, winner: Winner) {
        if self.history_cap == 0 {
            return;
        }
        while self.recent.len() >= self.history_cap {
            self.recent.pop_front();
        }
        self.recent.push_back(winner);
    }
}

/// Roulette draw weighted by balance
///
/// Draws `r` uniformly from `[0, total)` and walks the holders in slice
/// order, subtracting each balance until `r < balance`. Runs on integers so
/// there is no drift regardless of holder count. Zero balances never win.
pub fn draw_weighted<R: Rng + ?Sized>(holders: &[HolderBalance], rng: &mut R) -> Option<usize> {
    let total: u128 = holders.iter().map(|h| h.amount as u128).sum();
    if total == 0 {
        return None;
    }

    let mut remaining = rng.gen_range(0..total);
    for (idx, holder) in holders.iter().enumerate() {
        let weight = holder.amount as u128;
        if remaining < weight {
            return Some(idx);
        }
        remaining -= weight;
    }
    None
}

/// Uniform draw over holders with a positive balance
pub fn draw_uniform<R: Rng + ?Sized>(holders: &[HolderBalance], rng: &mut R) -> Option<usize> {
    let candidates: Vec<usize> = holders
        .iter()
        .enumerate()
        .filter(|(_, h)| h.amount > 0)
        .map(|(idx, _)| idx)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}

/// Pick one winner from `eligible` and apply the streak state machine
///
/// Returns `None` when nobody is eligible; the state is untouched in that
/// case.
pub fn select_winner<R: Rng + ?Sized>(
    state: &mut SelectionState,
    eligible: &[HolderBalance],
    mode: SelectionMode,
    rng: &mut R,
    now: i64,
) -> Option<Winner> {
    let idx = match mode {
        SelectionMode::Weighted => draw_weighted(eligible, rng)?,
        SelectionMode::Uniform => draw_uniform(eligible, rng)?,
    };
    let picked = &eligible[idx];

    let total_weight: u128 = eligible.iter().map(|h| h.amount as u128).sum();
    let eligible_count = eligible.iter().filter(|h| h.amount > 0).count();
    let chance_pct = match mode {
        SelectionMode::Weighted => picked.amount as f64 * 100.0 / total_weight as f64,
        SelectionMode::Uniform => 100.0 / eligible_count as f64,
    };

    let (streak, bonus_triggered) = state.record_win(&picked.owner);

    let winner = Winner {
        owner: picked.owner.clone(),
        amount: picked.amount,
        mode,
        streak,
        bonus_triggered,
        eligible_count,
        total_weight,
        chance_pct,
        drawn_at: now,
    };

    if bonus_triggered {
        log::info!("🃏 {} hit a {}-win streak", winner.owner, streak);
    }
    state.push_recent(winner.clone());

    Some(winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn holders(entries: &[(&str, u64)]) -> Vec<HolderBalance> {
        entries.iter().map(|(o, a)| HolderBalance::new(*o, *a)).collect()
    }

    #[test]
    fn test_empty_set_has_no_winner() {
        let mut state = SelectionState::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_winner(&mut state, &[], SelectionMode::Weighted, &mut rng, 0).is_none());
        let broke = holders(&[("A", 0)]);
        assert!(select_winner(&mut state, &broke, SelectionMode::Uniform, &mut rng, 0).is_none());
        assert!(state.recent().is_empty());
    }

    #[test]
    fn test_weighted_ratio_converges() {
        let pool = holders(&[("A", 3), ("B", 1)]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut wins_a = 0u32;
        let draws = 20_000;
        for _ in 0..draws {
            if draw_weighted(&pool, &mut rng) == Some(0) {
                wins_a += 1;
            }
        }
        let ratio = wins_a as f64 / (draws - wins_a) as f64;
        assert!(ratio > 2.7 && ratio < 3.3, "ratio was {}", ratio);
    }

    #[test]
    fn test_zero_weight_never_wins() {
        let pool = holders(&[("Z", 0), ("A", 5)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert_eq!(draw_weighted(&pool, &mut rng), Some(1));
            assert_eq!(draw_uniform(&pool, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_uniform_ignores_balance() {
        let pool = holders(&[("A", 1_000_000), ("B", 1)]);
        let mut rng = StdRng::seed_from_u64(9);
        let wins_b = (0..4_000).filter(|_| draw_uniform(&pool, &mut rng) == Some(1)).count();
        assert!(wins_b > 1_700 && wins_b < 2_300, "B won {}", wins_b);
    }

    #[test]
    fn test_streak_bonus_fires_once() {
        let mut state = SelectionState::default();
        let pool = holders(&[("A", 10)]);
        let mut rng = StdRng::seed_from_u64(3);

        let mut triggered = Vec::new();
        for i in 0..5 {
            let winner =
                select_winner(&mut state, &pool, SelectionMode::Weighted, &mut rng, i).unwrap();
            assert_eq!(winner.streak, i as u32 + 1);
            triggered.push(winner.bonus_triggered);
        }

        assert_eq!(triggered, vec![false, false, true, false, false]);
        assert_eq!(state.bonus_achievers().len(), 1);
        assert!(state.is_bonus_achiever("A"));
        assert_eq!(state.streak("A"), 5);
    }

    #[test]
    fn test_streak_not_reset_by_other_winners() {
        let mut state = SelectionState::default();
        let mut rng = StdRng::seed_from_u64(11);
        select_winner(&mut state, &holders(&[("A", 1)]), SelectionMode::Uniform, &mut rng, 0);
        select_winner(&mut state, &holders(&[("B", 1)]), SelectionMode::Uniform, &mut rng, 1);
        let a = holders(&[("A", 1)]);
        let winner = select_winner(&mut state, &a, SelectionMode::Uniform, &mut rng, 2).unwrap();
        assert_eq!(winner.streak, 2);
        assert_eq!(state.streak("B"), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = SelectionState::new(BONUS_STREAK, 4);
        let pool = holders(&[("A", 1), ("B", 1)]);
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..10 {
            select_winner(&mut state, &pool, SelectionMode::Weighted, &mut rng, i);
        }
        assert_eq!(state.recent().len(), 4);
        assert_eq!(state.recent().back().unwrap().drawn_at, 9);
        assert_eq!(state.recent().front().unwrap().drawn_at, 6);
    }

    #[test]
    fn test_chance_pct() {
        let mut state = SelectionState::default();
        let mut rng = StdRng::seed_from_u64(0);
        let pool = holders(&[("A", 25), ("Z", 0)]);
        let winner =
            select_winner(&mut state, &pool, SelectionMode::Weighted, &mut rng, 0).unwrap();
        assert_eq!(winner.chance_pct, 100.0);
        assert_eq!(winner.eligible_count, 1);
        assert_eq!(winner.total_weight, 25);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Weighted".parse::<SelectionMode>(), Ok(SelectionMode::Weighted));
        assert_eq!("uniform".parse::<SelectionMode>(), Ok(SelectionMode::Uniform));
        assert!("roulette".parse::<SelectionMode>().is_err());
    }
}
