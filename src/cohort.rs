use {
    crate::{
        buckets::{cohort_tier, CohortTiers},
        error::{TrackerError, TrackerResult},
        snapshot::{HolderBalance, Snapshot},
    },
    serde::{Deserialize, Serialize},
    std::collections::{HashMap, HashSet},
};

/// Lifecycle state of the top-N cohort for one session
///
/// The original membership and amounts are captured once from the first
/// snapshot and never touched again. `previous_*` is replaced wholesale each
/// poll. `ever_new_entrants` only grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortState {
    initial_members: Option<Vec<String>>,
    initial_amounts: HashMap<String, u64>,
    previous_members: HashSet<String>,
    previous_threshold: u64,
    ever_new_entrants: HashSet<String>,
}

/// Churn of the top cohort for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortChurn {
    pub current_count: usize,
    pub still_present: usize,
    pub gone_from_initial: usize,
    pub new_relative_to_initial: usize,
    pub new_since_last_poll: usize,
    pub ever_new_entrants: usize,
    /// Original members outside the current top-N that still hold a balance
    pub left_cohort_still_holding: usize,
    pub tiers: CohortTiers,
}

impl CohortState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state carrying a restored audit set of past entrants
    pub fn with_ever_new_entrants(entrants: impl IntoIterator<Item = String>) -> Self {
        Self {
            ever_new_entrants: entrants.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_established(&self) -> bool {
        self.initial_members.is_some()
    }

    pub fn initial_members(&self) -> Option<&[String]> {
        self.initial_members.as_deref()
    }

    pub fn initial_amount(&self, owner: &str) -> Option<u64> {
        self.initial_amounts.get(owner).copied()
    }

    pub fn previous_threshold(&self) -> u64 {
        self.previous_threshold
    }

    pub fn ever_new_entrants(&self) -> &HashSet<String> {
        &self.ever_new_entrants
    }

    fn establish(&mut self, top: &[&HolderBalance], threshold: u64) {
        self.initial_members = Some(top.iter().map(|h| h.owner.clone()).collect());
        self.initial_amounts = top.iter().map(|h| (h.owner.clone(), h.amount)).collect();
        self.previous_members = top.iter().map(|h| h.owner.clone()).collect();
        self.previous_threshold = threshold;

        log::info!(
            "🏁 Established top-{} cohort (threshold {})",
            top.len(),
            threshold
        );
    }
}

/// Track churn of the top `cohort_size` holders
///
/// The first call establishes the original cohort from `snapshot`; every call
/// then compares the current top-N against both the original cohort and the
/// previous poll. An owner counts as newly entered only if it was not in the
/// previous top-N and its balance strictly exceeds the previous cutoff, so
/// reshuffling inside the cohort is not churn.
pub fn track_cohort(
    state: &mut CohortState,
    snapshot: &Snapshot,
    cohort_size: usize,
) -> TrackerResult<CohortChurn> {
    if cohort_size == 0 {
        return Err(TrackerError::InvalidCohortSize);
    }

    let sorted = snapshot.sorted_desc();
    let top = &sorted[..sorted.len().min(cohort_size)];
    let current_threshold = if top.len() == cohort_size {
        top[cohort_size - 1].amount
    } else {
        0
    };

    if !state.is_established() {
        state.establish(top, current_threshold);
    }

    let current_members: Vec<&str> = top.iter().map(|h| h.owner.as_str()).collect();
    let current_set: HashSet<&str> = current_members.iter().copied().collect();

    let new_since_last_poll: Vec<&str> = top
        .iter()
        .filter(|h| {
            !state.previous_members.contains(&h.owner) && h.amount > state.previous_threshold
        })
        .map(|h| h.owner.as_str())
        .collect();

    for owner in &new_since_last_poll {
        state.ever_new_entrants.insert(owner.to_string());
    }

    let initial: &[String] = state.initial_members.as_deref().unwrap_or(&[]);
    let initial_set: HashSet<&str> = initial.iter().map(String::as_str).collect();

    let still_present = initial.iter().filter(|o| current_set.contains(o.as_str())).count();
    let gone_from_initial = initial.len() - still_present;
    let new_relative_to_initial = current_members
        .iter()
        .filter(|o| !initial_set.contains(*o))
        .count();

    // Tiers only see the current top-N: leaving the cohort reads as a full sale
    let current_amounts: HashMap<&str, u64> =
        top.iter().map(|h| (h.owner.as_str(), h.amount)).collect();
    let balances = snapshot.balance_map();
    let mut tiers = CohortTiers::default();
    let mut left_cohort_still_holding = 0;
    for owner in initial {
        let initial_amount = state.initial_amounts.get(owner).copied().unwrap_or(0);
        let current_amount = current_amounts.get(owner.as_str()).copied().unwrap_or(0);
        tiers.record(cohort_tier(initial_amount, current_amount));

        if current_amount == 0 && balances.contains_key(owner.as_str()) {
            left_cohort_still_holding += 1;
        }
    }

    let churn = CohortChurn {
        current_count: current_members.len(),
        still_present,
        gone_from_initial,
        new_relative_to_initial,
        new_since_last_poll: new_since_last_poll.len(),
        ever_new_entrants: state.ever_new_entrants.len(),
        left_cohort_still_holding,
        tiers,
    };

    state.previous_members = current_members.iter().map(|o| o.to_string()).collect();
    state.previous_threshold = current_threshold;

    log::debug!(
        "👑 Cohort: {} still, {} gone, {} new since last poll ({} ever)",
        churn.still_present,
        churn.gone_from_initial,
        churn.new_since_last_poll,
        churn.ever_new_entrants
    );

    Ok(churn)
}
