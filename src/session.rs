//! One tracking session: all analytics state for a single mint
//!
//! Callers own the session and reset it by constructing a new one. Nothing
//! here is global; a session is mutated once per poll by the poll driver.

use {
    crate::{
        buckets::StepBuckets,
        classifier::classify,
        cohort::{track_cohort, CohortChurn, CohortState},
        error::{TrackerError, TrackerResult},
        persistence::SessionSnapshot,
        registry::HolderRegistry,
        selection::{
            select_winner, SelectionMode, SelectionState, Winner, BONUS_STREAK, HISTORY_CAP,
        },
        snapshot::{HolderBalance, Snapshot},
    },
    rand::Rng,
    serde::Serialize,
    std::collections::HashSet,
};

/// Holders whose share of the snapshot supply falls in `[min_pct, max_pct]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EligibilityBand {
    pub min_pct: f64,
    pub max_pct: f64,
}

impl Default for EligibilityBand {
    fn default() -> Self {
        Self {
            min_pct: 0.0,
            max_pct: 100.0,
        }
    }
}

impl EligibilityBand {
    pub fn new(min_pct: f64, max_pct: f64) -> Self {
        Self { min_pct, max_pct }
    }

    /// Eligible holders, in snapshot order
    ///
    /// A duplicated owner keeps its first position and its last amount.
    pub fn filter(&self, snapshot: &Snapshot) -> Vec<HolderBalance> {
        let balances = snapshot.balance_map();
        let supply: u128 = balances.values().map(|&a| a as u128).sum();
        if supply == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::with_capacity(balances.len());
        snapshot
            .holders
            .iter()
            .filter(|h| seen.insert(h.owner.as_str()))
            .filter_map(|h| {
                let amount = balances.get(h.owner.as_str()).copied()?;
                Some(HolderBalance::new(h.owner.clone(), amount))
            })
            .filter(|h| {
                let share = h.amount as f64 * 100.0 / supply as f64;
                share >= self.min_pct && share <= self.max_pct
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cohort_size: usize,
    pub lottery_mode: SelectionMode,
    pub lottery_band: EligibilityBand,
    /// Draw after every N applied polls, 0 disables the lottery
    pub lottery_every_polls: u64,
    pub bonus_streak: u32,
    pub history_cap: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cohort_size: 50,
            lottery_mode: SelectionMode::Weighted,
            lottery_band: EligibilityBand::default(),
            lottery_every_polls: 30,
            bonus_streak: BONUS_STREAK,
            history_cap: HISTORY_CAP,
        }
    }
}

/// Everything one applied poll produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    pub mint: String,
    pub poll: u64,
    pub taken_at: i64,
    pub holder_count: usize,
    pub changes: StepBuckets,
    pub top_stats: CohortChurn,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub mint: String,
    pub polls: u64,
    pub known_owners: usize,
    pub present_owners: usize,
    pub cohort_established: bool,
    pub ever_new_entrants: usize,
    pub bonus_achievers: usize,
}

#[derive(Debug)]
pub struct TrackingSession {
    mint: String,
    settings: SessionSettings,
    registry: HolderRegistry,
    cohort: CohortState,
    selection: SelectionState,
    polls: u64,
    last_report: Option<PollReport>,
}

impl TrackingSession {
    /// Start tracking `mint` with empty state
    pub fn start(mint: impl Into<String>, settings: SessionSettings) -> Self {
        let selection = SelectionState::new(settings.bonus_streak, settings.history_cap);
        Self {
            mint: mint.into(),
            settings,
            registry: HolderRegistry::new(),
            cohort: CohortState::new(),
            selection,
            polls: 0,
            last_report: None,
        }
    }

    /// Seed a session from persisted state before its first poll
    ///
    /// A snapshot saved for a different mint is ignored and the session
    /// starts empty.
    pub fn restore(
        mint: impl Into<String>,
        settings: SessionSettings,
        saved: SessionSnapshot,
    ) -> Self {
        let mint = mint.into();
        if saved.mint != mint {
            log::warn!(
                "⚠️  Ignoring saved session for {} (tracking {})",
                saved.mint,
                mint
            );
            return Self::start(mint, settings);
        }

        log::info!(
            "♻️  Restored {} owners and {} past cohort entrants for {}",
            saved.records.len(),
            saved.cohort.ever_new_entrants().len(),
            mint
        );

        let mut selection = saved.selection;
        selection.set_limits(settings.bonus_streak, settings.history_cap);

        Self {
            mint,
            settings,
            registry: HolderRegistry::from_records(saved.records),
            cohort: saved.cohort,
            selection,
            polls: 0,
            last_report: None,
        }
    }

    pub fn mint(&self) -> &str {
        &self.mint
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn registry(&self) -> &HolderRegistry {
        &self.registry
    }

    pub fn cohort(&self) -> &CohortState {
        &self.cohort
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn last_report(&self) -> Option<&PollReport> {
        self.last_report.as_ref()
    }

    /// Run classification and cohort tracking over one snapshot
    ///
    /// An empty snapshot is treated as an upstream outage: the poll is
    /// skipped and `Ok(None)` returned without touching any state. On error
    /// nothing is mutated either.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        now: i64,
    ) -> TrackerResult<Option<PollReport>> {
        if snapshot.mint != self.mint {
            return Err(TrackerError::MintMismatch {
                expected: self.mint.clone(),
                got: snapshot.mint.clone(),
            });
        }

        if snapshot.is_empty() {
            log::warn!("⚠️  Empty snapshot for {}, skipping poll", self.mint);
            return Ok(None);
        }

        let mut snapshot = snapshot.clone();
        snapshot.normalize();

        // Cohort first: it is the only step that can fail, and it fails
        // before mutating anything.
        let top_stats = track_cohort(&mut self.cohort, &snapshot, self.settings.cohort_size)?;
        let changes = classify(&mut self.registry, &snapshot, now);

        self.polls += 1;
        let report = PollReport {
            mint: self.mint.clone(),
            poll: self.polls,
            taken_at: snapshot.taken_at,
            holder_count: snapshot.len(),
            changes,
            top_stats,
        };
        self.last_report = Some(report.clone());

        Ok(Some(report))
    }

    /// Whether the lottery should run after the current poll
    pub fn lottery_due(&self) -> bool {
        self.settings.lottery_every_polls > 0
            && self.polls > 0
            && self.polls % self.settings.lottery_every_polls == 0
    }

    /// Draw a winner from the holders inside the eligibility band
    pub fn draw<R: Rng + ?Sized>(
        &mut self,
        snapshot: &Snapshot,
        rng: &mut R,
        now: i64,
    ) -> Option<Winner> {
        let eligible = self.settings.lottery_band.filter(snapshot);
        if eligible.is_empty() {
            log::info!("🎲 No eligible holders for {}", self.mint);
            return None;
        }
        select_winner(&mut self.selection, &eligible, self.settings.lottery_mode, rng, now)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            mint: self.mint.clone(),
            polls: self.polls,
            known_owners: self.registry.len(),
            present_owners: self.registry.present_count(),
            cohort_established: self.cohort.is_established(),
            ever_new_entrants: self.cohort.ever_new_entrants().len(),
            bonus_achievers: self.selection.bonus_achievers().len(),
        }
    }

    pub fn to_snapshot(&self, now: i64) -> SessionSnapshot {
        SessionSnapshot {
            mint: self.mint.clone(),
            saved_at: now,
            records: self.registry.to_records(),
            cohort: self.cohort.clone(),
            selection: self.selection.clone(),
        }
    }
}
