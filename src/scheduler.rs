//! Poll driver
//!
//! A tick fetches a snapshot, applies it to the session and, when due, runs a
//! lottery draw. Ticks never overlap: `PollGate` is a non-reentrant busy flag
//! taken at poll start and released when the guard drops, on every exit path.

use {
    crate::{
        db::ReportDbWriter,
        error::{TrackerError, TrackerResult},
        fetcher::SnapshotSource,
        selection::Winner,
        session::{PollReport, TrackingSession},
    },
    rand::{rngs::StdRng, Rng, SeedableRng},
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    tokio::{
        sync::{watch, Mutex},
        task::JoinHandle,
        time::{interval, Duration, MissedTickBehavior},
    },
};

/// Non-reentrant busy flag shared by every poll trigger
#[derive(Debug, Clone, Default)]
pub struct PollGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one poll; clears the busy flag on drop
#[derive(Debug)]
pub struct PollGuard {
    busy: Arc<AtomicBool>,
}

impl PollGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, `None` if a poll is already running
    pub fn try_enter(&self) -> Option<PollGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PollGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What one completed tick produced
#[derive(Debug, Clone, Default)]
pub struct PollCycle {
    /// `None` when the snapshot was empty and the poll was skipped
    pub report: Option<PollReport>,
    pub winner: Option<Winner>,
}

/// Run one poll end to end
///
/// Returns `TrackerError::PollInProgress` without doing anything if another
/// poll holds the gate. Upstream failures are returned as-is and leave the
/// session untouched.
pub async fn poll_once<R: Rng + Send + ?Sized>(
    gate: &PollGate,
    source: &dyn SnapshotSource,
    session: &Mutex<TrackingSession>,
    rng: &mut R,
) -> TrackerResult<PollCycle> {
    let _guard = gate.try_enter().ok_or(TrackerError::PollInProgress)?;

    let mint = session.lock().await.mint().to_string();
    let mut snapshot = source.fetch_snapshot(&mint).await?;
    snapshot.normalize();
    let now = chrono::Utc::now().timestamp_millis();

    let mut session = session.lock().await;
    let report = session.apply_snapshot(&snapshot, now)?;

    let winner = if report.is_some() && session.lottery_due() {
        session.draw(&snapshot, rng, now)
    } else {
        None
    };

    Ok(PollCycle { report, winner })
}

async fn record_cycle(db_writer: Option<&Arc<dyn ReportDbWriter>>, mint: &str, cycle: &PollCycle) {
    if let Some(report) = &cycle.report {
        log::info!(
            "📊 Poll #{} {}: {} holders, {} unchanged, {} full exits | top: {} still, {} gone, {} new ({} ever)",
            report.poll,
            mint,
            report.holder_count,
            report.changes.unchanged,
            report.changes.sold(100),
            report.top_stats.still_present,
            report.top_stats.gone_from_initial,
            report.top_stats.new_since_last_poll,
            report.top_stats.ever_new_entrants
        );
    }
    if let Some(winner) = &cycle.winner {
        log::info!(
            "🎰 Winner {} ({:.2}% chance, streak {}{})",
            winner.owner,
            winner.chance_pct,
            winner.streak,
            if winner.bonus_triggered { ", JOKER" } else { "" }
        );
    }

    let Some(writer) = db_writer else {
        return;
    };
    if let Some(report) = &cycle.report {
        if let Err(e) = writer.write_poll_report(report).await {
            log::error!("❌ Failed to write poll report: {}", e);
        }
    }
    if let Some(winner) = &cycle.winner {
        if let Err(e) = writer.write_draw(mint, winner).await {
            log::error!("❌ Failed to write lottery draw: {}", e);
        }
    }
}

/// Poll on a fixed cadence until `shutdown` flips to true
///
/// Each tick runs in its own task so that a stalled fetch cannot delay the
/// timer; the gate makes any tick that fires during a running poll a no-op.
/// Ticks still running at shutdown are awaited before this returns, so the
/// caller's final save sees their effects.
pub async fn poll_loop(
    session: Arc<Mutex<TrackingSession>>,
    source: Arc<dyn SnapshotSource>,
    db_writer: Option<Arc<dyn ReportDbWriter>>,
    poll_interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("⏰ Starting poll loop (interval: {}ms)", poll_interval_ms);

    let gate = PollGate::new();
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    let mut timer = interval(Duration::from_millis(poll_interval_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if gate.is_busy() {
            log::debug!("⏭️  Previous poll still running, skipping tick");
            continue;
        }

        let gate = gate.clone();
        let session = session.clone();
        let source = source.clone();
        let db_writer = db_writer.clone();
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mint = session.lock().await.mint().to_string();
            match poll_once(&gate, source.as_ref(), &session, &mut rng).await {
                Ok(cycle) => record_cycle(db_writer.as_ref(), &mint, &cycle).await,
                Err(TrackerError::PollInProgress) => {
                    log::debug!("⏭️  Poll already in progress for {}", mint);
                }
                Err(e) => log::warn!("⚠️  Poll failed for {}: {}", mint, e),
            }
        }));
    }

    for handle in in_flight {
        if let Err(e) = handle.await {
            log::error!("❌ Poll task failed: {}", e);
        }
    }

    log::info!("⏹️  Poll loop stopped");
}
