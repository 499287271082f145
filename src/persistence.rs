use {
    crate::{
        cohort::CohortState,
        error::TrackerResult,
        registry::HolderRecord,
        selection::SelectionState,
        session::TrackingSession,
    },
    serde::{Deserialize, Serialize},
    std::{fs, path::Path, sync::Arc, time::Duration},
    tokio::{sync::Mutex, time::interval},
};

/// Persistence configuration
pub struct PersistenceConfig {
    pub file_path: String,
    pub autosave_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file_path: "session.json".to_string(),
            autosave_interval: Duration::from_secs(60),
        }
    }
}

/// Session state that survives a process restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mint: String,
    pub saved_at: i64,
    pub records: Vec<HolderRecord>,
    pub cohort: CohortState,
    pub selection: SelectionState,
}

/// Save a session snapshot as pretty JSON
///
/// Writes to a sibling temp file first and renames it over the target so a
/// crash mid-write never leaves a truncated snapshot behind.
pub fn save_snapshot(snapshot: &SessionSnapshot, file_path: &str) -> TrackerResult<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = format!("{}.tmp", file_path);
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, file_path)?;

    log::debug!(
        "💾 Saved {} owners for {} to {}",
        snapshot.records.len(),
        snapshot.mint,
        file_path
    );
    Ok(())
}

/// Load a session snapshot, `None` if no file exists yet
pub fn load_snapshot(file_path: &str) -> TrackerResult<Option<SessionSnapshot>> {
    if !Path::new(file_path).exists() {
        log::info!("No existing session file found: {}", file_path);
        return Ok(None);
    }

    let json = fs::read_to_string(file_path)?;
    let snapshot: SessionSnapshot = serde_json::from_str(&json)?;

    log::info!(
        "Loaded {} owners for {} from {}",
        snapshot.records.len(),
        snapshot.mint,
        file_path
    );
    Ok(Some(snapshot))
}

/// Background task that periodically saves the session
pub async fn persistence_task(session: Arc<Mutex<TrackingSession>>, config: PersistenceConfig) {
    let mut interval_timer = interval(config.autosave_interval);

    loop {
        interval_timer.tick().await;

        let snapshot = {
            let session = session.lock().await;
            session.to_snapshot(chrono::Utc::now().timestamp_millis())
        };

        if let Err(e) = save_snapshot(&snapshot, &config.file_path) {
            log::warn!("Failed to save session snapshot: {}", e);
        }
    }
}
