//! Holder analytics for a fungible token
//!
//! Repeatedly snapshots the holder set of one mint and derives:
//! - per-holder behavioral classification against a fixed baseline
//!   (`classifier`, `registry`, `buckets`)
//! - churn of the top-N holder cohort against its original membership and
//!   the previous poll (`cohort`)
//! - a stake-weighted lottery with a streak bonus (`selection`)
//!
//! `session` bundles the three states for one mint, `scheduler` drives it on
//! a fixed cadence, and `fetcher`, `db` and `persistence` are the RPC, SQLite
//! and JSON collaborators around it.

pub mod buckets;
pub mod classifier;
pub mod cohort;
pub mod config;
pub mod db;
pub mod error;
pub mod error_handler;
pub mod fetcher;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod selection;
pub mod session;
pub mod snapshot;

pub use buckets::{Bucket, CohortTiers, StepBuckets, Tier};
pub use classifier::classify;
pub use cohort::{track_cohort, CohortChurn, CohortState};
pub use error::{ConfigError, TrackerError, TrackerResult};
pub use fetcher::{RpcSnapshotSource, SnapshotSource};
pub use registry::{HolderRecord, HolderRegistry};
pub use selection::{select_winner, SelectionMode, SelectionState, Winner};
pub use session::{PollReport, SessionSettings, TrackingSession};
pub use snapshot::{HolderBalance, Snapshot};
