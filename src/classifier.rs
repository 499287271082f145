use {
    crate::{
        buckets::{classify_change, Bucket, StepBuckets, Tier, MAX_TIER},
        registry::HolderRegistry,
        snapshot::Snapshot,
    },
};

/// Classify every known owner against its baseline and fold in new owners
///
/// Mutates `registry` in place:
/// 1. Present owners get `current`/`last_seen` refreshed and land in
///    `unchanged` or one bought/sold tier.
/// 2. Absent owners are zeroed. The poll that first sees them gone counts a
///    `sold100`; every later poll they stay away counts `exited` instead.
///    A returning owner is classified against its original baseline again.
/// 3. Owners seen for the first time get a record with
///    `baseline = current = amount` and always count as `unchanged`.
///
/// Each record increments exactly one bucket per poll, except records with a
/// zero baseline which are counted in `skipped`.
pub fn classify(registry: &mut HolderRegistry, snapshot: &Snapshot, now: i64) -> StepBuckets {
    let fresh = snapshot.balance_map();
    let mut changes = StepBuckets::new();
    let full_exit = Tier::new(MAX_TIER).map(Bucket::Sold).unwrap_or(Bucket::Exited);

    for record in registry.iter_mut() {
        changes.total += 1;
        if record.baseline() == 0 {
            log::warn!("⚠️  Skipping {}: zero baseline", record.owner);
            changes.skipped += 1;
            continue;
        }

        match fresh.get(record.owner.as_str()) {
            Some(&amount) => {
                record.current = amount;
                record.last_seen = now;
                record.exit_counted = false;
                changes.current += 1;

                let bucket =
                    classify_change(record.baseline(), amount).unwrap_or(Bucket::Unchanged);
                changes.record(bucket);
            }
            None => {
                record.current = 0;
                if record.exit_counted {
                    changes.record(Bucket::Exited);
                } else {
                    record.exit_counted = true;
                    changes.record(full_exit);
                }
            }
        }
    }

    for holder in &snapshot.holders {
        let Some(&amount) = fresh.get(holder.owner.as_str()) else {
            continue;
        };
        if registry.observe_new(&holder.owner, amount, now) {
            changes.total += 1;
            changes.current += 1;
            changes.record(Bucket::Unchanged);
        }
    }

    log::debug!(
        "📊 Classified {} owners ({} present, {} unchanged, {} full exits)",
        changes.total,
        changes.current,
        changes.unchanged,
        changes.sold(MAX_TIER)
    );

    changes
}
