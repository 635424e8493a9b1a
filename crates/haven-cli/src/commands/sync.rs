use haven_core::sync::{SyncReport, TombstonePurge};

use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_sync(
    collections: &[String],
    reset: bool,
    adopt_guest: bool,
    as_json: bool,
    context: &CliContext,
) -> Result<(), CliError> {
    let collections = context.collections(collections)?;
    let coordinator = context.coordinator().await?;

    if coordinator.session().is_guest() {
        tracing::info!("Not signed in; records stay on this device");
    }

    for collection in &collections {
        if reset {
            coordinator.reset_sync_state(collection)?;
        }
        if adopt_guest {
            let adopted = coordinator.adopt_guest_records(collection)?;
            if adopted > 0 && !as_json {
                println!("Adopted {adopted} guest record(s) in '{collection}'");
            }
        }
    }

    let reports = tokio::select! {
        result = coordinator.sync_all(&collections) => result?,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel();
            tracing::warn!("Sync interrupted");
            return Err(haven_core::sync::SyncError::Cancelled.into());
        }
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{report}");
        }
    }

    if reports.iter().all(SyncReport::is_complete) {
        Ok(())
    } else {
        Err(CliError::SyncIncomplete(
            reports.iter().filter(|report| !report.is_complete()).count(),
        ))
    }
}

pub async fn run_gc(
    collections: &[String],
    retention_days: Option<u32>,
    context: &CliContext,
) -> Result<(), CliError> {
    let collections = context.collections(collections)?;
    let retention = retention_days.map_or_else(
        || context.config.tombstone_retention(),
        |days| chrono::Duration::days(i64::from(days)),
    );
    let coordinator = context.coordinator().await?;

    let mut purges: Vec<TombstonePurge> = Vec::with_capacity(collections.len());
    for collection in &collections {
        purges.push(coordinator.purge_tombstones(collection, retention).await?);
    }
    for purge in &purges {
        println!("{purge}");
    }
    Ok(())
}
