use crate::config::sources::{ChannelSpec, SourcesConfig};
use crate::db::{self, models::*, DbPool};
use crate::error::Result;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Report of channel synchronization results
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub disabled: usize,
    pub re_enabled: usize,
    pub unchanged: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_summary(&self) {
        info!(
            "Channel sync completed: {} added, {} updated, {} disabled, {} re-enabled, {} unchanged, {} errors",
            self.added, self.updated, self.disabled, self.re_enabled, self.unchanged, self.errors.len()
        );

        if !self.errors.is_empty() {
            warn!("Sync errors:");
            for error in &self.errors {
                warn!("  - {}", error);
            }
        }
    }
}

/// Synchronize crawl channels from the source catalogue into the database
pub async fn sync_channels_from_config(
    pool: &DbPool,
    config: &SourcesConfig,
) -> Result<SyncReport> {
    let mut report = SyncReport::new();
    let specs = config.channels();

    info!(
        "Starting channel sync: {} sources ({} enabled), {} channels",
        config.sources.len(),
        config.enabled_count(),
        specs.len()
    );

    let existing = db::channels::list_channels(pool, None, i64::MAX, 0).await?;
    let mut existing_by_url: HashMap<String, Channel> =
        existing.into_iter().map(|c| (c.url.clone(), c)).collect();

    debug!(
        "Loaded {} existing channels from database",
        existing_by_url.len()
    );

    for spec in &specs {
        let result = match existing_by_url.remove(&spec.url) {
            Some(channel) => sync_existing_channel(pool, spec, &channel, &mut report).await,
            None => sync_new_channel(pool, spec, &mut report).await,
        };

        if let Err(e) = result {
            let error_msg = format!("Failed to sync channel '{}': {}", spec.url, e);
            warn!("{}", error_msg);
            report.errors.push(error_msg);
        }
    }

    // Whatever is left is no longer configured (or its source was disabled)
    for (url, channel) in existing_by_url {
        if channel.status == "disabled" {
            continue;
        }
        match db::channels::update_channel_status(
            pool,
            channel.id,
            "disabled",
            channel.error_count,
            channel.error_message.clone(),
        )
        .await
        {
            Ok(_) => {
                info!("Disabled channel no longer in config: {}", url);
                report.disabled += 1;
            }
            Err(e) => {
                let error_msg = format!("Failed to disable channel '{url}': {e}");
                warn!("{}", error_msg);
                report.errors.push(error_msg);
            }
        }
    }

    report.log_summary();
    Ok(report)
}

fn to_new_channel(spec: &ChannelSpec) -> NewChannel {
    NewChannel {
        url: spec.url.clone(),
        source: spec.source.clone(),
        category: spec.category.clone(),
        kind: spec.kind.as_str().to_string(),
    }
}

async fn sync_new_channel(pool: &DbPool, spec: &ChannelSpec, report: &mut SyncReport) -> Result<()> {
    debug!("Creating new channel: {}", spec.url);

    let channel = db::channels::create_channel(pool, &to_new_channel(spec)).await?;
    info!(
        "Created {} channel for {}: {} (id: {})",
        spec.kind.as_str(),
        spec.source,
        spec.url,
        channel.id
    );

    report.added += 1;
    Ok(())
}

async fn sync_existing_channel(
    pool: &DbPool,
    spec: &ChannelSpec,
    existing: &Channel,
    report: &mut SyncReport,
) -> Result<()> {
    let desired = to_new_channel(spec);

    let metadata_changed = existing.source != desired.source
        || existing.category != desired.category
        || existing.kind != desired.kind;
    let re_enabled = existing.status == "disabled";

    if !metadata_changed && !re_enabled {
        report.unchanged += 1;
        return Ok(());
    }

    // Keep an error status; the next successful crawl resets it
    let status = if re_enabled {
        "active"
    } else {
        existing.status.as_str()
    };
    db::channels::update_channel(pool, existing.id, &desired, status).await?;

    if re_enabled {
        info!("Re-enabled channel: {} (id: {})", spec.url, existing.id);
        report.re_enabled += 1;
    } else {
        info!("Updated channel: {} (id: {})", spec.url, existing.id);
        report.updated += 1;
    }

    Ok(())
}
