//! Storage health check

use std::path::Path;

use anyhow::{Context, Result};

use crate::layout::Layout;

const PROBE_FILE: &str = ".bitdrop-health";

/// Verify the storage root is writable by creating and removing a probe file
pub async fn check_health(layout: &Layout) -> Result<()> {
    let probe = layout.root().join(PROBE_FILE);
    write_probe(&probe)
        .await
        .with_context(|| format!("storage health check failed at {}", layout.root().display()))
}

/// Returns true if storage is writable, false otherwise (non-panicking)
pub async fn is_healthy(layout: &Layout) -> bool {
    check_health(layout).await.is_ok()
}

async fn write_probe(probe: &Path) -> std::io::Result<()> {
    tokio::fs::write(probe, b"ok").await?;
    tokio::fs::remove_file(probe).await
}
