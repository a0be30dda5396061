use anyhow::Result;

use savor_core::sync::SyncCoordinator;

use super::helpers::print_json;

pub(crate) async fn cmd_mirror_status(sync: &SyncCoordinator, json: bool) -> Result<()> {
    let status = sync.mirror_status().await?;

    if json {
        return print_json(&status);
    }

    println!("In sync: {}", status.in_sync.len());
    if status.is_consistent() {
        println!("Mirror matches saved recipes");
        return Ok(());
    }
    if !status.missing.is_empty() {
        println!("\nSaved but not mirrored:");
        for key in &status.missing {
            println!("  {key}");
        }
    }
    if !status.stale.is_empty() {
        println!("\nMirrored but not saved:");
        for key in &status.stale {
            println!("  {key}");
        }
    }
    println!("\nRun `savor mirror resync` to fix.");
    Ok(())
}

pub(crate) async fn cmd_mirror_resync(sync: &SyncCoordinator, json: bool) -> Result<()> {
    let report = sync.resync_mirror().await?;

    if json {
        return print_json(&report);
    }

    println!(
        "Created {}, updated {}, deleted {}, unchanged {}",
        report.created, report.updated, report.deleted, report.unchanged
    );
    if report.failed > 0 {
        eprintln!(
            "Warning: {} document(s) could not be reconciled (run with SAVOR_LOG=warn for details)",
            report.failed
        );
    }
    Ok(())
}
