//! Peripheral discovery and fallback candidate selection

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use offgrid_core::{HardwareAddress, PeripheralIdentity};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::central::Central;
use crate::error::Result;
use crate::protocol::MatchPeripheral;

/// Scan until `matcher` accepts a peripheral or `scan_timeout` elapses.
///
/// Returns `Ok(None)` on timeout. The scan is stopped in either case.
pub async fn scan_for_match<C, M>(
    central: &C,
    matcher: &M,
    scan_timeout: Duration,
) -> Result<Option<PeripheralIdentity>>
where
    C: Central + ?Sized,
    M: MatchPeripheral + ?Sized,
{
    let mut discovered = central.start_scan().await?;
    info!(timeout_ms = scan_timeout.as_millis() as u64, "Scanning for peer");

    let found = timeout(scan_timeout, async {
        while let Some(peripheral) = discovered.next().await {
            if matcher.matches(&peripheral) {
                info!(peer = %peripheral, "Found matching peripheral");
                return Some(peripheral);
            }
            debug!(peer = %peripheral, "Ignoring peripheral");
        }
        None
    })
    .await
    .unwrap_or(None);

    if let Err(e) = central.stop_scan().await {
        warn!("Failed to stop scan: {}", e);
    }

    Ok(found)
}

/// Peripherals to try after a fruitless scan, in order: known peripherals
/// whose names match, then the configured address list. Duplicate
/// addresses are removed, first occurrence wins.
pub async fn fallback_candidates<C, M>(
    central: &C,
    matcher: &M,
    known_addresses: &[HardwareAddress],
) -> Vec<PeripheralIdentity>
where
    C: Central + ?Sized,
    M: MatchPeripheral + ?Sized,
{
    let mut candidates = Vec::new();

    match central.known_peripherals().await {
        Ok(known) => {
            for peripheral in known.into_iter().filter(|p| matcher.matches(p)) {
                debug!(peer = %peripheral, "Known peripheral matches");
                candidates.push(peripheral);
            }
        }
        Err(e) => warn!("Could not list known peripherals: {}", e),
    }

    candidates.extend(known_addresses.iter().copied().map(PeripheralIdentity::new));

    let mut seen = HashSet::new();
    candidates.retain(|peripheral| seen.insert(peripheral.address));
    candidates
}
