//! Weekly payout requests for held blobs.

use futures::future::join_all;
use strata_core::models::HostedBlob;
use tracing::{info, warn};

use crate::hoster::Hoster;
use crate::HosterError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requested: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Request payment for one blob if a payout is due and the deposit can
/// cover it. Returns whether a payout was requested.
pub async fn request_payment(hoster: &Hoster, blob: &HostedBlob) -> Result<bool, HosterError> {
    let hash = &blob.hash;
    let me = hoster.address();
    if !hoster.ledger().time_to_pay(me, hash).await? {
        return Ok(false);
    }
    if hoster
        .ledger()
        .get_deposit(&blob.owner_contract_address, hash)
        .await?
        .is_none()
    {
        warn!("Payment for {hash} is due but there is no deposit");
        return Ok(false);
    }

    hoster.ledger().request_payout(me, hash).await?;
    info!("Requested payment for {hash}");
    Ok(true)
}

/// Request payment for every held blob concurrently.
pub async fn sweep(hoster: &Hoster) -> Result<SweepReport, HosterError> {
    let blobs = hoster.node.blobs.list().await?;
    let results = join_all(blobs.iter().map(|blob| request_payment(hoster, blob))).await;

    let mut report = SweepReport::default();
    for (blob, result) in blobs.iter().zip(results) {
        match result {
            Ok(true) => report.requested += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!("Payment request for {} failed: {e}", blob.hash);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
