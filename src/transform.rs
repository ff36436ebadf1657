use crate::crypto::SecrecyGateway;
use crate::decoder::{self, DecodeError, DecodedCredential};
use crate::store::{CredentialTable, LegacyCredentialBlob};
use thiserror::Error;
use tracing::error;

/// Why a record was left without typed fields. Record-local and non-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("decode failed: {0}")]
    DecodeFailed(DecodeError),
}

/// Per-record result of one transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub migrated: usize,
    pub skipped: usize,
}

/// Decrypt (if enabled) and decode one blob. Pure with respect to storage;
/// the `gateway` is injected by the caller, `None` meaning encryption-at-rest
/// is disabled for this deployment.
fn decode_blob(
    blob: &LegacyCredentialBlob,
    gateway: Option<&SecrecyGateway>,
) -> Result<DecodedCredential, SkipReason> {
    let plaintext = match gateway {
        Some(gw) => gw
            .decrypt(&blob.legacy_uri)
            .map_err(|_| SkipReason::DecryptionFailed)?,
        None => blob.legacy_uri.clone(),
    };

    decoder::decode(&plaintext).map_err(SkipReason::DecodeFailed)
}

/// Transform one record: decrypt, decode, re-encrypt the secret, write back.
///
/// Decrypt/decode failures yield `Outcome::Skipped` and leave the record's
/// typed columns untouched; encryption and storage errors propagate (those
/// are fatal to the whole run).
pub fn transform(
    table: &mut dyn CredentialTable,
    blob: &LegacyCredentialBlob,
    gateway: Option<&SecrecyGateway>,
) -> anyhow::Result<Outcome> {
    match decode_blob(blob, gateway) {
        Ok(mut cred) => {
            if let Some(gw) = gateway {
                cred.secret = gw.encrypt(&cred.secret)?;
            }
            table.write_decoded(blob.id, &cred)?;
            Ok(Outcome::Success)
        }
        Err(reason) => Ok(Outcome::Skipped(reason)),
    }
}

/// Run the transformer over every row, isolating failure per record.
/// Emits exactly one error event per skipped record. Re-runnable: decoding
/// is deterministic, so already-migrated rows are simply rewritten.
pub fn backfill(
    table: &mut dyn CredentialTable,
    uri_column: &str,
    gateway: Option<&SecrecyGateway>,
) -> anyhow::Result<BackfillSummary> {
    let mut summary = BackfillSummary::default();

    for blob in table.fetch_legacy(uri_column)? {
        match transform(table, &blob, gateway)? {
            Outcome::Success => summary.migrated += 1,
            Outcome::Skipped(reason) => {
                error!(record_id = blob.id, %reason, "record left unmigrated");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}
