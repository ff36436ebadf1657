use crate::crypto::SecrecyGateway;
use crate::store::{ColumnType, CredentialTable};
use crate::transform::{BackfillSummary, backfill};
use tracing::{info, warn};

/// Original name of the opaque column.
pub const URI_COLUMN: &str = "uri";
/// Name the opaque column survives under after the forward migration.
pub const LEGACY_URI_COLUMN: &str = "legacy_uri";

const TYPED_COLUMNS: [(&str, ColumnType); 6] = [
    ("otp_type", ColumnType::VarChar(10)),
    ("secret", ColumnType::Text),
    ("algorithm", ColumnType::VarChar(20)),
    ("digits", ColumnType::SmallUInt),
    ("period", ColumnType::UInt),
    ("counter", ColumnType::BigUInt),
];

// period and counter stay nullable permanently: exactly one of them is
// set per record, depending on otp type.
const NOT_NULL_AFTER_BACKFILL: [&str; 4] = ["otp_type", "secret", "algorithm", "digits"];

/// Forward migration: add the typed columns, rename the opaque column to
/// `legacy_uri`, backfill every record through the transformer, then
/// tighten constraints. Any DDL failure aborts; bad records do not.
pub fn migrate_up(
    table: &mut dyn CredentialTable,
    gateway: Option<&SecrecyGateway>,
) -> anyhow::Result<BackfillSummary> {
    // Engines that cannot add a NOT NULL column to a populated table get
    // the columns nullable first and a tightening pass after the backfill;
    // the rest collapse the two steps at add time.
    let nullable_first = table.requires_nullable_first();
    for (name, ty) in TYPED_COLUMNS {
        let always_set = NOT_NULL_AFTER_BACKFILL.contains(&name);
        table.add_column(name, ty, nullable_first || !always_set)?;
    }

    if table.requires_text_renormalization() {
        table.renormalize_text_columns(&["account", URI_COLUMN])?;
    }

    table.rename_column(URI_COLUMN, LEGACY_URI_COLUMN)?;

    let summary = backfill(table, LEGACY_URI_COLUMN, gateway)?;
    info!(
        migrated = summary.migrated,
        skipped = summary.skipped,
        "backfill finished"
    );

    if summary.skipped > 0 {
        // Skipped records hold NULL typed fields, so the constraint cannot
        // be satisfied yet. Leave the columns nullable; re-running the
        // backfill after fixing the data picks up where this run left off.
        warn!(
            skipped = summary.skipped,
            "leaving typed columns nullable, some records were not migrated"
        );
    } else if nullable_first {
        table.tighten_not_null(&NOT_NULL_AFTER_BACKFILL)?;
    }

    Ok(summary)
}

/// Backward migration: drop the typed columns and restore the opaque
/// column's original name. Destructive for the typed fields, lossless for
/// the blob, independent of how the forward backfill went.
pub fn migrate_down(table: &mut dyn CredentialTable) -> anyhow::Result<()> {
    for (name, _) in TYPED_COLUMNS {
        table.drop_column(name)?;
    }
    table.rename_column(LEGACY_URI_COLUMN, URI_COLUMN)?;
    Ok(())
}
