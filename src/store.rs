use crate::decoder::DecodedCredential;
use anyhow::Context;
use rusqlite::Connection;

/// Pre-migration stored value for one account, possibly ciphertext.
#[derive(Debug, Clone)]
pub struct LegacyCredentialBlob {
    pub id: i64,
    pub legacy_uri: String,
}

/// Engine-neutral column types for the columns this migration adds.
#[derive(Debug, Clone, Copy)]
pub enum ColumnType {
    VarChar(u16),
    Text,
    SmallUInt,
    UInt,
    BigUInt,
}

/// Storage collaborator for the credentials table: DDL primitives plus the
/// two row operations the backfill needs. Capability flags replace
/// driver-name branching (the orchestrator probes them once at start).
pub trait CredentialTable {
    /// Engine cannot add a NOT NULL column to a populated table without a
    /// default; columns must be added nullable and tightened afterward.
    fn requires_nullable_first(&self) -> bool;

    /// Engine needs pre-existing text columns re-declared as TEXT before
    /// the rename (compatibility shim, not a record-processing rule).
    fn requires_text_renormalization(&self) -> bool;

    fn add_column(&mut self, name: &str, ty: ColumnType, nullable: bool) -> anyhow::Result<()>;
    fn tighten_not_null(&mut self, columns: &[&str]) -> anyhow::Result<()>;
    fn renormalize_text_columns(&mut self, columns: &[&str]) -> anyhow::Result<()>;
    fn rename_column(&mut self, from: &str, to: &str) -> anyhow::Result<()>;
    fn drop_column(&mut self, name: &str) -> anyhow::Result<()>;

    fn fetch_legacy(&self, uri_column: &str) -> anyhow::Result<Vec<LegacyCredentialBlob>>;
    fn write_decoded(&mut self, id: i64, cred: &DecodedCredential) -> anyhow::Result<()>;
}

pub struct SqliteStore {
    conn: Connection,
    table: String,
}

#[derive(Debug)]
struct ColumnInfo {
    name: String,
    decl_type: String,
    notnull: bool,
    dflt_value: Option<String>,
    pk: bool,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(ty: ColumnType) -> String {
    match ty {
        ColumnType::VarChar(len) => format!("VARCHAR({len})"),
        ColumnType::Text => "TEXT".to_string(),
        // SQLite has a single integer storage class
        ColumnType::SmallUInt | ColumnType::UInt | ColumnType::BigUInt => "INTEGER".to_string(),
    }
}

impl SqliteStore {
    pub fn new(conn: Connection, table: &str) -> Self {
        Self {
            conn,
            table: table.to_string(),
        }
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn table_columns(&self) -> anyhow::Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(&self.table)))?;
        let cols = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    decl_type: row.get(2)?,
                    notnull: row.get::<_, i64>(3)? != 0,
                    dflt_value: row.get(4)?,
                    pk: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cols)
    }

    /// SQLite cannot alter a column in place, so both constraint tightening
    /// and type re-declaration go through a shadow-table rebuild: create the
    /// table again with the adjusted definitions, copy every row, drop the
    /// old table and rename the shadow into place.
    ///
    /// Indexes are not carried over; the credentials table has none.
    fn rebuild_with(&mut self, retype: &[(&str, &str)], not_null: &[&str]) -> anyhow::Result<()> {
        let columns = self.table_columns()?;
        anyhow::ensure!(!columns.is_empty(), "table '{}' does not exist", self.table);

        let mut defs = Vec::with_capacity(columns.len());
        for col in &columns {
            let ty = retype
                .iter()
                .find(|(name, _)| *name == col.name)
                .map(|(_, ty)| ty.to_string())
                .unwrap_or_else(|| col.decl_type.clone());

            let mut def = format!("{} {}", quote_ident(&col.name), ty);
            if col.pk {
                def.push_str(" PRIMARY KEY");
            }
            if col.notnull || not_null.contains(&col.name.as_str()) {
                def.push_str(" NOT NULL");
            }
            if let Some(dflt) = &col.dflt_value {
                def.push_str(&format!(" DEFAULT {dflt}"));
            }
            defs.push(def);
        }

        let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
        let table = quote_ident(&self.table);
        let shadow = quote_ident(&format!("{}__rebuild", self.table));

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE {shadow} ({defs});\n\
             INSERT INTO {shadow} SELECT {names} FROM {table};\n\
             DROP TABLE {table};\n\
             ALTER TABLE {shadow} RENAME TO {table};",
            defs = defs.join(", "),
            names = names.join(", "),
        ))
        .with_context(|| format!("rebuilding table '{}'", self.table))?;
        tx.commit()?;
        Ok(())
    }
}

impl CredentialTable for SqliteStore {
    fn requires_nullable_first(&self) -> bool {
        true
    }

    fn requires_text_renormalization(&self) -> bool {
        true
    }

    fn add_column(&mut self, name: &str, ty: ColumnType, nullable: bool) -> anyhow::Result<()> {
        let mut stmt = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(&self.table),
            quote_ident(name),
            sql_type(ty)
        );
        if !nullable {
            stmt.push_str(" NOT NULL");
        }
        self.conn
            .execute(&stmt, [])
            .with_context(|| format!("adding column '{name}'"))?;
        Ok(())
    }

    fn tighten_not_null(&mut self, columns: &[&str]) -> anyhow::Result<()> {
        self.rebuild_with(&[], columns)
    }

    fn renormalize_text_columns(&mut self, columns: &[&str]) -> anyhow::Result<()> {
        let retype: Vec<(&str, &str)> = columns.iter().map(|c| (*c, "TEXT")).collect();
        self.rebuild_with(&retype, &[])
    }

    fn rename_column(&mut self, from: &str, to: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                &format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    quote_ident(&self.table),
                    quote_ident(from),
                    quote_ident(to)
                ),
                [],
            )
            .with_context(|| format!("renaming column '{from}' to '{to}'"))?;
        Ok(())
    }

    fn drop_column(&mut self, name: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                &format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    quote_ident(&self.table),
                    quote_ident(name)
                ),
                [],
            )
            .with_context(|| format!("dropping column '{name}'"))?;
        Ok(())
    }

    fn fetch_legacy(&self, uri_column: &str) -> anyhow::Result<Vec<LegacyCredentialBlob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, {} FROM {} ORDER BY id",
            quote_ident(uri_column),
            quote_ident(&self.table)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyCredentialBlob {
                    id: row.get(0)?,
                    legacy_uri: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn write_decoded(&mut self, id: i64, cred: &DecodedCredential) -> anyhow::Result<()> {
        self.conn
            .execute(
                &format!(
                    "UPDATE {} SET otp_type = ?1, secret = ?2, algorithm = ?3, \
                     digits = ?4, period = ?5, counter = ?6 WHERE id = ?7",
                    quote_ident(&self.table)
                ),
                rusqlite::params![
                    cred.otp_type.as_str(),
                    cred.secret,
                    cred.algorithm,
                    cred.digits,
                    cred.period,
                    cred.counter,
                    id,
                ],
            )
            .with_context(|| format!("writing decoded fields for record {id}"))?;
        Ok(())
    }
}
