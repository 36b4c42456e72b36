use super::{Ledger, LedgerShape, quote_ident};
use crate::connection::Transaction;
use crate::core::Result;
use crate::migration::{Migration, Reversibility};
use async_trait::async_trait;
use tracing::{info, warn};

/// Rebuilds a legacy ledger table in the canonical layout.
///
/// | existing table            | action                                          |
/// |---------------------------|-------------------------------------------------|
/// | absent                    | create the canonical table                      |
/// | `(version, name, ..)`     | nothing                                         |
/// | `(id, name, applied_at)`  | rebuild, copying `id→version`, `name→name`      |
/// | `(id, applied_at)`        | rebuild, copying `id→version` and `id→name`     |
/// | anything else             | rebuild empty                                   |
///
/// Rebuilding renames the table to `<table>_old`, creates the canonical
/// table, copies rows and drops the old table, all in the transaction given
/// to `apply`, so a failure leaves the original table untouched.
///
/// Reverting is a no-op: a legacy layout cannot be restored from the
/// canonical one without guessing.
#[derive(Debug, Clone)]
pub struct LedgerRepair {
    id: String,
    ledger: Ledger,
}

impl LedgerRepair {
    pub fn new(id: &str, ledger: Ledger) -> Self {
        Self {
            id: id.to_string(),
            ledger,
        }
    }

    fn old_table(&self) -> String {
        quote_ident(&format!("{}_old", self.ledger.table()))
    }

    async fn rebuild(
        &self,
        tx: &mut dyn Transaction,
        shape: LedgerShape,
        columns: &[String],
    ) -> Result<()> {
        let table = self.ledger.table();
        let quoted = self.ledger.quoted();
        let old = self.old_table();

        tx.execute(&format!("ALTER TABLE {} RENAME TO {}", quoted, old), &[])
            .await?;
        tx.execute(&self.ledger.create_sql(false), &[]).await?;

        let applied_at = if columns.iter().any(|c| c.eq_ignore_ascii_case("applied_at")) {
            "applied_at"
        } else {
            "CURRENT_TIMESTAMP"
        };
        let source = match shape {
            LedgerShape::LegacyFull => Some("id, COALESCE(name, id)"),
            LedgerShape::LegacyMinimal => Some("id, id"),
            _ => None,
        };

        match source {
            Some(source) => {
                let copied = tx
                    .execute(
                        &format!(
                            "INSERT INTO {} (version, name, applied_at) SELECT {}, {} FROM {}",
                            quoted, source, applied_at, old
                        ),
                        &[],
                    )
                    .await?;
                info!(table, rows = copied, "copied ledger rows into canonical layout");
            }
            None => {
                let dropped = tx
                    .query(&format!("SELECT COUNT(*) FROM {}", old), &[])
                    .await?
                    .scalar()
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                if dropped > 0 {
                    warn!(table, rows = dropped, ?columns, "discarding rows of unrecognized ledger layout");
                }
            }
        }

        tx.execute(&format!("DROP TABLE {}", old), &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl Migration for LedgerRepair {
    fn id(&self) -> &str {
        &self.id
    }

    fn reversibility(&self) -> Reversibility {
        Reversibility::Irreversible
    }

    fn repairs_ledger(&self) -> bool {
        true
    }

    async fn apply(&self, tx: &mut dyn Transaction) -> Result<()> {
        let columns = tx.table_columns(self.ledger.table()).await?;
        let shape = LedgerShape::detect(columns.as_deref());
        info!(table = self.ledger.table(), %shape, "inspected ledger table");

        match shape {
            LedgerShape::Absent => {
                tx.execute(&self.ledger.create_sql(true), &[]).await?;
                Ok(())
            }
            LedgerShape::Canonical => Ok(()),
            LedgerShape::LegacyFull | LedgerShape::LegacyMinimal | LedgerShape::Unrecognized => {
                self.rebuild(tx, shape, columns.as_deref().unwrap_or_default())
                    .await
            }
        }
    }

    async fn revert(&self, _tx: &mut dyn Transaction) -> Result<()> {
        Ok(())
    }
}
