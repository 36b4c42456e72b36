//! Applies, reverts and reports on the migrations of a [`Catalog`].
//!
//! The runner keeps no state between calls: whether a migration is pending
//! or applied is read from the [`Ledger`] every time. Each migration runs in
//! its own transaction together with its ledger write, so a failed migration
//! leaves no trace while the migrations before it stay committed.

mod report;

use crate::connection::{Connection, ConnectionConfig, RevertPolicy, Transaction};
use crate::core::{MigrateError, MigrationStep, Result};
use crate::ledger::{Ledger, LedgerShape};
use crate::migration::{Catalog, Migration, Reversibility};
use tracing::{debug, info, warn};

pub use report::{ApplyReport, MigrationState, RevertOutcome, StatusEntry, StatusReport};

#[derive(Debug, Clone)]
pub struct Runner {
    catalog: Catalog,
    ledger: Ledger,
    revert_policy: RevertPolicy,
}

impl Runner {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            ledger: Ledger::default(),
            revert_policy: RevertPolicy::default(),
        }
    }

    /// Runner using the ledger table and revert policy from `config`.
    pub fn from_config(config: &ConnectionConfig, catalog: Catalog) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(catalog)
            .ledger(Ledger::new(&config.ledger_table)?)
            .revert_policy(config.revert_policy))
    }

    pub fn ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn revert_policy(mut self, policy: RevertPolicy) -> Self {
        self.revert_policy = policy;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger_ref(&self) -> &Ledger {
        &self.ledger
    }

    /// Applies every pending migration in catalog order.
    ///
    /// Already applied migrations are skipped, so the call can be repeated.
    /// The first failure rolls back that migration's transaction and stops
    /// the run; migrations applied before it stay committed.
    pub async fn apply_all<C>(&self, conn: &mut C) -> Result<ApplyReport>
    where
        C: Connection + ?Sized,
    {
        info!("Running database migrations...");

        self.ledger
            .ensure_table(conn)
            .await
            .map_err(|e| MigrateError::EnsureLedger {
                table: self.ledger.table().to_string(),
                source: Box::new(e),
            })?;

        let mut report = ApplyReport::default();
        self.repair_unreadable_ledger(conn, &mut report).await?;

        for migration in self.catalog.all() {
            let id = migration.id();
            if report.applied.iter().any(|done| done == id) {
                continue;
            }
            let applied = self
                .ledger
                .is_applied(conn, id)
                .await
                .map_err(|e| e.at(id, MigrationStep::CheckStatus))?;

            if applied {
                info!("Migration {} already applied, skipping", id);
                report.skipped.push(id.to_string());
                continue;
            }

            info!("Applying migration: {}", id);
            self.apply_one(conn, migration.as_ref()).await?;
            info!("Successfully applied migration: {}", id);
            report.applied.push(id.to_string());
        }

        info!("Database migrations completed successfully");
        Ok(report)
    }

    /// Runs the catalog's ledger repair first when no lookup could read the
    /// ledger table, since every later step depends on reading it.
    async fn repair_unreadable_ledger<C>(
        &self,
        conn: &mut C,
        report: &mut ApplyReport,
    ) -> Result<()>
    where
        C: Connection + ?Sized,
    {
        let shape = self
            .ledger
            .shape(conn)
            .await
            .map_err(|e| MigrateError::EnsureLedger {
                table: self.ledger.table().to_string(),
                source: Box::new(e),
            })?;
        if !shape.needs_repair() {
            return Ok(());
        }
        if shape != LedgerShape::Unrecognized {
            debug!(table = self.ledger.table(), %shape, "reading ledger through legacy layout");
            return Ok(());
        }

        let Some(repair) = self.catalog.all().iter().find(|m| m.repairs_ledger()) else {
            warn!(
                table = self.ledger.table(),
                "ledger table has an unrecognized layout and no repair migration is registered"
            );
            return Ok(());
        };

        let id = repair.id();
        info!(
            "Ledger table {} has an unrecognized layout, applying {} first",
            self.ledger.table(),
            id
        );
        self.apply_one(conn, repair.as_ref()).await?;
        info!("Successfully applied migration: {}", id);
        report.applied.push(id.to_string());
        Ok(())
    }

    async fn apply_one<C>(&self, conn: &mut C, migration: &dyn Migration) -> Result<()>
    where
        C: Connection + ?Sized,
    {
        let id = migration.id();
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| e.at(id, MigrationStep::Begin))?;

        if let Err(err) = migration.apply(tx.as_mut()).await {
            rollback(tx, id).await;
            return Err(err.at(id, MigrationStep::Apply));
        }
        if let Err(err) = self
            .ledger
            .mark_applied(tx.as_mut(), id, migration.name())
            .await
        {
            rollback(tx, id).await;
            return Err(err.at(id, MigrationStep::MarkApplied));
        }

        tx.commit()
            .await
            .map_err(|e| e.at(id, MigrationStep::Commit))
    }

    /// Reverts the applied migration that comes last in catalog order.
    ///
    /// "Last" means highest catalog position among applied migrations, not
    /// most recent `applied_at`. With nothing applied this is a no-op.
    pub async fn revert_last<C>(&self, conn: &mut C) -> Result<RevertOutcome>
    where
        C: Connection + ?Sized,
    {
        info!("Rolling back last migration...");

        if self.catalog.is_empty() {
            info!("No migrations to roll back");
            return Ok(RevertOutcome::Nothing);
        }
        if self.ledger.shape(conn).await? == LedgerShape::Absent {
            info!("No applied migrations to roll back");
            return Ok(RevertOutcome::Nothing);
        }

        let mut last = None;
        for migration in self.catalog.all().iter().rev() {
            let applied = self
                .ledger
                .is_applied(conn, migration.id())
                .await
                .map_err(|e| e.at(migration.id(), MigrationStep::CheckStatus))?;
            if applied {
                last = Some(migration);
                break;
            }
        }

        let Some(migration) = last else {
            info!("No applied migrations to roll back");
            return Ok(RevertOutcome::Nothing);
        };
        let id = migration.id();

        if migration.reversibility() == Reversibility::Irreversible {
            match self.revert_policy {
                RevertPolicy::Refuse => return Err(MigrateError::Irreversible(id.to_string())),
                RevertPolicy::Permit => {
                    warn!("Migration {} is irreversible, only its ledger entry will be removed", id)
                }
            }
        }

        info!("Rolling back migration: {}", id);
        self.revert_one(conn, migration.as_ref()).await?;
        info!("Successfully rolled back migration: {}", id);

        Ok(RevertOutcome::Reverted(id.to_string()))
    }

    async fn revert_one<C>(&self, conn: &mut C, migration: &dyn Migration) -> Result<()>
    where
        C: Connection + ?Sized,
    {
        let id = migration.id();
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| e.at(id, MigrationStep::Begin))?;

        if let Err(err) = migration.revert(tx.as_mut()).await {
            rollback(tx, id).await;
            return Err(err.at(id, MigrationStep::Revert));
        }
        if let Err(err) = self.ledger.mark_unapplied(tx.as_mut(), id).await {
            rollback(tx, id).await;
            return Err(err.at(id, MigrationStep::MarkUnapplied));
        }

        tx.commit()
            .await
            .map_err(|e| e.at(id, MigrationStep::Commit))
    }

    /// Reports every migration as applied or pending, in catalog order.
    ///
    /// Never fails as a whole: a ledger read error is recorded against the
    /// migration it happened for and the scan continues.
    pub async fn status<C>(&self, conn: &mut C) -> StatusReport
    where
        C: Connection + ?Sized,
    {
        debug!("Migration Status:");

        let ledger_shape = match self.ledger.shape(conn).await {
            Ok(shape) => Some(shape),
            Err(err) => {
                warn!(error = %err, "could not inspect ledger table");
                None
            }
        };

        let mut entries = Vec::with_capacity(self.catalog.len());
        for migration in self.catalog.all() {
            let id = migration.id();
            let state = if ledger_shape == Some(LedgerShape::Absent) {
                MigrationState::Pending
            } else {
                match self.ledger.is_applied(conn, id).await {
                    Ok(true) => MigrationState::Applied,
                    Ok(false) => MigrationState::Pending,
                    Err(err) => MigrationState::Error(err.to_string()),
                }
            };

            debug!("  {}: {}", id, state);
            entries.push(StatusEntry {
                id: id.to_string(),
                state,
            });
        }

        StatusReport {
            ledger_shape,
            entries,
        }
    }
}

async fn rollback(tx: Box<dyn Transaction + '_>, id: &str) {
    if let Err(err) = tx.rollback().await {
        warn!(migration = id, error = %err, "rollback failed");
    }
}
