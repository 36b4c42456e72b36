use super::Migration;
use crate::core::{MigrateError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// The fixed, ordered list of every known migration.
///
/// The order of the list is the application order; `all()[i]` may assume
/// that `all()[..i]` has been applied. A catalog is built once from a
/// literal list and never changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    migrations: Arc<[Arc<dyn Migration>]>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(migrations: Vec<Arc<dyn Migration>>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(migrations.len());
        for migration in &migrations {
            if migration.id().is_empty() {
                return Err(MigrateError::Config("Migration id cannot be empty".into()));
            }
            if !seen.insert(migration.id()) {
                return Err(MigrateError::DuplicateMigration(migration.id().to_string()));
            }
        }

        Ok(Self {
            migrations: migrations.into(),
        })
    }

    /// All migrations in application order.
    pub fn all(&self) -> &[Arc<dyn Migration>] {
        &self.migrations
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Migration>> {
        self.migrations.iter().find(|m| m.id() == id)
    }

    /// Position of `id` in application order.
    pub fn position(&self, id: &str) -> Result<usize> {
        self.migrations
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| MigrateError::UnknownMigration(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.migrations.iter().map(|m| m.id())
    }
}
