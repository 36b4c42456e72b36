//! The application's migration catalog.

use super::{Catalog, Migration, SqlMigration};
use crate::core::Result;
use crate::ledger::Ledger;
use std::sync::Arc;

pub const CREATE_USERS: &str = "001_create_users_table";
pub const CREATE_CONTACTS: &str = "002_create_contacts_table";
pub const FIX_LEDGER: &str = "003_fix_schema_migrations_table";

fn create_users() -> SqlMigration {
    SqlMigration::new(CREATE_USERS)
        .up(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL,
                password VARCHAR(255) NOT NULL,
                avatar_url VARCHAR(255) NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .up("CREATE INDEX IF NOT EXISTS idx_users_full_name ON users (full_name)")
        .up("CREATE INDEX IF NOT EXISTS idx_users_phone ON users (phone)")
        .up("CREATE INDEX IF NOT EXISTS idx_users_created_at ON users (created_at)")
        .down("DROP TABLE IF EXISTS users")
}

fn create_contacts() -> SqlMigration {
    SqlMigration::new(CREATE_CONTACTS)
        .up(
            "CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                full_name VARCHAR(255) NOT NULL,
                phone VARCHAR(20) NOT NULL,
                email VARCHAR(255) NULL,
                favorite BOOLEAN DEFAULT FALSE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CONSTRAINT fk_contacts_user_id FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            )",
        )
        .up("CREATE INDEX IF NOT EXISTS idx_contacts_full_name ON contacts (full_name)")
        .up("CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts (phone)")
        .up("CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts (email)")
        .up("CREATE INDEX IF NOT EXISTS idx_contacts_user_favorite ON contacts (user_id, favorite)")
        .up("CREATE INDEX IF NOT EXISTS idx_contacts_user_created ON contacts (user_id, created_at DESC)")
        .down("DROP TABLE IF EXISTS contacts")
}

/// Every migration the service ships, in application order.
pub fn catalog(ledger: &Ledger) -> Result<Catalog> {
    let migrations: Vec<Arc<dyn Migration>> = vec![
        Arc::new(create_users()),
        Arc::new(create_contacts()),
        Arc::new(ledger.repair(FIX_LEDGER)),
    ];
    Catalog::new(migrations)
}
