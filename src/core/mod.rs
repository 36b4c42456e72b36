pub mod error;
pub mod value;

pub use error::{MigrateError, MigrationStep, Result};
pub use value::{TIMESTAMP_FORMAT, Value};

pub type Row = Vec<Value>;
