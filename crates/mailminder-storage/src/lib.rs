mod error;
mod local;

pub use error::StorageError;
pub use local::LocalStore;
