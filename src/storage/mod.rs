pub mod instances;
pub mod lmdb;
pub mod status;
pub mod users;

pub use instances::LmdbInstanceRegistry;
pub use lmdb::{NodeDatabase, SharedNodeDatabase, StorageError};
pub use status::LmdbStatusStore;
pub use users::LmdbUserStore;
