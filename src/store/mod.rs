//! [`UserStore`](crate::issuer::UserStore) and
//! [`DataStore`](crate::issuer::DataStore) implementations.

mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
