//! Server-descriptor discovery and selection persistence.
//!
//! Build servers advertise themselves through JSON descriptor files in a
//! workspace's `.bsp/` directory; [`discover_configs`] reads them. User
//! choices made through the argument resolvers persist via
//! [`SelectionStore`], with [`JsonFileStore`] as the on-disk
//! implementation and [`InMemoryStore`] for tests.

pub mod discovery;
pub mod store;

pub use discovery::{BspConnectionDetails, discover_configs};
pub use store::{InMemoryStore, JsonFileStore, SelectionStore};
