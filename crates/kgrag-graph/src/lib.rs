mod memory;
mod store;

pub use memory::{InMemoryConnector, InMemoryGraphStore};
pub use store::{Neo4jConnector, Neo4jGraphStore, DEFAULT_DATABASE};
