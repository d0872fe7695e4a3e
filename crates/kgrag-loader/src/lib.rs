mod directory;

pub use directory::{DirectoryLoader, DEFAULT_DATA_DIR};
