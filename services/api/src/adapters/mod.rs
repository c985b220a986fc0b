pub mod db;
pub mod memory;
pub mod notifier;
pub mod scanner;

pub use db::DbAdapter;
pub use memory::MemoryStore;
pub use notifier::LogNotifier;
pub use scanner::{EicarScanner, PassthroughScanner};
