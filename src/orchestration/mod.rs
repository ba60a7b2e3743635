pub mod manager;
pub mod types;

pub use manager::GroupManager;
pub use types::*;
