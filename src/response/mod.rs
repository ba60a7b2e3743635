pub mod normalizer;
pub mod types;

pub use normalizer::{normalize, to_webhook_shape, EntityKind};
pub use types::Envelope;
