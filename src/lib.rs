//! Client-side coordination for remote sessions driven through a single
//! webhook endpoint: request validation, response normalization, status
//! tracking, and polling with timeouts.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod poller;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

mod test_helpers;

pub use client::HubClient;
pub use config::HubConfig;
pub use error::{Failure, FailureKind, HubError, ValidationError};
pub use orchestration::{GroupManager, GroupSpec, OrchestrationGroup};
pub use poller::{wait_for_completion, WaitOptions, WaitOutcome, WaitReport};
pub use request::CreateSessionParams;
pub use response::Envelope;
pub use session::{Session, SessionStatus, SessionTracker, SessionType};
pub use transport::{HttpTransport, Transport};
