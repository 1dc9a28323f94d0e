pub mod error;
pub mod record;
pub mod service;
pub mod verifier;

pub use error::VerificationError;
pub use record::HypothesisResult;
pub use service::{DEFAULT_BASE_URL, FutureHouseClient, Job, JobKind, VerificationService};
pub use verifier::{DEFAULT_MAX_QUESTIONS, HypothesisVerifier};
