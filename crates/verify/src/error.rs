use thiserror::Error;

/// Reasons a verification batch is abandoned.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification API key not set (FUTUREHOUSE_API_KEY or FUTURE_HOUSE_API_KEY)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("job submission rejected ({status}): {body}")]
    Submission { status: u16, body: String },

    #[error("job {trajectory_id} ended with status {status}")]
    JobFailed { trajectory_id: String, status: String },

    #[error("job {trajectory_id} returned no answer")]
    MissingAnswer { trajectory_id: String },

    #[error("batch did not finish within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("service returned {answered} answers for {submitted} jobs")]
    Misaligned { submitted: usize, answered: usize },

    #[error("failed to write result file: {0}")]
    Io(#[from] std::io::Error),
}

impl VerificationError {
    /// What an operator should check first.
    pub fn hint(&self) -> &'static str {
        match self {
            VerificationError::MissingApiKey => "set FUTUREHOUSE_API_KEY in the environment or .env",
            VerificationError::Http(_) => "check network access to the verification service",
            VerificationError::Submission { status: 401 | 403, .. } => "check the verification API key",
            VerificationError::Submission { .. } => "check the job name and request payload",
            VerificationError::JobFailed { .. } | VerificationError::MissingAnswer { .. } => {
                "inspect the trajectory on the verification platform"
            }
            VerificationError::Timeout { .. } => "raise verification.timeout_secs or submit fewer questions",
            VerificationError::Misaligned { .. } => "retry the batch; the service dropped jobs",
            VerificationError::Io(_) => "check the output directory is writable",
        }
    }
}
