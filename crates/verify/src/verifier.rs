use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::error::VerificationError;
use crate::record::{self, HypothesisResult};
use crate::service::{Job, JobKind, VerificationService};

pub const DEFAULT_MAX_QUESTIONS: usize = 2;

pub struct HypothesisVerifier {
    service: Arc<dyn VerificationService>,
    output_dir: PathBuf,
    max_questions: usize,
    job_kind: JobKind,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl HypothesisVerifier {
    /// Creates `output_dir` if it does not exist yet.
    pub fn new(
        service: Arc<dyn VerificationService>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, VerificationError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            service,
            output_dir,
            max_questions: DEFAULT_MAX_QUESTIONS,
            job_kind: JobKind::default(),
            clock: local_now,
        })
    }

    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    pub fn with_job_kind(mut self, job_kind: JobKind) -> Self {
        self.job_kind = job_kind;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Submit the first `max_questions` questions as one batch and persist
    /// each answer. Any failure abandons the batch and yields no results.
    pub async fn verify(&self, questions: &[String]) -> Vec<HypothesisResult> {
        match self.try_verify(questions).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, hint = e.hint(), "Verification batch abandoned");
                Vec::new()
            }
        }
    }

    pub async fn try_verify(&self, questions: &[String]) -> Result<Vec<HypothesisResult>, VerificationError> {
        let selected = &questions[..questions.len().min(self.max_questions)];
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let jobs: Vec<Job> = selected
            .iter()
            .map(|q| Job {
                kind: self.job_kind,
                query: q.clone(),
            })
            .collect();

        info!(
            submitted = jobs.len(),
            of = questions.len(),
            job = %self.job_kind,
            "Sending verification requests"
        );
        let started = Instant::now();
        let answers = self.service.run_batch(&jobs).await?;
        info!(elapsed_s = started.elapsed().as_secs_f64(), "Verification batch finished");

        if answers.len() != selected.len() {
            return Err(VerificationError::Misaligned {
                submitted: selected.len(),
                answered: answers.len(),
            });
        }

        let mut results = Vec::with_capacity(selected.len());
        for (i, (question, answer)) in selected.iter().zip(answers).enumerate() {
            let timestamp = (self.clock)();
            let file_path = self.output_dir.join(record::file_name(i + 1, question, &timestamp));
            let contents = record::render(self.job_kind, question, &answer, &timestamp);
            tokio::fs::write(&file_path, contents).await?;

            info!(question_number = i + 1, path = %file_path.display(), "Saved verification result");
            results.push(HypothesisResult {
                question: question.clone(),
                answer,
                timestamp,
                file_path,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Echoes each query back, recording the batches it saw.
    #[derive(Default)]
    struct EchoService {
        batches: Mutex<Vec<Vec<Job>>>,
        drop_last: bool,
        fail: bool,
    }

    #[async_trait]
    impl VerificationService for EchoService {
        async fn run_batch(&self, jobs: &[Job]) -> Result<Vec<String>, VerificationError> {
            self.batches.lock().unwrap().push(jobs.to_vec());
            if self.fail {
                return Err(VerificationError::Timeout { seconds: 1 });
            }
            let mut answers: Vec<String> = jobs.iter().map(|j| format!("Answer to: {}", j.query)).collect();
            if self.drop_last {
                answers.pop();
            }
            Ok(answers)
        }
    }

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 600_000)
            .unwrap()
    }

    fn questions(n: usize) -> Vec<String> {
        (1..=n)
            .map(|i| format!("Has posture {} followed by fatigue?", i))
            .collect()
    }

    #[tokio::test]
    async fn only_the_first_two_questions_are_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(EchoService::default());
        let verifier = HypothesisVerifier::new(service.clone(), dir.path())
            .unwrap()
            .with_clock(fixed_clock);

        let results = verifier.verify(&questions(5)).await;

        assert_eq!(results.len(), 2);
        let batches = service.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].query, "Has posture 2 followed by fatigue?");
        assert_eq!(batches[0][0].kind, JobKind::Owl);
    }

    #[tokio::test]
    async fn results_are_written_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = HypothesisVerifier::new(Arc::new(EchoService::default()), dir.path())
            .unwrap()
            .with_clock(fixed_clock);

        let results = verifier.verify(&questions(2)).await;

        let first = &results[0];
        assert_eq!(
            first.file_path,
            dir.path().join("q1_has_posture_1_followed_20250102_030405.txt")
        );
        let contents = std::fs::read_to_string(&first.file_path).unwrap();
        assert!(contents.contains("Question: Has posture 1 followed by fatigue?\n"));
        assert!(contents.contains("Timestamp: 2025-01-02T03:04:05.600000\n"));
        assert!(contents.ends_with("Answer to: Has posture 1 followed by fatigue?\n\n"));
        assert_eq!(first.answer, "Answer to: Has posture 1 followed by fatigue?");
    }

    #[tokio::test]
    async fn batch_size_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = HypothesisVerifier::new(Arc::new(EchoService::default()), dir.path())
            .unwrap()
            .with_max_questions(4)
            .with_job_kind(JobKind::Crow);

        let results = verifier.verify(&questions(3)).await;
        assert_eq!(results.len(), 3);
        let contents = std::fs::read_to_string(&results[2].file_path).unwrap();
        assert!(contents.contains("HYPOTHESIS VERIFICATION RESULT (CROW)"));
    }

    #[tokio::test]
    async fn service_failure_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(EchoService { fail: true, ..EchoService::default() });
        let verifier = HypothesisVerifier::new(service, dir.path()).unwrap();

        assert!(verifier.verify(&questions(3)).await.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn short_answer_list_abandons_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(EchoService { drop_last: true, ..EchoService::default() });
        let verifier = HypothesisVerifier::new(service, dir.path()).unwrap();

        let err = verifier.try_verify(&questions(2)).await.unwrap_err();
        assert!(matches!(err, VerificationError::Misaligned { submitted: 2, answered: 1 }));
        assert!(verifier.verify(&questions(2)).await.is_empty());
    }

    #[tokio::test]
    async fn no_questions_means_no_call() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(EchoService::default());
        let verifier = HypothesisVerifier::new(service.clone(), dir.path()).unwrap();

        assert!(verifier.verify(&[]).await.is_empty());
        assert!(service.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn output_directory_is_created_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("hypothesis_results");
        HypothesisVerifier::new(Arc::new(EchoService::default()), &nested).unwrap();
        HypothesisVerifier::new(Arc::new(EchoService::default()), &nested).unwrap();
        assert!(nested.is_dir());
    }
}
