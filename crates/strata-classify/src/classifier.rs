use crate::assessor::{
    Assessment, ComplexityAssessor, ConfidenceAssessor, PriorityAssessor, QualityAssessor,
    SubAssessor,
};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{ClassificationResult, Request, StrataResult};
use tracing::{debug, warn};

/// Retry behavior for failing sub-assessors.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Retries per sub-assessor after the initial attempt.
    pub max_retries: u32,
    /// Base backoff, doubled on each retry.
    pub backoff_base: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(200),
        }
    }
}

/// Fans four sub-assessors out over a request and joins their partial
/// results into one [`ClassificationResult`].
///
/// The join blocks on the slowest assessor. A sub-assessor that fails
/// all its retries contributes the conservative value for its field
/// (complexity 100, confidence 0, quality 0, no tags) rather than
/// aborting classification.
pub struct Classifier {
    priority: Arc<dyn SubAssessor>,
    complexity: Arc<dyn SubAssessor>,
    quality: Arc<dyn SubAssessor>,
    confidence: Arc<dyn SubAssessor>,
    config: ClassifierConfig,
}

impl Classifier {
    /// Creates a classifier with the built-in assessors and the given
    /// priority vocabulary.
    pub fn new(priority_vocabulary: Vec<String>, config: ClassifierConfig) -> StrataResult<Self> {
        Ok(Self {
            priority: Arc::new(PriorityAssessor::new(priority_vocabulary)?),
            complexity: Arc::new(ComplexityAssessor::new()?),
            quality: Arc::new(QualityAssessor),
            confidence: Arc::new(ConfidenceAssessor::new()?),
            config,
        })
    }

    /// Creates a classifier with custom assessors. The four slots map
    /// onto the four fields of [`ClassificationResult`].
    pub fn with_assessors(
        priority: Arc<dyn SubAssessor>,
        complexity: Arc<dyn SubAssessor>,
        quality: Arc<dyn SubAssessor>,
        confidence: Arc<dyn SubAssessor>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            priority,
            complexity,
            quality,
            confidence,
            config,
        }
    }

    /// Classifies a request.
    ///
    /// Deterministic for an unchanged request under an unchanged
    /// configuration: all built-in assessors are pure functions of the
    /// payload.
    pub async fn classify(&self, request: &Request) -> ClassificationResult {
        let (priority, complexity, quality, confidence) = tokio::join!(
            run_with_retry(&*self.priority, request, &self.config),
            run_with_retry(&*self.complexity, request, &self.config),
            run_with_retry(&*self.quality, request, &self.config),
            run_with_retry(&*self.confidence, request, &self.config),
        );

        let mut result = ClassificationResult {
            complexity_score: 100,
            priority_tags: Default::default(),
            quality_score: 0,
            confidence: 0,
        };

        match priority {
            Some(Assessment::Priority(tags)) => result.priority_tags = tags,
            other => log_substitution("priority", other),
        }
        match complexity {
            Some(Assessment::Complexity(score)) => result.complexity_score = score,
            other => log_substitution("complexity", other),
        }
        match quality {
            Some(Assessment::Quality(score)) => result.quality_score = score,
            other => log_substitution("quality", other),
        }
        match confidence {
            Some(Assessment::Confidence(score)) => result.confidence = score,
            other => log_substitution("confidence", other),
        }

        debug!(
            request_id = %request.id,
            complexity = result.complexity_score,
            quality = result.quality_score,
            confidence = result.confidence,
            tags = ?result.priority_tags,
            "Classification complete"
        );

        result
    }
}

fn log_substitution(field: &str, got: Option<Assessment>) {
    warn!(
        field,
        produced_wrong_kind = got.is_some(),
        "Sub-assessor exhausted retries, substituting conservative default"
    );
}

async fn run_with_retry(
    assessor: &dyn SubAssessor,
    request: &Request,
    config: &ClassifierConfig,
) -> Option<Assessment> {
    let mut attempt = 0u32;
    loop {
        match assessor.assess(request) {
            Ok(assessment) => return Some(assessment),
            Err(e) => {
                if attempt >= config.max_retries {
                    warn!(
                        assessor = assessor.name(),
                        attempts = attempt + 1,
                        error = %e,
                        "Sub-assessor failed all attempts"
                    );
                    return None;
                }
                let backoff = config.backoff_base * 2u32.saturating_pow(attempt);
                debug!(
                    assessor = assessor.name(),
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Sub-assessor failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use strata_core::StrataError;
    use uuid::Uuid;

    struct FlakyAssessor {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl FlakyAssessor {
        fn new(fail_times: u32) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl SubAssessor for FlakyAssessor {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn assess(&self, _request: &Request) -> StrataResult<Assessment> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(StrataError::Classification("transient".to_string()))
            } else {
                Ok(Assessment::Complexity(40))
            }
        }
    }

    struct FixedAssessor(Assessment);

    impl SubAssessor for FixedAssessor {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn assess(&self, _request: &Request) -> StrataResult<Assessment> {
            Ok(self.0.clone())
        }
    }

    fn fixed(assessment: Assessment) -> Arc<dyn SubAssessor> {
        Arc::new(FixedAssessor(assessment))
    }

    #[tokio::test]
    async fn test_classify_merges_all_four() {
        let classifier = Classifier::new(
            PriorityAssessor::default_vocabulary(),
            ClassifierConfig::default(),
        )
        .unwrap();
        let request = Request::new(
            "deploy the payment service and then audit the rollout",
            Uuid::new_v4(),
        );

        let result = classifier.classify(&request).await;
        assert!(result.priority_tags.contains("deploy"));
        assert!(result.complexity_score > 0);
        assert!(result.confidence > 0);
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let classifier = Classifier::new(
            PriorityAssessor::default_vocabulary(),
            ClassifierConfig::default(),
        )
        .unwrap();
        let request = Request::new("migrate the user table to the new schema", Uuid::new_v4());

        let first = classifier.classify(&request).await;
        let second = classifier.classify(&request).await;
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_assessor_recovers_within_retry_budget() {
        // Fails twice, succeeds on the third attempt — within the
        // 1 initial + 2 retries budget.
        let classifier = Classifier::with_assessors(
            fixed(Assessment::Priority(Default::default())),
            Arc::new(FlakyAssessor::new(2)),
            fixed(Assessment::Quality(60)),
            fixed(Assessment::Confidence(80)),
            ClassifierConfig::default(),
        );
        let request = Request::new("anything", Uuid::new_v4());

        let result = classifier.classify(&request).await;
        assert_eq!(result.complexity_score, 40);
        assert_eq!(result.confidence, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_assessor_substitutes_conservative_default() {
        let classifier = Classifier::with_assessors(
            fixed(Assessment::Priority(Default::default())),
            Arc::new(FlakyAssessor::new(10)),
            fixed(Assessment::Quality(60)),
            Arc::new(FlakyAssessor::new(10)),
            ClassifierConfig::default(),
        );
        let request = Request::new("anything", Uuid::new_v4());

        let result = classifier.classify(&request).await;
        // Complexity forced to maximum scrutiny, confidence to zero.
        assert_eq!(result.complexity_score, 100);
        assert_eq!(result.confidence, 0);
        // The healthy assessor still contributes.
        assert_eq!(result.quality_score, 60);
    }
}
