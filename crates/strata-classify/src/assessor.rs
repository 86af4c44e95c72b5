use regex::Regex;
use std::collections::BTreeSet;
use strata_core::{Request, StrataError, StrataResult};

/// A partial classification produced by one sub-assessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Priority tags detected in the payload.
    Priority(BTreeSet<String>),
    /// Complexity score in `[0, 100]`.
    Complexity(u8),
    /// Input quality score in `[0, 100]`.
    Quality(u8),
    /// Classifier confidence in `[0, 100]`.
    Confidence(u8),
}

/// A single sub-assessor: a pure function of the request.
///
/// Implementations must be deterministic for an unchanged request —
/// re-classification under unchanged configuration yields the same
/// result.
pub trait SubAssessor: Send + Sync {
    /// Short name used in logs and retry accounting.
    fn name(&self) -> &'static str;

    /// Assesses the request.
    fn assess(&self, request: &Request) -> StrataResult<Assessment>;
}

/// Detects priority signals by matching a configured vocabulary against
/// the payload, whole words only, case-insensitive.
pub struct PriorityAssessor {
    pattern: Regex,
    vocabulary: Vec<String>,
}

impl PriorityAssessor {
    /// Builds an assessor for the given vocabulary.
    pub fn new(vocabulary: Vec<String>) -> StrataResult<Self> {
        let alternation = vocabulary
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b({alternation})\b"))
            .map_err(|e| StrataError::Classification(format!("Invalid priority pattern: {e}")))?;
        Ok(Self {
            pattern,
            vocabulary,
        })
    }

    /// The default priority vocabulary.
    pub fn default_vocabulary() -> Vec<String> {
        [
            "critical", "urgent", "deploy", "security", "incident", "production", "outage",
            "rollback", "hotfix",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }
}

impl SubAssessor for PriorityAssessor {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn assess(&self, request: &Request) -> StrataResult<Assessment> {
        let mut tags = BTreeSet::new();
        for found in self.pattern.find_iter(&request.payload) {
            let lowered = found.as_str().to_lowercase();
            // Normalize back onto the vocabulary entry so tags are stable
            // regardless of input casing.
            if let Some(word) = self.vocabulary.iter().find(|w| w.to_lowercase() == lowered) {
                tags.insert(word.clone());
            }
        }
        Ok(Assessment::Priority(tags))
    }
}

/// Scores complexity from payload size, clause structure, and the
/// presence of compound-work verbs.
pub struct ComplexityAssessor {
    compound_verbs: Regex,
    clause_breaks: Regex,
}

impl ComplexityAssessor {
    /// Builds the assessor with its built-in keyword tables.
    pub fn new() -> StrataResult<Self> {
        let compound_verbs = Regex::new(
            r"(?i)\b(refactor|migrate|integrate|orchestrate|redesign|implement|architect|audit|benchmark|parallelize|optimi[sz]e)\b",
        )
        .map_err(|e| StrataError::Classification(format!("Invalid complexity pattern: {e}")))?;
        let clause_breaks = Regex::new(r"(?i)\b(and|then|after|before|while|also)\b|[;,]")
            .map_err(|e| StrataError::Classification(format!("Invalid clause pattern: {e}")))?;
        Ok(Self {
            compound_verbs,
            clause_breaks,
        })
    }
}

impl SubAssessor for ComplexityAssessor {
    fn name(&self) -> &'static str {
        "complexity"
    }

    fn assess(&self, request: &Request) -> StrataResult<Assessment> {
        let words = request.payload.split_whitespace().count();
        let mut score = (words / 4).min(40) as u32;
        score += 12 * self.compound_verbs.find_iter(&request.payload).count() as u32;
        score += 6 * self.clause_breaks.find_iter(&request.payload).count() as u32;
        Ok(Assessment::Complexity(score.min(100) as u8))
    }
}

/// Scores input quality: well-formed, structured payloads score high,
/// fragments and shouting score low.
pub struct QualityAssessor;

impl SubAssessor for QualityAssessor {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn assess(&self, request: &Request) -> StrataResult<Assessment> {
        let payload = request.payload.trim();
        let mut score: i32 = 70;

        let words = payload.split_whitespace().count();
        if words < 3 {
            score -= 30;
        } else if words >= 8 {
            score += 10;
        }
        if payload.ends_with(['.', '?', '!']) {
            score += 10;
        }
        let letters = payload.chars().filter(|c| c.is_alphabetic()).count();
        let uppercase = payload.chars().filter(|c| c.is_uppercase()).count();
        if letters > 0 && uppercase * 2 > letters {
            score -= 20;
        }
        Ok(Assessment::Quality(score.clamp(0, 100) as u8))
    }
}

/// Scores how confidently the payload can be acted on. Ambiguity markers
/// and very short payloads pull confidence down.
pub struct ConfidenceAssessor {
    ambiguity: Regex,
}

impl ConfidenceAssessor {
    /// Builds the assessor with its built-in ambiguity table.
    pub fn new() -> StrataResult<Self> {
        let ambiguity = Regex::new(
            r"(?i)\b(maybe|somehow|something|whatever|etc|possibly|unsure|unclear|idk)\b|\?",
        )
        .map_err(|e| StrataError::Classification(format!("Invalid ambiguity pattern: {e}")))?;
        Ok(Self { ambiguity })
    }
}

impl SubAssessor for ConfidenceAssessor {
    fn name(&self) -> &'static str {
        "confidence"
    }

    fn assess(&self, request: &Request) -> StrataResult<Assessment> {
        let mut score: i32 = 90;
        score -= 15 * self.ambiguity.find_iter(&request.payload).count() as i32;
        let words = request.payload.split_whitespace().count();
        if words < 3 {
            score -= 25;
        }
        Ok(Assessment::Confidence(score.clamp(0, 100) as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(payload: &str) -> Request {
        Request::new(payload, Uuid::new_v4())
    }

    #[test]
    fn test_priority_detects_whole_words_case_insensitive() {
        let assessor = PriorityAssessor::new(PriorityAssessor::default_vocabulary()).unwrap();
        let result = assessor
            .assess(&request("DEPLOY the fix to production"))
            .unwrap();
        let Assessment::Priority(tags) = result else {
            panic!("wrong assessment kind");
        };
        assert!(tags.contains("deploy"));
        assert!(tags.contains("production"));
        assert!(!tags.contains("critical"));
    }

    #[test]
    fn test_priority_ignores_substrings() {
        let assessor = PriorityAssessor::new(PriorityAssessor::default_vocabulary()).unwrap();
        let result = assessor.assess(&request("redeployment notes")).unwrap();
        let Assessment::Priority(tags) = result else {
            panic!("wrong assessment kind");
        };
        assert!(tags.is_empty());
    }

    #[test]
    fn test_complexity_scales_with_structure() {
        let assessor = ComplexityAssessor::new().unwrap();
        let Assessment::Complexity(simple) = assessor.assess(&request("list files")).unwrap()
        else {
            panic!("wrong assessment kind");
        };
        let Assessment::Complexity(compound) = assessor
            .assess(&request(
                "refactor the parser, migrate the storage layer, and then benchmark the \
                 new pipeline against the old one while keeping the API stable",
            ))
            .unwrap()
        else {
            panic!("wrong assessment kind");
        };
        assert!(simple < 20);
        assert!(compound > 60);
    }

    #[test]
    fn test_quality_penalizes_fragments_and_shouting() {
        let assessor = QualityAssessor;
        let Assessment::Quality(fragment) = assessor.assess(&request("fix")).unwrap() else {
            panic!("wrong assessment kind");
        };
        let Assessment::Quality(shouting) =
            assessor.assess(&request("FIX THE BUILD RIGHT NOW PLEASE")).unwrap()
        else {
            panic!("wrong assessment kind");
        };
        let Assessment::Quality(clean) = assessor
            .assess(&request(
                "Please update the retry logic in the dispatcher to cap at three attempts.",
            ))
            .unwrap()
        else {
            panic!("wrong assessment kind");
        };
        assert!(fragment < clean);
        assert!(shouting < clean);
    }

    #[test]
    fn test_confidence_drops_on_ambiguity() {
        let assessor = ConfidenceAssessor::new().unwrap();
        let Assessment::Confidence(vague) = assessor
            .assess(&request("maybe do something with the cache somehow?"))
            .unwrap()
        else {
            panic!("wrong assessment kind");
        };
        let Assessment::Confidence(clear) = assessor
            .assess(&request("Rotate the API keys for the staging environment."))
            .unwrap()
        else {
            panic!("wrong assessment kind");
        };
        assert!(vague < 70);
        assert!(clear >= 85);
    }

    #[test]
    fn test_assessors_are_deterministic() {
        let assessor = ComplexityAssessor::new().unwrap();
        let req = request("integrate the billing service and then audit the results");
        let first = assessor.assess(&req).unwrap();
        let second = assessor.assess(&req).unwrap();
        assert_eq!(first, second);
    }
}
