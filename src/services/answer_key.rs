use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::models::domain::{QuestionKind, QuizVariant};

/// Grading rule for a variant's free-response question.
///
/// Implementations must be deterministic: the same raw answer always earns
/// the same points, so re-grading an attempt can never change its score.
pub trait ProblemSolvingGrader: Send + Sync {
    /// Points earned for a raw student answer.
    fn grade(&self, raw: &str) -> f64;
    fn max_points(&self) -> f64;
    /// Minimum points at which the question counts as answered correctly.
    fn correct_threshold(&self) -> f64 {
        self.max_points()
    }
    /// Reference answer shown in result breakdowns, when one exists.
    fn reference_answer(&self) -> Option<String> {
        None
    }
}

/// Full credit when the first number in the answer lands within a relative
/// tolerance of the target, zero otherwise.
pub struct NumericTolerance {
    pub target: f64,
    pub tolerance_ratio: f64,
    pub points: f64,
}

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-?\d+(?:\.\d+)?").expect("NUMBER_PATTERN is a valid regex pattern")
});

impl NumericTolerance {
    fn extract_number(raw: &str) -> Option<f64> {
        let normalized = raw.replace(',', "");
        NUMBER_PATTERN
            .find(&normalized)
            .and_then(|m| m.as_str().parse::<f64>().ok())
    }
}

impl ProblemSolvingGrader for NumericTolerance {
    fn grade(&self, raw: &str) -> f64 {
        match Self::extract_number(raw) {
            Some(value) if (value - self.target).abs() <= self.tolerance_ratio * self.target.abs() => {
                self.points
            }
            _ => 0.0,
        }
    }

    fn max_points(&self) -> f64 {
        self.points
    }

    fn reference_answer(&self) -> Option<String> {
        Some(format!("{}", self.target))
    }
}

/// Partial credit per solution step demonstrated, detected by keyword. Case
/// insensitive; each keyword counts once.
pub struct KeywordSteps {
    pub keywords: &'static [&'static str],
    pub points_per_step: f64,
    pub correct_min_points: f64,
}

impl ProblemSolvingGrader for KeywordSteps {
    fn grade(&self, raw: &str) -> f64 {
        let lowered = raw.to_lowercase();
        let matched = self
            .keywords
            .iter()
            .filter(|keyword| lowered.contains(&keyword.to_lowercase()))
            .count();
        matched as f64 * self.points_per_step
    }

    fn max_points(&self) -> f64 {
        self.keywords.len() as f64 * self.points_per_step
    }

    fn correct_threshold(&self) -> f64 {
        self.correct_min_points
    }
}

/// Static description of one quiz variant: the ordered multiple-choice key
/// plus the grader for the closing free-response question.
pub struct QuizVariantSpec {
    pub variant: QuizVariant,
    multiple_choice_key: &'static [&'static str],
    problem_solving: Option<Box<dyn ProblemSolvingGrader>>,
}

impl QuizVariantSpec {
    pub fn total_questions(&self) -> i32 {
        self.multiple_choice_key.len() as i32 + i32::from(self.problem_solving.is_some())
    }

    pub fn max_points(&self) -> f64 {
        let mc = self.multiple_choice_key.len() as f64;
        mc + self
            .problem_solving
            .as_ref()
            .map(|grader| grader.max_points())
            .unwrap_or(0.0)
    }

    /// 1-based index of the free-response slot, which always follows the
    /// multiple-choice block.
    pub fn problem_solving_index(&self) -> Option<i32> {
        self.problem_solving
            .as_ref()
            .map(|_| self.multiple_choice_key.len() as i32 + 1)
    }

    /// Whether an answer for this index/kind pair fits the variant layout.
    pub fn accepts(&self, question_index: i32, kind: QuestionKind) -> bool {
        self.kind_for_index(question_index) == Some(kind)
    }

    pub fn kind_for_index(&self, question_index: i32) -> Option<QuestionKind> {
        if question_index >= 1 && question_index <= self.multiple_choice_key.len() as i32 {
            Some(QuestionKind::MultipleChoice)
        } else if Some(question_index) == self.problem_solving_index() {
            Some(QuestionKind::ProblemSolving)
        } else {
            None
        }
    }

    /// The correct letter for a 1-based multiple-choice index.
    pub fn multiple_choice_answer(&self, question_index: i32) -> Option<&'static str> {
        if question_index < 1 {
            return None;
        }
        self.multiple_choice_key.get(question_index as usize - 1).copied()
    }

    pub fn multiple_choice_key(&self) -> &'static [&'static str] {
        self.multiple_choice_key
    }

    pub fn grader(&self) -> Option<&dyn ProblemSolvingGrader> {
        self.problem_solving.as_deref()
    }
}

static REGISTRY: Lazy<HashMap<QuizVariant, QuizVariantSpec>> = Lazy::new(|| {
    let mut specs = HashMap::new();

    specs.insert(
        QuizVariant::Functions,
        QuizVariantSpec {
            variant: QuizVariant::Functions,
            multiple_choice_key: &["a", "c", "b", "d", "a", "b", "c", "a", "d", "b"],
            problem_solving: Some(Box::new(KeywordSteps {
                keywords: &["domain", "range", "exactly one output"],
                points_per_step: 1.0,
                correct_min_points: 2.0,
            })),
        },
    );

    specs.insert(
        QuizVariant::EvaluatingFunctions,
        QuizVariantSpec {
            variant: QuizVariant::EvaluatingFunctions,
            multiple_choice_key: &["b", "a", "d", "c", "b", "a", "c", "d", "b", "a"],
            // f(x) = 3x + 4 evaluated at x = 6.
            problem_solving: Some(Box::new(NumericTolerance {
                target: 22.0,
                tolerance_ratio: 0.10,
                points: 2.0,
            })),
        },
    );

    specs.insert(
        QuizVariant::OperationsOnFunctions,
        QuizVariantSpec {
            variant: QuizVariant::OperationsOnFunctions,
            multiple_choice_key: &["c", "b", "a", "a", "d", "c", "b", "d", "a", "c"],
            problem_solving: Some(Box::new(KeywordSteps {
                keywords: &["substitute", "simplify", "combine like terms"],
                points_per_step: 1.0,
                correct_min_points: 2.0,
            })),
        },
    );

    specs.insert(
        QuizVariant::RationalFunctions,
        QuizVariantSpec {
            variant: QuizVariant::RationalFunctions,
            multiple_choice_key: &["d", "a", "b", "c", "a", "d", "b", "c", "d", "a"],
            problem_solving: Some(Box::new(KeywordSteps {
                keywords: &["denominator", "zero", "undefined"],
                points_per_step: 1.0,
                correct_min_points: 2.0,
            })),
        },
    );

    specs.insert(
        QuizVariant::RealLifeProblems,
        QuizVariantSpec {
            variant: QuizVariant::RealLifeProblems,
            // Fare function F(d) = 40 + 13.50(d - 4) for a 12 km ride.
            multiple_choice_key: &["a", "b", "c", "d", "b", "a", "d", "c", "a", "b"],
            problem_solving: Some(Box::new(NumericTolerance {
                target: 148.0,
                tolerance_ratio: 0.10,
                points: 3.0,
            })),
        },
    );

    specs
});

/// Look up the registered spec for a variant. Every `QuizVariant` value is
/// registered; `None` can only mean the registry and the enum drifted apart.
pub fn variant_spec(variant: QuizVariant) -> Option<&'static QuizVariantSpec> {
    REGISTRY.get(&variant)
}
