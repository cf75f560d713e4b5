use serde::{Deserialize, Serialize};

/// The fixed set of quiz variants offered by the platform. Each variant has its
/// own answer key and grading rules, registered in `services::answer_key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuizVariant {
    Functions,
    EvaluatingFunctions,
    OperationsOnFunctions,
    RationalFunctions,
    RealLifeProblems,
}

impl QuizVariant {
    pub const ALL: [QuizVariant; 5] = [
        QuizVariant::Functions,
        QuizVariant::EvaluatingFunctions,
        QuizVariant::OperationsOnFunctions,
        QuizVariant::RationalFunctions,
        QuizVariant::RealLifeProblems,
    ];

    /// Wire/storage form of the variant name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizVariant::Functions => "functions",
            QuizVariant::EvaluatingFunctions => "evaluating-functions",
            QuizVariant::OperationsOnFunctions => "operations-on-functions",
            QuizVariant::RationalFunctions => "rational-functions",
            QuizVariant::RealLifeProblems => "real-life-problems",
        }
    }

    pub fn parse(value: &str) -> Option<QuizVariant> {
        match value.trim().to_lowercase().as_str() {
            "functions" => Some(QuizVariant::Functions),
            "evaluating-functions" => Some(QuizVariant::EvaluatingFunctions),
            "operations-on-functions" => Some(QuizVariant::OperationsOnFunctions),
            "rational-functions" => Some(QuizVariant::RationalFunctions),
            "real-life-problems" => Some(QuizVariant::RealLifeProblems),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuizVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
