//! Domain models used by the backend: survey variants, phases, files,
//! questionnaire forms, and task verification predicates.

use serde::{Deserialize, Serialize};

/// Which study arm the participant runs under.
/// `None` only exists as the unresolved default before a variant is chosen;
/// no submission may carry it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SurveyType {
    Hints,
    Solutions,
    Terminal,
    None,
}

impl Default for SurveyType {
    fn default() -> Self {
        SurveyType::None
    }
}

impl SurveyType {
    pub fn is_resolved(self) -> bool {
        !matches!(self, SurveyType::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SurveyType::Hints => "hints",
            SurveyType::Solutions => "solutions",
            SurveyType::Terminal => "terminal",
            SurveyType::None => "none",
        }
    }
}

/// Build-time description of one study arm. Immutable once selected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurveyVariant {
    pub survey_type: SurveyType,
    pub name: String,
    pub description: String,
    pub ai_enabled: bool,
    /// System prompt handed to the assistant model. The hints vs. solutions
    /// difference lives entirely here; the engine never inspects it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Session phases. Strictly ordered with two loop-backs
/// (`post -> task` while tasks remain, `post -> navigate` after the last).
///
/// `Explore` is defined but unreachable: no transition enters it. It is kept
/// in the type because recorded snapshots from earlier study rounds carry it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Select,
    Intro,
    Pre,
    Task,
    Post,
    Explore,
    Navigate,
    Overall,
    Complete,
}

/// One editor file carried through the session and echoed back in
/// task-result submissions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    pub language: String,
}

impl SourceFile {
    pub fn python(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            language: "python".to_string(),
        }
    }

    pub fn markdown(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            language: "markdown".to_string(),
        }
    }
}

/// Pure pass/fail predicate over captured stdout. Never looks at source code,
/// so any fix that produces the right output passes, intended or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutputCheck {
    /// Passes when stdout contains any of the given literals.
    ContainsAny { needles: Vec<String> },
    /// Passes when trimmed stdout ends with the given literal.
    TrimmedEndsWith { suffix: String },
    /// Passes when the last two non-empty trimmed lines equal the given pair.
    LastTwoLines { first: String, second: String },
}

impl OutputCheck {
    pub fn passes(&self, output: &str) -> bool {
        match self {
            OutputCheck::ContainsAny { needles } => {
                needles.iter().any(|n| output.contains(n.as_str()))
            }
            OutputCheck::TrimmedEndsWith { suffix } => output.trim().ends_with(suffix.as_str()),
            OutputCheck::LastTwoLines { first, second } => {
                let lines: Vec<&str> = output
                    .trim()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                lines.len() >= 2
                    && lines[lines.len() - 2] == first.as_str()
                    && lines[lines.len() - 1] == second.as_str()
            }
        }
    }
}

/// One coding exercise: broken starter code plus its output predicate.
#[derive(Clone, Debug)]
pub struct TaskDefinition {
    pub title: &'static str,
    pub instructions: &'static str,
    pub starter_code: &'static str,
    pub verify: OutputCheck,
}

//
// Questionnaire forms. Field names follow the wire contracts so the structs
// double as submission payload bodies.
//

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreSurveyForm {
    pub participant_id: String,
    pub field_of_study: String,
    pub confidence_level: u8,
    #[serde(rename = "use_of_AI")]
    pub use_of_ai: Option<bool>,
    #[serde(rename = "which_AI", default, skip_serializing_if = "Option::is_none")]
    pub which_ai: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostTaskForm {
    pub participant_id: String,
    pub survey_type: SurveyType,
    /// 1-based on the wire.
    pub task_index: u32,
    pub finished_within_time: Option<bool>,
    pub difficult_to_fix: Option<u8>,
    pub helpful_understand: Option<u8>,
    pub helpful_fix: Option<u8>,
    pub thought_process: String,
    pub feedback: String,
}

/// System-usability-scale answers, questions 7 through 16 of the form.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SusScores {
    pub q7: u8,
    pub q8: u8,
    pub q9: u8,
    pub q10: u8,
    pub q11: u8,
    pub q12: u8,
    pub q13: u8,
    pub q14: u8,
    pub q15: u8,
    pub q16: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverallForm {
    pub participant_id: String,
    pub survey_type: SurveyType,
    pub sus: SusScores,
    pub future_use_likelihood: u8,
    /// One of "A".."D"; empty means unanswered.
    pub preferred_feedback_style: String,
    pub preferred_feedback_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_comments: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub participant_id: String,
    pub survey_type: SurveyType,
    /// 1-based on the wire.
    pub task_index: u32,
    pub time_taken: u64,
    pub finished_within_time: bool,
    pub code_files: Vec<SourceFile>,
    pub run_output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_any_matches_either_quote_style() {
        let check = OutputCheck::ContainsAny {
            needles: vec!["['tool', 'python']".into(), "[\"tool\", \"python\"]".into()],
        };
        assert!(check.passes("['tool', 'python']\n"));
        assert!(check.passes("[\"tool\", \"python\"]"));
        assert!(!check.passes("['a', 'tool', 'bee', 'python']"));
    }

    #[test]
    fn trimmed_suffix_ignores_trailing_whitespace() {
        let check = OutputCheck::TrimmedEndsWith { suffix: "1".into() };
        assert!(check.passes("1\n"));
        assert!(check.passes("  1  \n\n"));
        assert!(!check.passes("10\n"));
    }

    #[test]
    fn last_two_lines_requires_exact_pair_in_order() {
        let check = OutputCheck::LastTwoLines {
            first: "False".into(),
            second: "True".into(),
        };
        assert!(check.passes("False\nTrue\n"));
        assert!(check.passes("noise\nFalse\nTrue"));
        assert!(!check.passes("True\nFalse\n"));
        assert!(!check.passes("True\n"));
    }

    #[test]
    fn survey_type_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&SurveyType::Terminal).unwrap(),
            "\"terminal\""
        );
        let t: SurveyType = serde_json::from_str("\"hints\"").unwrap();
        assert_eq!(t, SurveyType::Hints);
    }
}
