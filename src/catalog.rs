//! Built-in study content: the three survey variants, the fixed four-task
//! catalog, and the files loaded for the free-navigation phase.
//!
//! The catalog is deliberately compiled in. Order is significant: tasks are
//! presented by index 0..3 and the wire contracts report 1-based indices.

use crate::domain::{OutputCheck, SourceFile, SurveyType, SurveyVariant, TaskDefinition};

/// The three study arms. The hints arm carries a system prompt that steers the
/// assistant towards guidance instead of answers; the solutions arm uses the
/// model default; the terminal arm disables the assistant entirely.
pub fn survey_variants(hints_prompt: &str) -> Vec<SurveyVariant> {
    vec![
        SurveyVariant {
            survey_type: SurveyType::Hints,
            name: "Survey A: AI Hints".into(),
            description:
                "AI assistant will provide hints and guidance to help you solve problems step by step."
                    .into(),
            ai_enabled: true,
            system_prompt: Some(hints_prompt.to_string()),
        },
        SurveyVariant {
            survey_type: SurveyType::Solutions,
            name: "Survey B: AI Solutions".into(),
            description:
                "AI assistant will provide direct solutions and code when you ask for help.".into(),
            ai_enabled: true,
            system_prompt: None,
        },
        SurveyVariant {
            survey_type: SurveyType::Terminal,
            name: "Survey C: Terminal Only".into(),
            description:
                "No AI assistance - only standard Python error messages and terminal output.".into(),
            ai_enabled: false,
            system_prompt: None,
        },
    ]
}

pub fn variant_for(variants: &[SurveyVariant], survey_type: SurveyType) -> Option<SurveyVariant> {
    variants.iter().find(|v| v.survey_type == survey_type).cloned()
}

pub const TASK_COUNT: usize = 4;

const TASK_1_MD: &str = r#"# Task 1: Fix Variable Shadowing

The code below has a variable that shadows a built-in Python function, causing an error.

**Your goal:** Fix the code so it correctly filters words longer than 3 characters.

**Expected output:** ['tool', 'python']
"#;

const TASK_1_MAIN: &str = r#"
# The function below is supposed to filter words longer than 3 characters.
def get_word_count_and_filter(word_list):
    len = 0
    long_words = []
    for word in word_list:
        if len(word) > 3:
            long_words.append(word)
    return long_words

print(get_word_count_and_filter(["a", "tool", "bee", "python"]))
# Expected output: ['tool', 'python']"#;

const TASK_2_MD: &str = r#"# Task 2: Fix Index Error

The function below is supposed to check for adjacent duplicate values but has an indexing error.

**Your goal:** Fix the range in the loop to prevent IndexError.

**Expected output:** 1 (for the test case [1,2,2,3])
"#;

const TASK_2_MAIN: &str = r#"
# The function below is supposed to check output the number of adjacent duplicate values.
def has_adjacent_duplicate(items):
    adjacent_duplicates = []
    for i in range(len(items)):
        if items[i] == items[i + 1]:
            adjacent_duplicates.append(items[i])
    return len(adjacent_duplicates)

print(has_adjacent_duplicate([1,2,2,3]))
# Expected output: 1
"#;

const TASK_3_MD: &str = r#"# Task 3: Fix Variable Scope

The function should count vowels in each word separately, but has a scope issue.

**Your goal:** Fix the variable initialization to count vowels per word correctly.

**Expected output:** [1, 1] (for "cat" and "python")
"#;

const TASK_3_MAIN: &str = r#"def count_vowels_per_word(words):
    vowels = "aeiou"
    counts = []
    vowel_count = 0
    for word in words:
        for char in word.lower():
            if char in vowels:
                vowel_count += 1
        counts.append(vowel_count)
    return counts

print(count_vowels_per_word(["cat", "python"]))
# Expected output: [1, 1]"#;

const TASK_4_MD: &str = r#"# Task 4: Fix Logic Error

The password validation uses the wrong logical operator.

**Your goal:** Fix the condition to require BOTH length >= 8 AND containing a digit.

**Expected output:**
False
True
"#;

const TASK_4_MAIN: &str = r#"
# The function below is supposed to check if the password contains a digit and has a length of at least 8.
def has_digit(s):
    return any(char.isdigit() for char in s)

def is_valid_password(password):
    if len(password) >= 8 or has_digit(password):
        return True
    else:
        return False
print(is_valid_password("secret_password"))
print(is_valid_password("secret_password123"))
# Expected output: False
# Expected output: True"#;

/// The ordered task catalog. Each entry ships broken source with one named
/// bug class: builtin shadowing, off-by-one index, leaked per-iteration
/// state, and OR-where-AND-was-meant.
pub fn tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            title: "Task 1: Variable Shadowing",
            instructions: TASK_1_MD,
            starter_code: TASK_1_MAIN,
            verify: OutputCheck::ContainsAny {
                needles: vec![
                    "['tool', 'python']".into(),
                    "[\"tool\", \"python\"]".into(),
                ],
            },
        },
        TaskDefinition {
            title: "Task 2: Index Out of Range",
            instructions: TASK_2_MD,
            starter_code: TASK_2_MAIN,
            verify: OutputCheck::TrimmedEndsWith { suffix: "1".into() },
        },
        TaskDefinition {
            title: "Task 3: Variable Scope Issue",
            instructions: TASK_3_MD,
            starter_code: TASK_3_MAIN,
            verify: OutputCheck::ContainsAny {
                needles: vec!["[1, 1]".into()],
            },
        },
        TaskDefinition {
            title: "Task 4: Logic Error",
            instructions: TASK_4_MD,
            starter_code: TASK_4_MAIN,
            verify: OutputCheck::LastTwoLines {
                first: "False".into(),
                second: "True".into(),
            },
        },
    ]
}

/// Editor files for one task: the instructions plus the broken program.
pub fn task_files(task: &TaskDefinition) -> Vec<SourceFile> {
    vec![
        SourceFile::markdown("task.md", task.instructions),
        SourceFile::python("main.py", task.starter_code),
    ]
}

const NAVIGATE_WELCOME: &str = r#"# Welcome to the free navigation phase!
# You can now explore all pages of the application.

# Try visiting different pages:
# - Dashboard (home)
# - Editor (current page)
# - Projects
# - Suggestions
# - Resources

print("Welcome to the free navigation phase!")
print("Feel free to explore all features of the application.")
print("Visit different pages using the navigation bar.")
"#;

/// Files loaded when the session enters the free-navigation phase.
pub fn navigation_files() -> Vec<SourceFile> {
    vec![SourceFile::python("welcome.py", NAVIGATE_WELCOME)]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Literal stdout each buggy starter produces (tasks 1 and 2 die with a
    // traceback on stderr, printing nothing).
    const BUGGY_OUTPUTS: [&str; 4] = ["", "", "[1, 2]\n", "True\nTrue\n"];

    // Literal stdout of the known-good fixed programs.
    const FIXED_OUTPUTS: [&str; 4] = [
        "['tool', 'python']\n",
        "1\n",
        "[1, 1]\n",
        "False\nTrue\n",
    ];

    #[test]
    fn catalog_has_exactly_four_ordered_tasks() {
        let tasks = tasks();
        assert_eq!(tasks.len(), TASK_COUNT);
        assert!(tasks[0].title.starts_with("Task 1"));
        assert!(tasks[3].title.starts_with("Task 4"));
    }

    #[test]
    fn buggy_starter_output_never_verifies() {
        for (task, out) in tasks().iter().zip(BUGGY_OUTPUTS) {
            assert!(!task.verify.passes(out), "{} verified buggy output", task.title);
        }
    }

    #[test]
    fn fixed_program_output_always_verifies() {
        for (task, out) in tasks().iter().zip(FIXED_OUTPUTS) {
            assert!(task.verify.passes(out), "{} rejected fixed output", task.title);
        }
    }

    #[test]
    fn task_files_pair_instructions_with_starter() {
        let task = &tasks()[0];
        let files = task_files(task);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "task.md");
        assert_eq!(files[0].language, "markdown");
        assert_eq!(files[1].name, "main.py");
        assert!(files[1].content.contains("get_word_count_and_filter"));
    }

    #[test]
    fn exactly_one_variant_disables_the_assistant() {
        let variants = survey_variants("guide, do not solve");
        assert_eq!(variants.len(), 3);
        let disabled: Vec<_> = variants.iter().filter(|v| !v.ai_enabled).collect();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].survey_type, SurveyType::Terminal);
        // Only the hints arm carries a steering prompt.
        assert!(variant_for(&variants, SurveyType::Hints)
            .unwrap()
            .system_prompt
            .is_some());
        assert!(variant_for(&variants, SurveyType::Solutions)
            .unwrap()
            .system_prompt
            .is_none());
    }
}
