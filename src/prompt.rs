//! Message sequences for each generation stage.
//!
//! Every stage sends the same system persona followed by one user
//! instruction that embeds the text it works from. Builders are pure so the
//! exact wording can be asserted in tests.

use crate::models::Message;

pub const PERSONA: &str =
    "You are a senior software tester with several years of expertise in enterprise software testing";

/// Stage 1: markdown table of test cases from code and requirements.
pub fn test_case_messages(function: &str, code: &str, requirements: &str) -> Vec<Message> {
    vec![
        Message::system(PERSONA),
        Message::user(format!(
            "Generate a table in markdown which contains test cases and their descriptions \
             for the function `{function}` given the following info.\n\n\
             Code:\n```rust\n{code}\n```\n\n\
             Software requirement specification:\n{requirements}\n\n\
             Use the columns: ID, Test Case, Input, Expected Result, Description. \
             Expected results must follow the requirement specification, not the code."
        )),
    ]
}

/// Stage 2: unit-test source from the stage 1 table.
pub fn unit_test_messages(
    function: &str,
    test_cases: &str,
    requirements: &str,
    framework: &str,
) -> Vec<Message> {
    vec![
        Message::system(PERSONA),
        Message::user(format!(
            "Generate unit tests in {framework} for the function `{function}` given the \
             following test case descriptions:\n\n{test_cases}\n\n\
             Software requirement specification:\n{requirements}\n\n\
             Return a single ```rust fenced code block containing a `#[cfg(test)] mod tests` \
             module that starts with `use super::*;` and has one `#[test]` function per test \
             case. Compare floating point results with a small tolerance."
        )),
    ]
}

/// Re-prompt after stage 2 output failed validation.
pub fn repair_messages(
    original: &[Message],
    rejected_output: &str,
    reason: &str,
) -> Vec<Message> {
    let mut messages = original.to_vec();
    messages.push(Message::user(format!(
        "Your previous answer was rejected: {reason}\n\n\
         Previous answer:\n{rejected_output}\n\n\
         Reply again with only one ```rust fenced code block that parses as Rust and \
         contains at least one `#[test]` function."
    )));
    messages
}

/// Stage 3: fix suggestions from code, generated tests, and a test report.
pub fn feedback_messages(code: &str, unit_tests: &str, report: &str) -> Vec<Message> {
    vec![
        Message::system(PERSONA),
        Message::user(format!(
            "The following unit tests were run against the code below. Using the test report, \
             explain which failures point at defects in the code rather than in the tests, \
             and suggest concrete fixes.\n\n\
             Code:\n```rust\n{code}\n```\n\n\
             Unit tests:\n```rust\n{unit_tests}\n```\n\n\
             Test report:\n{report}"
        )),
    ]
}
