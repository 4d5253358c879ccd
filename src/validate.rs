//! Validation of generated unit-test source.
//!
//! Model replies usually wrap code in prose and a markdown fence. The first
//! fenced block is extracted and parsed with `syn`; the result must hold at
//! least one test function (`#[test]`, `#[tokio::test]`, or any attribute
//! whose last path segment is `test`), searched through inline modules.

use syn::{Attribute, Item};

/// A reply that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTests {
    pub source: String,
    pub test_fns: Vec<String>,
}

/// Return the body of the first fenced code block, or the trimmed reply when
/// there is no fence.
pub fn extract_code(reply: &str) -> String {
    let Some(open) = reply.find("```") else {
        return reply.trim().to_string();
    };
    let after_open = &reply[open + 3..];
    // Skip the info string (`rust`, `rs`, ...) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Extract and check a reply. The error string is fed back to the model.
pub fn validate_rust_tests(reply: &str) -> Result<ValidatedTests, String> {
    let source = extract_code(reply);
    if source.is_empty() {
        return Err("the reply contains no code".to_string());
    }

    let file = syn::parse_file(&source)
        .map_err(|e| format!("the code does not parse as Rust: {}", e))?;

    let mut test_fns = Vec::new();
    collect_test_fns(&file.items, &mut test_fns);
    if test_fns.is_empty() {
        return Err("the code contains no #[test] functions".to_string());
    }

    Ok(ValidatedTests { source, test_fns })
}

fn collect_test_fns(items: &[Item], out: &mut Vec<String>) {
    for item in items {
        match item {
            Item::Fn(f) if f.attrs.iter().any(is_test_attr) => {
                out.push(f.sig.ident.to_string());
            }
            Item::Mod(m) => {
                if let Some((_, inner)) = &m.content {
                    collect_test_fns(inner, out);
                }
            }
            _ => {}
        }
    }
}

fn is_test_attr(attr: &Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|seg| seg.ident == "test")
}
