//! Built-in demo corpus: a requirements document and a small codebase.
//!
//! In a real deployment these would come from parsing an SRS document and
//! walking a repository. The code fixture mirrors [`crate::sample`], seeded
//! defect included.

use crate::models::Document;
use crate::schema::{CODE_COLLECTION, REQUIREMENTS_COLLECTION};

pub const REQUIREMENTS_FILEPATH: &str = "srs_doc_1";
pub const CODE_FILEPATH: &str = "codefile.rs";

const REQUIREMENTS_SECTIONS: &[&str] = &[
    r#"## Introduction
The software described in this document consists of two Rust functions, `calculate_square_area` and `calculate_discounted_price`, which perform specific calculations and include conditional statements to validate input parameters. These functions are intended for general-purpose use and can be integrated into various applications."#,
    r#"## Purpose
The purpose of this software is to provide users with the capability to calculate the area of a square and the discounted price of an item based on specified input parameters."#,
    r#"### `calculate_square_area` Function
#### Description
The `calculate_square_area` function calculates the area of a square based on the length of its side.
#### Input Parameters
- `side_length` (f64): The length of the side of the square.
#### Output
- If `side_length` is greater than 0, the function returns `Ok` with the calculated area (f64).
- If `side_length` is not greater than 0, the function returns an error whose message is: 'Invalid input: Side length must be greater than 0'."#,
    r#"### `calculate_discounted_price` Function
#### Description
The `calculate_discounted_price` function calculates the discounted price of an item based on the original price and a discount percentage.
#### Input Parameters
- `original_price` (f64): The original price of the item.
- `discount_percentage` (f64): The discount percentage to be applied to the original price.
#### Output
- If both `original_price` and `discount_percentage` are valid (original_price > 0 and 0 <= discount_percentage <= 100), the function returns `Ok` with the calculated discounted price (f64), equal to original_price - original_price * discount_percentage / 100.
- If either `original_price` is not greater than 0 or `discount_percentage` is not within the valid range, the function returns an error whose message is: 'Invalid input: Original price must be greater than 0, and discount percentage must be between 0 and 100'."#,
    r#"## Non-Functional Requirements
- **Usability**: The functions should be easy to use and understand.
- **Robustness**: The functions should handle invalid input gracefully and provide clear error messages.
- **Performance**: The functions should execute efficiently for typical input values."#,
    r#"## Dependencies
The software has no external dependencies and can be used in any Rust project that supports the required language features."#,
];

const CODEBASE_FILES: &[&str] = &[
    r#"
pub fn calculate_square_area(side_length: f64) -> Result<f64, InputError> {
    if side_length > 0.0 {
        Ok(side_length * side_length)
    } else {
        Err(InputError::NonPositiveSide) // "Invalid input: Side length must be greater than 0"
    }
}"#,
    r#"
pub fn calculate_discounted_price(
    original_price: f64,
    discount_percentage: f64,
) -> Result<f64, InputError> {
    if original_price > 0.0 && (0.0..=100.0).contains(&discount_percentage) {
        Ok(original_price - (2.0 * original_price * discount_percentage / 100.0))
    } else {
        // "Invalid input: Original price must be greater than 0, and discount percentage must be between 0 and 100"
        Err(InputError::InvalidPriceOrDiscount)
    }
}"#,
];

/// A document paired with the collection it is indexed into.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub collection: &'static str,
    pub document: Document,
}

pub fn requirements_document() -> Document {
    Document::new(REQUIREMENTS_FILEPATH, REQUIREMENTS_SECTIONS)
}

pub fn codebase_document() -> Document {
    Document::new(CODE_FILEPATH, CODEBASE_FILES)
}

/// Both fixture corpora, requirements first.
pub fn all() -> Vec<Corpus> {
    vec![
        Corpus {
            collection: REQUIREMENTS_COLLECTION,
            document: requirements_document(),
        },
        Corpus {
            collection: CODE_COLLECTION,
            document: codebase_document(),
        },
    ]
}
