//! The demo functions under test.
//!
//! These are the functions described by the requirements fixture and indexed
//! as the code fixture. `calculate_discounted_price` ships with a seeded
//! defect: the discount is applied twice. Tests generated from the
//! requirements are expected to catch it.

/// Input rejected by one of the sample functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Invalid input: Side length must be greater than 0")]
    NonPositiveSide,
    #[error(
        "Invalid input: Original price must be greater than 0, \
         and discount percentage must be between 0 and 100"
    )]
    InvalidPriceOrDiscount,
}

pub fn calculate_square_area(side_length: f64) -> Result<f64, InputError> {
    if side_length > 0.0 {
        Ok(side_length * side_length)
    } else {
        Err(InputError::NonPositiveSide)
    }
}

pub fn calculate_discounted_price(
    original_price: f64,
    discount_percentage: f64,
) -> Result<f64, InputError> {
    if original_price > 0.0 && (0.0..=100.0).contains(&discount_percentage) {
        // Seeded defect: should be `original_price * discount_percentage / 100.0`.
        Ok(original_price - (2.0 * original_price * discount_percentage / 100.0))
    } else {
        Err(InputError::InvalidPriceOrDiscount)
    }
}
