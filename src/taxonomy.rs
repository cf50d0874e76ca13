//! Personal Finance Category (PFC) primary taxonomy
//!
//! Fixed list published by the bank-data provider. Category filters coming from
//! the model or the dashboard must name one of these.

use lazy_static::lazy_static;
use std::collections::HashSet;

pub const PFC_PRIMARY: &[&str] = &[
    "INCOME",
    "TRANSFER_IN",
    "TRANSFER_OUT",
    "LOAN_PAYMENTS",
    "BANK_FEES",
    "ENTERTAINMENT",
    "FOOD_AND_DRINK",
    "GENERAL_MERCHANDISE",
    "HOME_IMPROVEMENT",
    "MEDICAL",
    "PERSONAL_CARE",
    "GENERAL_SERVICES",
    "GOVERNMENT_AND_NON_PROFIT",
    "TRANSPORTATION",
    "TRAVEL",
    "RENT_AND_UTILITIES",
];

lazy_static! {
    static ref PFC_PRIMARY_SET: HashSet<&'static str> = PFC_PRIMARY.iter().copied().collect();
}

pub fn is_primary_allowed(category: &str) -> bool {
    PFC_PRIMARY_SET.contains(category)
}

/// Enum values for tool schemas.
pub fn primary_values() -> Vec<String> {
    PFC_PRIMARY.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed() {
        assert!(is_primary_allowed("FOOD_AND_DRINK"));
        assert!(!is_primary_allowed("food_and_drink"));
        assert!(!is_primary_allowed("GROCERIES"));
        assert_eq!(primary_values().len(), PFC_PRIMARY.len());
    }
}
