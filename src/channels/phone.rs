//! Phone number normalization.

/// Normalize to `+<country><number>`, assuming India for bare 10-digit numbers.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 12 && digits.starts_with("91") {
        format!("+{digits}")
    } else if digits.len() == 10 {
        format!("+91{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Workflow-engine subscriber id for a phone number.
pub fn subscriber_id(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("phone_{digits}")
}
