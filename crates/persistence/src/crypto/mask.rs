//! Display masking for decrypted PII.

fn last_digits(value: &str, n: usize) -> Option<String> {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < n {
        return None;
    }
    Some(digits[digits.len() - n..].iter().collect())
}

/// Masks an employer identification number, keeping the last four digits.
///
/// ```
/// use chorus_persistence::crypto::mask_ein;
///
/// assert_eq!(mask_ein("123456789"), "XX-XXX6789");
/// assert_eq!(mask_ein("12-3456789"), "XX-XXX6789");
/// ```
pub fn mask_ein(ein: &str) -> String {
    match last_digits(ein, 4) {
        Some(last) => format!("XX-XXX{}", last),
        None => "XX-XXXXXXX".to_string(),
    }
}

/// Masks a phone number, keeping the last four digits.
///
/// ```
/// use chorus_persistence::crypto::mask_phone;
///
/// assert_eq!(mask_phone("+1 (555) 555-0123"), "XXX-XXX-0123");
/// ```
pub fn mask_phone(phone: &str) -> String {
    match last_digits(phone, 4) {
        Some(last) => format!("XXX-XXX-{}", last),
        None => "XXX-XXX-XXXX".to_string(),
    }
}

/// Masks the local part of an email address, keeping its first character.
///
/// ```
/// use chorus_persistence::crypto::mask_email;
///
/// assert_eq!(mask_email("pastor@grace.org"), "p***@grace.org");
/// ```
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_values_fully_masked() {
        assert_eq!(mask_ein("12"), "XX-XXXXXXX");
        assert_eq!(mask_phone("911"), "XXX-XXX-XXXX");
    }

    #[test]
    fn test_mask_email_edge_cases() {
        assert_eq!(mask_email("not-an-email"), "***");
        assert_eq!(mask_email("@grace.org"), "***");
        assert_eq!(mask_email("é@grace.org"), "é***@grace.org");
    }
}
