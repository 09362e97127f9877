use rand::Rng;
use time::{Duration, OffsetDateTime};

/// How long an issued code stays valid.
pub const CODE_TTL: Duration = Duration::minutes(10);
/// Minimum wait between two code issuances for the same account.
/// The cooldown is reconstructed from the stored expiry as
/// `expires_at - CODE_TTL`, so these two constants must move together.
pub const RESEND_COOLDOWN: Duration = Duration::minutes(2);

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: OffsetDateTime,
}

/// Issue a uniformly random six-digit code valid for [`CODE_TTL`] from `now`.
pub fn issue(now: OffsetDateTime) -> IssuedCode {
    let code = format!("{:06}", rand::thread_rng().gen_range(0..=999_999u32));
    IssuedCode {
        code,
        expires_at: now + CODE_TTL,
    }
}

/// A submitted code is valid iff it matches the stored code exactly and the
/// expiry has not passed.
pub fn is_valid(
    submitted: &str,
    stored: Option<&str>,
    expires_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    match (stored, expires_at) {
        (Some(stored), Some(expires_at)) => submitted == stored && now < expires_at,
        _ => false,
    }
}

/// Whether a new code may be issued, given the previous code's expiry.
/// Issuance time is reconstructed as `expires_at - CODE_TTL`; with no prior
/// code there is nothing to wait for.
pub fn resend_permitted(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    match expires_at {
        Some(expires_at) => expires_at - CODE_TTL + RESEND_COOLDOWN <= now,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-03-01 12:00:00 UTC);

    #[test]
    fn issued_codes_are_six_zero_padded_digits() {
        for _ in 0..32 {
            let issued = issue(NOW);
            assert_eq!(issued.code.len(), 6);
            assert!(issued.code.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(issued.expires_at, NOW + CODE_TTL);
        }
    }

    #[test]
    fn matching_unexpired_code_is_valid() {
        let issued = issue(NOW);
        assert!(is_valid(
            &issued.code,
            Some(&issued.code),
            Some(issued.expires_at),
            NOW + Duration::minutes(9),
        ));
    }

    #[test]
    fn mismatched_code_is_invalid() {
        assert!(!is_valid("000000", Some("123456"), Some(NOW + CODE_TTL), NOW));
    }

    #[test]
    fn expired_code_is_invalid_even_on_exact_match() {
        let expires_at = NOW + CODE_TTL;
        assert!(!is_valid("123456", Some("123456"), Some(expires_at), expires_at));
        assert!(!is_valid(
            "123456",
            Some("123456"),
            Some(expires_at),
            expires_at + Duration::seconds(1),
        ));
    }

    #[test]
    fn missing_code_or_expiry_is_invalid() {
        assert!(!is_valid("123456", None, Some(NOW + CODE_TTL), NOW));
        assert!(!is_valid("123456", Some("123456"), None, NOW));
    }

    #[test]
    fn resend_denied_inside_cooldown() {
        let issued = issue(NOW);
        assert!(!resend_permitted(Some(issued.expires_at), NOW));
        assert!(!resend_permitted(
            Some(issued.expires_at),
            NOW + RESEND_COOLDOWN - Duration::seconds(1),
        ));
    }

    #[test]
    fn resend_permitted_at_exactly_the_cooldown_boundary() {
        let issued = issue(NOW);
        assert!(resend_permitted(Some(issued.expires_at), NOW + RESEND_COOLDOWN));
        assert!(resend_permitted(
            Some(issued.expires_at),
            NOW + Duration::minutes(30),
        ));
    }

    #[test]
    fn resend_permitted_with_no_prior_code() {
        assert!(resend_permitted(None, NOW));
    }
}
