use lazy_static::lazy_static;
use regex::Regex;

/// Throwaway-mail providers refused at sign-up.
const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "discard.email",
    "dispostable.com",
    "fakeinbox.com",
    "getnada.com",
    "guerrillamail.com",
    "guerrillamail.net",
    "maildrop.cc",
    "mailinator.com",
    "mailnesia.com",
    "mintemail.com",
    "mohmal.com",
    "sharklasers.com",
    "temp-mail.org",
    "tempmail.com",
    "tempmailo.com",
    "throwawaymail.com",
    "trashmail.com",
    "yopmail.com",
];

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_disposable_email(email: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_ascii_lowercase())
        .is_some_and(|domain| DISPOSABLE_DOMAINS.contains(&domain.as_str()))
}

/// Format check plus the disposable-domain denylist; the error is the
/// client-facing message.
pub(crate) fn validate_email(email: &str) -> Result<(), &'static str> {
    if !is_valid_email(email) {
        return Err("Invalid email format");
    }
    if is_disposable_email(email) {
        return Err("Temporary/disposable emails are not allowed");
    }
    Ok(())
}

/// Pakistani mobile numbers: `03xxxxxxxxx` or `+923xxxxxxxxx`.
pub(crate) fn is_valid_pk_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^(\+92|0)?3[0-9]{9}$").unwrap();
    }
    PHONE_RE.is_match(phone)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_format() {
        assert!(is_valid_email("ali@shopville.pk"));
        assert!(!is_valid_email("ali@shopville"));
        assert!(!is_valid_email("ali shopville.pk"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn disposable_domains_are_refused() {
        assert_eq!(
            validate_email("bot@Mailinator.com"),
            Err("Temporary/disposable emails are not allowed")
        );
        assert_eq!(validate_email("bad"), Err("Invalid email format"));
        assert_eq!(validate_email("real@gmail.com"), Ok(()));
    }

    #[test]
    fn pakistani_numbers() {
        assert!(is_valid_pk_phone("03001234567"));
        assert!(is_valid_pk_phone("+923001234567"));
        assert!(is_valid_pk_phone("3001234567"));
        assert!(!is_valid_pk_phone("0300123456"));
        assert!(!is_valid_pk_phone("+14155550100"));
        assert!(!is_valid_pk_phone("04001234567"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ali@ShopVille.PK "), "ali@shopville.pk");
    }
}
