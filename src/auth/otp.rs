//! Short-lived one-time codes for registration, phone login and password
//! reset.
//!
//! Codes live in a process-local `moka` cache keyed by `purpose:identifier`.
//! The cache TTL bounds memory; the per-record deadline is what verification
//! checks, since different purposes expire at different times. Nothing is
//! shared between server instances and nothing survives a restart.

use std::time::Duration;

use moka::future::Cache;
use rand::Rng;
use time::OffsetDateTime;

pub const REGISTER_TTL: Duration = Duration::from_secs(10 * 60);
pub const LOGIN_TTL: Duration = Duration::from_secs(5 * 60);
pub const FORGOT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Register,
    Login,
    Forgot,
}

impl OtpPurpose {
    fn prefix(self) -> &'static str {
        match self {
            OtpPurpose::Register => "register",
            OtpPurpose::Login => "login",
            OtpPurpose::Forgot => "forgot",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            OtpPurpose::Register => REGISTER_TTL,
            OtpPurpose::Login => LOGIN_TTL,
            OtpPurpose::Forgot => FORGOT_TTL,
        }
    }
}

/// Codes stored for one key. Registration carries two (email and phone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub codes: Vec<String>,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Missing,
    Expired,
    Mismatch,
}

#[derive(Clone)]
pub struct OtpStore {
    cache: Cache<String, OtpRecord>,
}

impl Default for OtpStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OtpStore {
    pub fn new() -> Self {
        let longest = REGISTER_TTL.max(LOGIN_TTL).max(FORGOT_TTL);
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(longest)
                .build(),
        }
    }

    pub fn key(purpose: OtpPurpose, identifier: &str) -> String {
        format!("{}:{}", purpose.prefix(), identifier)
    }

    /// Stores fresh codes under the key, replacing any earlier ones.
    pub async fn issue(&self, purpose: OtpPurpose, identifier: &str, codes: Vec<String>) {
        let ttl = time::Duration::try_from(purpose.ttl()).unwrap_or(time::Duration::minutes(5));
        let record = OtpRecord {
            codes,
            expires_at: OffsetDateTime::now_utc() + ttl,
        };
        self.cache.insert(Self::key(purpose, identifier), record).await;
    }

    /// Compares `supplied` with the stored codes in order. A valid check
    /// consumes the record; an expired one is dropped.
    pub async fn verify(&self, purpose: OtpPurpose, identifier: &str, supplied: &[&str]) -> OtpCheck {
        self.verify_at(purpose, identifier, supplied, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn verify_at(
        &self,
        purpose: OtpPurpose,
        identifier: &str,
        supplied: &[&str],
        now: OffsetDateTime,
    ) -> OtpCheck {
        let key = Self::key(purpose, identifier);
        let Some(record) = self.cache.get(&key).await else {
            return OtpCheck::Missing;
        };

        if now > record.expires_at {
            self.cache.invalidate(&key).await;
            return OtpCheck::Expired;
        }

        let matches = record.codes.len() == supplied.len()
            && record
                .codes
                .iter()
                .zip(supplied)
                .all(|(stored, given)| stored == given.trim());
        if !matches {
            return OtpCheck::Mismatch;
        }

        self.cache.invalidate(&key).await;
        OtpCheck::Valid
    }
}

/// Random 6-digit code.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().expect("numeric");
            assert!((100_000..1_000_000).contains(&n));
        }
    }

    #[test]
    fn keys_are_namespaced_by_purpose() {
        assert_eq!(OtpStore::key(OtpPurpose::Login, "03001234567"), "login:03001234567");
        assert_eq!(OtpStore::key(OtpPurpose::Forgot, "a@b.co"), "forgot:a@b.co");
        assert_ne!(
            OtpStore::key(OtpPurpose::Register, "x"),
            OtpStore::key(OtpPurpose::Login, "x")
        );
    }

    #[tokio::test]
    async fn valid_code_is_consumed() {
        let store = OtpStore::new();
        store.issue(OtpPurpose::Login, "03001234567", vec!["123456".into()]).await;

        assert_eq!(
            store.verify(OtpPurpose::Login, "03001234567", &["123456"]).await,
            OtpCheck::Valid
        );
        assert_eq!(
            store.verify(OtpPurpose::Login, "03001234567", &["123456"]).await,
            OtpCheck::Missing
        );
    }

    #[tokio::test]
    async fn wrong_code_keeps_record() {
        let store = OtpStore::new();
        store.issue(OtpPurpose::Forgot, "a@b.co", vec!["111111".into()]).await;

        assert_eq!(
            store.verify(OtpPurpose::Forgot, "a@b.co", &["222222"]).await,
            OtpCheck::Mismatch
        );
        assert_eq!(
            store.verify(OtpPurpose::Forgot, "a@b.co", &["111111"]).await,
            OtpCheck::Valid
        );
    }

    #[tokio::test]
    async fn registration_needs_both_codes() {
        let store = OtpStore::new();
        let id = "a@b.co:03001234567";
        store
            .issue(OtpPurpose::Register, id, vec!["111111".into(), "222222".into()])
            .await;

        assert_eq!(
            store.verify(OtpPurpose::Register, id, &["111111", "999999"]).await,
            OtpCheck::Mismatch
        );
        assert_eq!(
            store.verify(OtpPurpose::Register, id, &["111111"]).await,
            OtpCheck::Mismatch
        );
        assert_eq!(
            store.verify(OtpPurpose::Register, id, &["111111", "222222"]).await,
            OtpCheck::Valid
        );
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_dropped() {
        let store = OtpStore::new();
        store.issue(OtpPurpose::Login, "03001234567", vec!["123456".into()]).await;

        let later = OffsetDateTime::now_utc() + time::Duration::minutes(6);
        assert_eq!(
            store
                .verify_at(OtpPurpose::Login, "03001234567", &["123456"], later)
                .await,
            OtpCheck::Expired
        );
        assert_eq!(
            store.verify(OtpPurpose::Login, "03001234567", &["123456"]).await,
            OtpCheck::Missing
        );
    }

    #[tokio::test]
    async fn login_window_is_shorter_than_registration() {
        let store = OtpStore::new();
        store.issue(OtpPurpose::Register, "k", vec!["1".into(), "2".into()]).await;
        let later = OffsetDateTime::now_utc() + time::Duration::minutes(6);
        assert_eq!(
            store.verify_at(OtpPurpose::Register, "k", &["1", "2"], later).await,
            OtpCheck::Valid
        );
    }
}
