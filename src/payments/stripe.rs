//! Minimal Stripe client: Checkout session creation plus webhook signature
//! verification.

use anyhow::Context;
use axum::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::StripeConfig;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Webhooks older than this are treated as replays.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name: String,
    /// Smallest currency unit.
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Vec<(String, String)>,
}

impl CheckoutSessionParams {
    /// Stripe's bracketed form encoding.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((
                format!("{prefix}[price_data][currency]"),
                self.currency.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
        }
        for (key, value) in &self.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        form
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait StripeApi: Send + Sync {
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> anyhow::Result<CheckoutSession>;
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: SecretString,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, cfg: &StripeConfig) -> Self {
        Self {
            http,
            secret_key: cfg.secret_key.clone(),
        }
    }
}

#[async_trait]
impl StripeApi for StripeClient {
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> anyhow::Result<CheckoutSession> {
        let response = self
            .http
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params.to_form())
            .send()
            .await
            .context("stripe checkout request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("stripe returned {status}: {body}");
        }
        response
            .json::<CheckoutSession>()
            .await
            .context("decode stripe checkout session")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or malformed Stripe-Signature header")]
    Malformed,
    #[error("webhook timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
}

/// Checks a `Stripe-Signature: t=...,v1=...` header against the raw body.
/// Any `v1` entry may match; the timestamp must be within tolerance of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = sign_payload(payload, timestamp, secret);
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, as Stripe signs webhooks.
pub fn sign_payload(payload: &[u8], timestamp: i64, secret: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key of any length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_fresh_valid_signature() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let sig = sign_payload(body, 1_700_000_000, SECRET);
        let header = format!("t=1700000000,v1={sig}");
        assert_eq!(
            verify_webhook_signature(body, &header, SECRET, 1_700_000_060),
            Ok(())
        );
    }

    #[test]
    fn any_v1_entry_may_match() {
        let body = b"{}";
        let sig = sign_payload(body, 100, SECRET);
        let header = format!("t=100,v1=deadbeef,v0=ignored,v1={sig}");
        assert_eq!(verify_webhook_signature(body, &header, SECRET, 100), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign_payload(b"{\"amount\":1}", 100, SECRET);
        let header = format!("t=100,v1={sig}");
        assert_eq!(
            verify_webhook_signature(b"{\"amount\":9}", &header, SECRET, 100),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let sig = sign_payload(b"{}", 100, SECRET);
        let header = format!("t=100,v1={sig}");
        assert_eq!(
            verify_webhook_signature(b"{}", &header, SECRET, 100 + WEBHOOK_TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(
            verify_webhook_signature(b"{}", "v1=abc", SECRET, 0),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "t=5", SECRET, 5),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn constant_time_compare_cases() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn form_encodes_line_items_and_metadata() {
        let params = CheckoutSessionParams {
            currency: "pkr".into(),
            line_items: vec![LineItem {
                name: "Mug".into(),
                unit_amount: 1250,
                quantity: 2,
            }],
            success_url: "s".into(),
            cancel_url: "c".into(),
            metadata: vec![("customerName".into(), "Guest".into())],
        };
        let form = params.to_form();
        assert!(form.contains(&(
            "line_items[0][price_data][unit_amount]".to_string(),
            "1250".to_string()
        )));
        assert!(form.contains(&("line_items[0][quantity]".to_string(), "2".to_string())));
        assert!(form.contains(&("metadata[customerName]".to_string(), "Guest".to_string())));
    }
}
