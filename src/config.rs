use anyhow::Context;
use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: SecretString,
    /// Base URL objects are publicly served from, without trailing slash.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub storage: StorageConfig,
    pub stripe: StripeConfig,
    pub google: GoogleConfig,
    pub smtp: Option<SmtpConfig>,
    pub image_search_service_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: SecretString::from(required("JWT_SECRET")?),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "shopville".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "shopville-users".into()),
            ttl_days: parse_or("JWT_TTL_DAYS", 7),
        };

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .trim_end_matches('/')
            .to_string();

        let storage = StorageConfig {
            endpoint: required("MINIO_ENDPOINT")?,
            bucket: required("MINIO_BUCKET")?,
            access_key: required("MINIO_ACCESS_KEY")?,
            secret_key: SecretString::from(required("MINIO_SECRET_KEY")?),
            public_url: required("MINIO_PUBLIC_URL")?
                .trim_end_matches('/')
                .to_string(),
        };

        let stripe = StripeConfig {
            secret_key: SecretString::from(required("STRIPE_SECRET_KEY")?),
            webhook_secret: SecretString::from(required("STRIPE_WEBHOOK_SECRET")?),
            currency: std::env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "pkr".into()),
        };

        let google = GoogleConfig {
            client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: SecretString::from(
                std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            ),
        };

        // SMTP is optional; without it OTP emails are only logged.
        let smtp = match (std::env::var("SMTP_USER"), std::env::var("SMTP_PASS")) {
            (Ok(username), Ok(password)) => Some(SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
                port: parse_or("SMTP_PORT", 587),
                from_address: std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone()),
                username,
                password: SecretString::from(password),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            cookie_secure: parse_or("COOKIE_SECURE", true),
            frontend_url,
            storage,
            stripe,
            google,
            smtp,
            image_search_service_url: std::env::var("IMAGE_SEARCH_SERVICE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }

    /// Redirect URI registered with Google for the SPA callback page.
    pub fn google_redirect_uri(&self) -> String {
        format!("{}/auth/google/callback", self.frontend_url)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing env var {key}"))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_garbage() {
        std::env::set_var("SHOPVILLE_TEST_PORT", "not-a-number");
        assert_eq!(parse_or::<u16>("SHOPVILLE_TEST_PORT", 587), 587);
        std::env::set_var("SHOPVILLE_TEST_PORT", "2525");
        assert_eq!(parse_or::<u16>("SHOPVILLE_TEST_PORT", 587), 2525);
    }

    #[test]
    fn required_names_the_missing_key() {
        let err = required("SHOPVILLE_DEFINITELY_UNSET").unwrap_err();
        assert!(err.to_string().contains("SHOPVILLE_DEFINITELY_UNSET"));
    }
}
