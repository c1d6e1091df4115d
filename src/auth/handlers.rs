use axum::{extract::State, response::Response, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        ForgotSendRequest, ForgotUpdateRequest, GoogleCallbackRequest, PhoneLoginRequest,
        PhoneVerifyRequest, SendOtpRequest, VerifyOtpRequest,
    },
    otp::{generate_code, OtpCheck, OtpPurpose},
    password::{ensure_long_enough, hash_password},
    session,
    validation::{is_valid_pk_phone, normalize_email, validate_email},
};
use crate::{
    error::{is_unique_violation, AppError, AppResult},
    response::{done, ApiJson},
    state::AppState,
    users::repo_types::{NewUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/phone/login", post(phone_login))
        .route("/phone/verify", post(phone_verify))
        .route("/google/callback", post(google_callback))
        .route("/forgot-password/send-otp", post(forgot_send_otp))
        .route("/forgot-password/update", post(forgot_update))
}

const PHONE_HINT: &str =
    "Please enter a valid Pakistani phone number (03xxxxxxxxx or +923xxxxxxxxx)";

fn registration_id(email: &str, phone: &str) -> String {
    format!("{email}:{phone}")
}

/// Maps a failed code check to the message the client shows.
fn otp_error(check: OtpCheck) -> AppError {
    match check {
        OtpCheck::Missing => AppError::bad_request("OTP not found or expired"),
        OtpCheck::Expired => AppError::bad_request("OTP expired"),
        OtpCheck::Mismatch | OtpCheck::Valid => AppError::bad_request("Invalid OTP"),
    }
}

/// Delivery failures are logged; the code is still valid and can be resent.
async fn deliver_email(state: &AppState, to: &str, subject: &str, body: &str) {
    if let Err(e) = state.messenger.send_email(to, subject, body).await {
        warn!(error = %format!("{e:#}"), to = %to, "email delivery failed");
    }
}

async fn deliver_sms(state: &AppState, phone: &str, body: &str) {
    if let Err(e) = state.messenger.send_sms(phone, body).await {
        warn!(error = %format!("{e:#}"), phone = %phone, "sms delivery failed");
    }
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> AppResult<ApiJson<()>> {
    let email = normalize_email(&payload.email);
    let phone = payload.phone.trim().to_string();
    if email.is_empty() || phone.is_empty() {
        return Err(AppError::bad_request("Email and phone are required"));
    }
    validate_email(&email).map_err(AppError::bad_request)?;
    if !is_valid_pk_phone(&phone) {
        return Err(AppError::bad_request(PHONE_HINT));
    }

    if User::exists_with_email_or_phone(&state.db, &email, &phone).await? {
        warn!(email = %email, "registration for existing account");
        return Err(AppError::bad_request(
            "User with this email or phone already exists",
        ));
    }

    let otp_email = generate_code();
    let otp_phone = generate_code();
    state
        .otp
        .issue(
            OtpPurpose::Register,
            &registration_id(&email, &phone),
            vec![otp_email.clone(), otp_phone.clone()],
        )
        .await;

    deliver_email(
        &state,
        &email,
        "Your ShopVille Email OTP",
        &format!("Your ShopVille email OTP is: {otp_email}"),
    )
    .await;
    deliver_sms(
        &state,
        &phone,
        &format!("Your ShopVille phone OTP is: {otp_phone}"),
    )
    .await;

    info!(email = %email, "registration otp issued");
    Ok(done("OTP sent to phone and email"))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Response> {
    let email = normalize_email(&payload.email);
    let phone = payload.phone.trim().to_string();
    let name = payload.name.trim().to_string();
    if email.is_empty()
        || phone.is_empty()
        || payload.otp_email.trim().is_empty()
        || payload.otp_phone.trim().is_empty()
        || name.is_empty()
        || payload.password.is_empty()
    {
        return Err(AppError::bad_request("All fields required"));
    }
    ensure_long_enough(&payload.password)?;

    let check = state
        .otp
        .verify(
            OtpPurpose::Register,
            &registration_id(&email, &phone),
            &[payload.otp_email.as_str(), payload.otp_phone.as_str()],
        )
        .await;
    if check != OtpCheck::Valid {
        warn!(email = %email, ?check, "registration otp rejected");
        return Err(otp_error(check));
    }

    if User::exists_with_email_or_phone(&state.db, &email, &phone).await? {
        return Err(AppError::bad_request(
            "User with this email or phone already exists",
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            name,
            email: Some(email),
            phone: Some(phone),
            password_hash: Some(hash),
            ..NewUser::default()
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request("User with this email or phone already exists")
        } else {
            AppError::Internal(e)
        }
    })?;

    info!(user_id = %user.id, "user registered via otp");
    session::start(&state, user, "Account created successfully")
}

#[instrument(skip(state, payload))]
pub async fn phone_login(
    State(state): State<AppState>,
    Json(payload): Json<PhoneLoginRequest>,
) -> AppResult<ApiJson<()>> {
    let phone = payload.phone.trim();
    if !is_valid_pk_phone(phone) {
        return Err(AppError::bad_request("Valid Pakistani phone number required"));
    }

    if User::find_by_phone(&state.db, phone).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let code = generate_code();
    state
        .otp
        .issue(OtpPurpose::Login, phone, vec![code.clone()])
        .await;
    deliver_sms(&state, phone, &format!("Your ShopVille login OTP is: {code}")).await;

    Ok(done("Login OTP sent to phone"))
}

#[instrument(skip(state, payload))]
pub async fn phone_verify(
    State(state): State<AppState>,
    Json(payload): Json<PhoneVerifyRequest>,
) -> AppResult<Response> {
    let phone = payload.phone.trim();
    if phone.is_empty() || payload.otp.trim().is_empty() {
        return Err(AppError::bad_request("Phone and OTP required"));
    }

    let check = state
        .otp
        .verify(OtpPurpose::Login, phone, &[payload.otp.as_str()])
        .await;
    if check != OtpCheck::Valid {
        return Err(AppError::bad_request("Invalid or expired OTP"));
    }

    let user = User::find_by_phone(&state.db, phone)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!(user_id = %user.id, "phone login");
    session::start(&state, user, "Phone login successful")
}

#[instrument(skip(state, payload))]
pub async fn google_callback(
    State(state): State<AppState>,
    Json(payload): Json<GoogleCallbackRequest>,
) -> AppResult<Response> {
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(AppError::bad_request("Authorization code is required"));
    }

    let profile = state
        .google
        .exchange_code(code, &state.config.google_redirect_uri())
        .await
        .map_err(|e| AppError::Upstream(format!("google sign-in: {e:#}")))?;

    let email = normalize_email(&profile.email);
    validate_email(&email).map_err(AppError::bad_request)?;

    let user = match User::find_by_email(&state.db, &email).await? {
        None => {
            let name = if profile.name.trim().is_empty() {
                email.split('@').next().unwrap_or_default().to_string()
            } else {
                profile.name.clone()
            };
            let user = User::create(
                &state.db,
                NewUser {
                    name,
                    email: Some(email),
                    google_id: Some(profile.id.clone()),
                    avatar: profile.picture.clone(),
                    is_email_verified: true,
                    ..NewUser::default()
                },
            )
            .await?;
            info!(user_id = %user.id, "user registered via google");
            user
        }
        Some(existing) if existing.google_id.is_none() => {
            User::link_google(
                &state.db,
                existing.id,
                &profile.id,
                profile.picture.as_deref(),
            )
            .await?
        }
        Some(existing) => existing,
    };

    session::start(&state, user, "Google authentication successful")
}

#[instrument(skip(state, payload))]
pub async fn forgot_send_otp(
    State(state): State<AppState>,
    Json(payload): Json<ForgotSendRequest>,
) -> AppResult<ApiJson<()>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::bad_request("Email required"));
    }

    if User::find_by_email(&state.db, &email).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let code = generate_code();
    state
        .otp
        .issue(OtpPurpose::Forgot, &email, vec![code.clone()])
        .await;
    deliver_email(
        &state,
        &email,
        "Your ShopVille password reset code",
        &format!("Your ShopVille password reset code is: {code}"),
    )
    .await;

    Ok(done("OTP sent to email"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_update(
    State(state): State<AppState>,
    Json(payload): Json<ForgotUpdateRequest>,
) -> AppResult<ApiJson<()>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.otp.trim().is_empty() || payload.new_password.is_empty() {
        return Err(AppError::bad_request("All fields required"));
    }
    ensure_long_enough(&payload.new_password)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let check = state
        .otp
        .verify(OtpPurpose::Forgot, &email, &[payload.otp.as_str()])
        .await;
    if check != OtpCheck::Valid {
        return Err(otp_error(check));
    }

    let hash = hash_password(&payload.new_password)?;
    User::set_password(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset");
    Ok(done("Password updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::call;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn send_otp_requires_both_identifiers() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/send-otp",
            Some(json!({ "email": "a@shop.pk" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email and phone are required");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn send_otp_refuses_disposable_email() {
        let (status, _) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/send-otp",
            Some(json!({ "email": "x@mailinator.com", "phone": "03001234567" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send_otp_refuses_foreign_phone() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/send-otp",
            Some(json!({ "email": "a@shop.pk", "phone": "+14155550100" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], PHONE_HINT);
    }

    #[tokio::test]
    async fn verify_otp_without_issued_code_is_rejected() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/verify-otp",
            Some(json!({
                "email": "a@shop.pk",
                "phone": "03001234567",
                "otpEmail": "111111",
                "otpPhone": "222222",
                "name": "Ayesha",
                "password": "long-enough-pw",
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "OTP not found or expired");
    }

    #[tokio::test]
    async fn verify_otp_with_wrong_phone_code_keeps_record() {
        let state = AppState::fake();
        state
            .otp
            .issue(
                OtpPurpose::Register,
                "a@shop.pk:03001234567",
                vec!["111111".into(), "222222".into()],
            )
            .await;

        let (status, body) = call(
            state.clone(),
            "POST",
            "/api/v1/auth/verify-otp",
            Some(json!({
                "email": "A@Shop.pk",
                "phone": "03001234567",
                "otpEmail": "111111",
                "otpPhone": "999999",
                "name": "Ayesha",
                "password": "long-enough-pw",
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid OTP");
        assert_eq!(
            state
                .otp
                .verify(
                    OtpPurpose::Register,
                    "a@shop.pk:03001234567",
                    &["111111", "222222"]
                )
                .await,
            OtpCheck::Valid
        );
    }

    #[tokio::test]
    async fn phone_verify_with_unknown_code() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/phone/verify",
            Some(json!({ "phone": "03001234567", "otp": "123456" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid or expired OTP");
    }

    #[tokio::test]
    async fn phone_login_validates_number() {
        let (status, _) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/phone/login",
            Some(json!({ "phone": "12345" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn google_callback_needs_code() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/google/callback",
            Some(json!({})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Authorization code is required");
    }

    #[tokio::test]
    async fn forgot_update_checks_password_length_first() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/auth/forgot-password/update",
            Some(json!({ "email": "a@shop.pk", "otp": "123456", "newPassword": "short" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password too short");
    }
}
