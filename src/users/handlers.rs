use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, RegisterRequest, UpdateUserRequest, UserList, WishlistRequest},
    repo::AdminGuard,
    repo_types::{NewUser, User, UserPatch},
    wishlist,
};
use crate::{
    auth::{
        extractors::{AdminUser, AuthUser},
        password::{ensure_long_enough, hash_password, verify_password},
        session,
        validation::{is_valid_pk_phone, normalize_email, validate_email},
    },
    error::{is_unique_violation, AppError, AppResult},
    images::{upload_image, MultipartForm},
    products::{ProductRow, ProductView},
    response::{created, done, ok, ApiJson},
    state::AppState,
};

const AVATAR_LIMIT: usize = 5 * 1024 * 1024;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(get_me))
        .route(
            "/upload-profile-picture",
            post(upload_profile_picture).layer(DefaultBodyLimit::max(AVATAR_LIMIT)),
        )
        .route("/:id", patch(update_self))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/login", post(admin_login))
        .route("/all-users", get(all_users))
        .route("/:id", axum::routing::put(update_user).delete(delete_user))
}

pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(get_wishlist))
        .route("/wishlist/add", post(add_to_wishlist))
        .route("/wishlist/remove", post(remove_from_wishlist))
}

/// Shared by both login routes: 401 for an unknown email, a wrong password or
/// an account that only signs in through Google.
async fn check_credentials(state: &AppState, payload: &LoginRequest) -> AppResult<User> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("All fields are required"));
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            AppError::unauthorized("Email not registered")
        })?;

    let matches = match user.password_hash.as_deref() {
        Some(hash) => verify_password(&payload.password, hash)?,
        None => false,
    };
    if !matches {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Incorrect Email/Password"));
    }
    Ok(user)
}

/// Validates the contact fields of a profile update in place.
fn clean_patch(req: UpdateUserRequest, allow_role: bool) -> AppResult<UserPatch> {
    let name = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let email = match req.email {
        Some(e) if !e.trim().is_empty() => {
            let e = normalize_email(&e);
            validate_email(&e).map_err(AppError::bad_request)?;
            Some(e)
        }
        _ => None,
    };
    let phone = match req.phone {
        Some(p) if !p.trim().is_empty() => {
            let p = p.trim().to_string();
            if !is_valid_pk_phone(&p) {
                return Err(AppError::bad_request("Invalid phone number"));
            }
            Some(p)
        }
        _ => None,
    };
    let role = match (allow_role, req.role) {
        (true, Some(r)) if r == User::ROLE_USER || r == User::ROLE_ADMIN => Some(r),
        (true, Some(_)) => return Err(AppError::bad_request("Role must be 0 or 1")),
        _ => None,
    };

    Ok(UserPatch {
        name,
        email,
        phone,
        avatar: req.avatar,
        role,
    })
}

fn conflict_as_bad_request(e: anyhow::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::bad_request("Email or phone already in use")
    } else {
        AppError::Internal(e)
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, ApiJson<User>)> {
    let name = payload.name.trim();
    let email = normalize_email(&payload.email);
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("All fields are required"));
    }
    validate_email(&email).map_err(AppError::bad_request)?;
    ensure_long_enough(&payload.password)?;

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::bad_request("Email already exist"));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        NewUser {
            name: name.to_string(),
            email: Some(email),
            password_hash: Some(hash),
            ..NewUser::default()
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request("Email already exist")
        } else {
            AppError::Internal(e)
        }
    })?;

    info!(user_id = %user.id, "user registered");
    Ok(created("User registration successful", user))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = check_credentials(&state, &payload).await?;
    info!(user_id = %user.id, "user logged in");
    session::start(&state, user, "Login successful")
}

#[instrument(skip(state, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = check_credentials(&state, &payload).await?;
    if !user.is_admin() {
        warn!(user_id = %user.id, "non-admin tried admin login");
        return Err(AppError::forbidden("Admin access required"));
    }
    info!(user_id = %user.id, "admin logged in");
    session::start(&state, user, "Admin login successful")
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session::cleared_cookie(&state.config))],
        done("Logout successfully"),
    )
}

#[instrument(skip(state))]
pub async fn get_me(State(state): State<AppState>, auth: AuthUser) -> AppResult<ApiJson<User>> {
    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok("User fetched", user))
}

#[instrument(skip(state, payload))]
pub async fn update_self(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<ApiJson<User>> {
    if auth.id != id && !auth.is_admin() {
        return Err(AppError::forbidden("You can only update your own profile"));
    }
    let patch = clean_patch(payload, false)?;
    let user = User::update(&state.db, id, patch)
        .await
        .map_err(conflict_as_bad_request)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok("Profile updated successfully", user))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<ApiJson<User>> {
    let patch = clean_patch(payload, true)?;

    let user = match User::update_guarded(&state.db, id, patch)
        .await
        .map_err(conflict_as_bad_request)?
    {
        AdminGuard::Applied(user) => user,
        AdminGuard::NotFound => return Err(AppError::not_found("User not found")),
        AdminGuard::LastAdmin => return Err(AppError::bad_request("Cannot demote the last admin")),
    };
    info!(user_id = %id, role = user.role, "user updated by admin");
    Ok(ok("User updated successfully", user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<()>> {
    match User::delete_guarded(&state.db, id).await? {
        AdminGuard::Applied(()) => {
            info!(user_id = %id, by = %admin.id, "user deleted");
            Ok(done("User deleted successfully"))
        }
        AdminGuard::NotFound => Err(AppError::not_found("User not found")),
        AdminGuard::LastAdmin => Err(AppError::bad_request("Cannot delete the last admin")),
    }
}

#[instrument(skip(state, _admin))]
pub async fn all_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<ApiJson<UserList>> {
    let users = User::list_all(&state.db).await?;
    Ok(ok(
        "All users fetched",
        UserList {
            total: users.len(),
            users,
        },
    ))
}

#[instrument(skip(state, mp))]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Multipart,
) -> AppResult<ApiJson<User>> {
    let form = MultipartForm::collect(mp).await?;
    let file = form
        .file("picture")
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;

    let stored = upload_image(&state, "profile-pictures", file).await?;
    let user = User::set_picture(&state.db, auth.id, &stored.url)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok("Profile picture uploaded and updated successfully", user))
}

async fn wishlist_view(state: &AppState, user_id: Uuid) -> AppResult<Vec<ProductView>> {
    let rows = wishlist::products(&state.db, user_id).await?;
    Ok(rows.into_iter().map(ProductView::from).collect())
}

#[instrument(skip(state))]
pub async fn get_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<ApiJson<Vec<ProductView>>> {
    Ok(ok("Wishlist fetched", wishlist_view(&state, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<WishlistRequest>,
) -> AppResult<ApiJson<Vec<ProductView>>> {
    if !ProductRow::exists(&state.db, payload.product_id).await? {
        return Err(AppError::not_found("Product not found"));
    }
    wishlist::add(&state.db, auth.id, payload.product_id).await?;
    Ok(ok("Added to wishlist", wishlist_view(&state, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<WishlistRequest>,
) -> AppResult<ApiJson<Vec<ProductView>>> {
    wishlist::remove(&state.db, auth.id, payload.product_id).await?;
    Ok(ok("Removed from wishlist", wishlist_view(&state, auth.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{call, token_for};
    use serde_json::json;

    #[test]
    fn self_updates_cannot_change_role() {
        let patch = clean_patch(
            UpdateUserRequest {
                name: Some("  Sana ".into()),
                role: Some(User::ROLE_ADMIN),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert_eq!(patch.name.as_deref(), Some("Sana"));
        assert_eq!(patch.role, None);
    }

    #[test]
    fn admin_updates_validate_role_and_contacts() {
        let bad_role = UpdateUserRequest {
            role: Some(7),
            ..Default::default()
        };
        assert!(clean_patch(bad_role, true).is_err());

        let bad_phone = UpdateUserRequest {
            phone: Some("555-0100".into()),
            ..Default::default()
        };
        assert!(clean_patch(bad_phone, true).is_err());

        let email = UpdateUserRequest {
            email: Some(" Sana@Shop.PK ".into()),
            ..Default::default()
        };
        assert_eq!(
            clean_patch(email, true).unwrap().email.as_deref(),
            Some("sana@shop.pk")
        );
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/users/register",
            Some(json!({ "name": "Sana", "email": "sana@shop.pk", "password": "123" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password too short");
    }

    #[tokio::test]
    async fn login_requires_fields() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/users/login",
            Some(json!({ "email": "sana@shop.pk" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "All fields are required");
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let res = crate::app::build_app(AppState::fake())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/users/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("token=;"));
    }

    #[tokio::test]
    async fn me_requires_token() {
        let (status, _) = call(AppState::fake(), "GET", "/api/v1/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cannot_patch_someone_else() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, _) = call(
            state,
            "PATCH",
            &format!("/api/v1/users/{}", Uuid::new_v4()),
            Some(json!({ "name": "Mallory" })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn listing_users_needs_admin() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, _) = call(state, "GET", "/api/v1/users/all-users", None, Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
