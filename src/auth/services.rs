use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use super::dto::{
    AuthResponse, CredentialsRequest, ForgotPasswordRequest, MeResponse, MessageResponse,
    PublicUser, ResetPasswordRequest, UserProfile, VerifyOtpRequest, VerifyOtpResponse,
};
use super::jwt::JwtKeys;
use super::otp::generate_otp;
use super::password::{hash_password, verify_password};
use crate::{error::ApiError, state::AppState};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const FORGOT_PASSWORD_REPLY: &str = "If the email exists, an OTP has been sent";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Treats empty strings like absent fields.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

pub async fn register(state: &AppState, req: CredentialsRequest) -> Result<AuthResponse, ApiError> {
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(ApiError::validation("Email and password required"));
    };
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }

    let hash = hash_password(&password)?;
    let user = state.store.create_user(&email, &hash).await.map_err(|e| {
        warn!(%email, error = %e, "create user failed");
        ApiError::from(e)
    })?;

    let token = JwtKeys::from_ref(state).sign_access(user.id, &user.email)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(AuthResponse {
        success: true,
        token,
        user: PublicUser::from(&user),
    })
}

pub async fn login(state: &AppState, req: CredentialsRequest) -> Result<AuthResponse, ApiError> {
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(ApiError::validation("Email and password required"));
    };

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = JwtKeys::from_ref(state).sign_access(user.id, &user.email)?;
    info!(user_id = user.id, "user logged in");
    Ok(AuthResponse {
        success: true,
        token,
        user: PublicUser::from(&user),
    })
}

/// Same reply whether or not the account exists.
pub async fn forgot_password(
    state: &AppState,
    req: ForgotPasswordRequest,
    now: OffsetDateTime,
) -> Result<MessageResponse, ApiError> {
    let Some(email) = present(req.email) else {
        return Err(ApiError::validation("Email is required"));
    };

    if state.store.find_user_by_email(&email).await?.is_none() {
        info!("password reset requested for unknown email");
        return Ok(MessageResponse::ok(FORGOT_PASSWORD_REPLY));
    }

    let ttl = state.config.otp_ttl_minutes;
    let otp = generate_otp();
    if let Err(e) = state
        .store
        .insert_password_reset(&email, &otp, now + Duration::minutes(ttl), now)
        .await
    {
        error!(error = ?e, "storing reset code failed");
        return Ok(MessageResponse::ok(FORGOT_PASSWORD_REPLY));
    }

    if let Err(e) = state.notifier.send_otp(&email, &otp, ttl).await {
        error!(error = ?e, "otp delivery failed");
    }
    Ok(MessageResponse::ok(FORGOT_PASSWORD_REPLY))
}

pub async fn verify_otp(
    state: &AppState,
    req: VerifyOtpRequest,
    now: OffsetDateTime,
) -> Result<VerifyOtpResponse, ApiError> {
    let (Some(email), Some(otp)) = (present(req.email), present(req.otp)) else {
        return Err(ApiError::validation("Email and OTP are required"));
    };

    if !state.store.consume_password_reset(&email, otp.trim(), now).await? {
        warn!("otp rejected");
        return Err(ApiError::invalid_grant("Invalid or expired OTP"));
    }

    let reset_token = JwtKeys::from_ref(state).sign_password_reset(&email)?;
    info!("otp verified");
    Ok(VerifyOtpResponse {
        success: true,
        message: "OTP verified successfully".into(),
        reset_token,
    })
}

pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> Result<MessageResponse, ApiError> {
    let (Some(email), Some(new_password), Some(reset_token)) =
        (present(req.email), present(req.new_password), present(req.reset_token))
    else {
        return Err(ApiError::validation(
            "Reset token, new password, and email are required",
        ));
    };

    let claims = JwtKeys::from_ref(state)
        .verify_password_reset(&reset_token)
        .map_err(|e| {
            warn!(error = %e, "reset token rejected");
            ApiError::invalid_grant("Invalid or expired reset token")
        })?;
    if claims.email != email {
        warn!("reset token email mismatch");
        return Err(ApiError::invalid_grant("Email mismatch"));
    }

    let hash = hash_password(&new_password)?;
    if !state.store.update_password_hash(&email, &hash).await? {
        return Err(ApiError::not_found("User not found"));
    }
    state.store.invalidate_password_resets(&email).await?;

    info!("password reset");
    Ok(MessageResponse::ok("Password reset successfully"))
}

pub async fn me(state: &AppState, user_id: i64) -> Result<MeResponse, ApiError> {
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(MeResponse {
        success: true,
        user: UserProfile {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::otp::OtpNotifier;
    use crate::store::FileStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Keeps every code it is asked to deliver.
    #[derive(Default, Clone)]
    struct Outbox(Arc<Mutex<Vec<(String, String)>>>);

    impl Outbox {
        fn last_code_for(&self, email: &str) -> Option<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(e, _)| e == email)
                .map(|(_, otp)| otp.clone())
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OtpNotifier for Outbox {
        async fn send_otp(&self, email: &str, otp: &str, _ttl: i64) -> anyhow::Result<()> {
            self.0.lock().unwrap().push((email.into(), otp.into()));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl OtpNotifier for Broken {
        async fn send_otp(&self, _: &str, _: &str, _: i64) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    fn creds(email: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn state_with_outbox() -> (AppState, Outbox) {
        let outbox = Outbox::default();
        let state = AppState::fake().with_notifier(Arc::new(outbox.clone()));
        (state, outbox)
    }

    async fn issue_code(state: &AppState, outbox: &Outbox, email: &str, now: OffsetDateTime) -> String {
        forgot_password(
            state,
            ForgotPasswordRequest {
                email: Some(email.into()),
            },
            now,
        )
        .await
        .unwrap();
        outbox.last_code_for(email).expect("code delivered")
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ann@example.com"));
        assert!(!is_valid_email("ann@example"));
        assert!(!is_valid_email("ann example.com"));
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let state = AppState::fake();
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let err = register(&state, creds("ann@example.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_requires_both_fields() {
        let state = AppState::fake();
        let err = register(
            &state,
            CredentialsRequest {
                email: Some("ann@example.com".into()),
                password: Some(String::new()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = register(&state, CredentialsRequest::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn login_token_carries_registered_user_id() {
        let state = AppState::fake();
        let reg = register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let login = login(&state, creds("ann@example.com", "pw-123456")).await.unwrap();

        let (user_id, email) = JwtKeys::from_ref(&state).verify_access(&login.token).unwrap();
        assert_eq!(user_id, reg.user.id);
        assert_eq!(email, "ann@example.com");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let state = AppState::fake();
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();

        let wrong = login(&state, creds("ann@example.com", "nope")).await.unwrap_err();
        let unknown = login(&state, creds("bob@example.com", "pw-123456")).await.unwrap_err();
        assert!(matches!(wrong, ApiError::Unauthorized(_)));
        assert!(matches!(unknown, ApiError::Unauthorized(_)));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.to_string(), INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn forgot_password_does_not_reveal_accounts() {
        let (state, outbox) = state_with_outbox();
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let now = OffsetDateTime::now_utc();

        let known = forgot_password(
            &state,
            ForgotPasswordRequest {
                email: Some("ann@example.com".into()),
            },
            now,
        )
        .await
        .unwrap();
        let unknown = forgot_password(
            &state,
            ForgotPasswordRequest {
                email: Some("ghost@example.com".into()),
            },
            now,
        )
        .await
        .unwrap();

        assert_eq!(known.message, unknown.message);
        assert_eq!(outbox.len(), 1);
        assert!(outbox.last_code_for("ghost@example.com").is_none());
    }

    #[tokio::test]
    async fn store_failure_on_reset_code_gives_the_generic_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let (mut state, outbox) = state_with_outbox();
        state.store = Arc::new(FileStore::open(&path).await.unwrap());
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();

        tokio::fs::create_dir(path.with_extension("json.tmp")).await.unwrap();
        let res = forgot_password(
            &state,
            ForgotPasswordRequest {
                email: Some("ann@example.com".into()),
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();

        assert!(res.success);
        assert_eq!(res.message, FORGOT_PASSWORD_REPLY);
        assert_eq!(outbox.len(), 0);
    }

    #[tokio::test]
    async fn register_rejects_malformed_email() {
        let state = AppState::fake();
        let err = register(&state, creds("not-an-email", "pw-123456")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m == "Invalid email"));
    }

    #[tokio::test]
    async fn notifier_failure_still_succeeds() {
        let state = AppState::fake().with_notifier(Arc::new(Broken));
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let res = forgot_password(
            &state,
            ForgotPasswordRequest {
                email: Some("ann@example.com".into()),
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();
        assert!(res.success);
    }

    #[tokio::test]
    async fn otp_works_once_then_fails_on_replay() {
        let (state, outbox) = state_with_outbox();
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let code = issue_code(&state, &outbox, "ann@example.com", now).await;

        let req = || VerifyOtpRequest {
            email: Some("ann@example.com".into()),
            otp: Some(code.clone()),
        };
        let ok = verify_otp(&state, req(), now).await.unwrap();
        assert!(ok.success);
        assert!(JwtKeys::from_ref(&state)
            .verify_password_reset(&ok.reset_token)
            .is_ok());

        let replay = verify_otp(&state, req(), now).await.unwrap_err();
        assert!(matches!(replay, ApiError::InvalidGrant(_)));
        assert_eq!(replay.to_string(), "Invalid or expired OTP");
    }

    #[tokio::test]
    async fn otp_expires_after_ten_minutes() {
        let (state, outbox) = state_with_outbox();
        register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let issued = OffsetDateTime::now_utc();
        let code = issue_code(&state, &outbox, "ann@example.com", issued).await;

        let err = verify_otp(
            &state,
            VerifyOtpRequest {
                email: Some("ann@example.com".into()),
                otp: Some(code),
            },
            issued + Duration::minutes(10) + Duration::seconds(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn full_reset_flow_changes_the_password() {
        let (state, outbox) = state_with_outbox();
        register(&state, creds("ann@example.com", "old-password")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let code = issue_code(&state, &outbox, "ann@example.com", now).await;
        let verified = verify_otp(
            &state,
            VerifyOtpRequest {
                email: Some("ann@example.com".into()),
                otp: Some(code),
            },
            now,
        )
        .await
        .unwrap();

        reset_password(
            &state,
            ResetPasswordRequest {
                email: Some("ann@example.com".into()),
                new_password: Some("new-password".into()),
                reset_token: Some(verified.reset_token),
            },
        )
        .await
        .unwrap();

        assert!(login(&state, creds("ann@example.com", "old-password")).await.is_err());
        assert!(login(&state, creds("ann@example.com", "new-password")).await.is_ok());
    }

    #[tokio::test]
    async fn reset_invalidates_outstanding_codes() {
        let (state, outbox) = state_with_outbox();
        register(&state, creds("ann@example.com", "old-password")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let spare = issue_code(&state, &outbox, "ann@example.com", now).await;
        let token = JwtKeys::from_ref(&state)
            .sign_password_reset("ann@example.com")
            .unwrap();

        reset_password(
            &state,
            ResetPasswordRequest {
                email: Some("ann@example.com".into()),
                new_password: Some("new-password".into()),
                reset_token: Some(token),
            },
        )
        .await
        .unwrap();

        let err = verify_otp(
            &state,
            VerifyOtpRequest {
                email: Some("ann@example.com".into()),
                otp: Some(spare),
            },
            now,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn reset_with_someone_elses_token_changes_nothing() {
        let state = AppState::fake();
        register(&state, creds("ann@example.com", "ann-password")).await.unwrap();
        let before = state
            .store
            .find_user_by_email("ann@example.com")
            .await
            .unwrap()
            .unwrap()
            .password_hash;

        let mallory_token = JwtKeys::from_ref(&state)
            .sign_password_reset("mallory@example.com")
            .unwrap();
        let err = reset_password(
            &state,
            ResetPasswordRequest {
                email: Some("ann@example.com".into()),
                new_password: Some("pwned".into()),
                reset_token: Some(mallory_token),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidGrant(_)));
        assert_eq!(err.to_string(), "Email mismatch");

        let after = state
            .store
            .find_user_by_email("ann@example.com")
            .await
            .unwrap()
            .unwrap()
            .password_hash;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn reset_rejects_access_tokens_and_unknown_users() {
        let state = AppState::fake();
        let reg = register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();

        let err = reset_password(
            &state,
            ResetPasswordRequest {
                email: Some("ann@example.com".into()),
                new_password: Some("x".into()),
                reset_token: Some(reg.token),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired reset token");

        let ghost_token = JwtKeys::from_ref(&state)
            .sign_password_reset("ghost@example.com")
            .unwrap();
        let err = reset_password(
            &state,
            ResetPasswordRequest {
                email: Some("ghost@example.com".into()),
                new_password: Some("x".into()),
                reset_token: Some(ghost_token),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn me_returns_profile() {
        let state = AppState::fake();
        let reg = register(&state, creds("ann@example.com", "pw-123456")).await.unwrap();
        let me_res = me(&state, reg.user.id).await.unwrap();
        assert_eq!(me_res.user.email, "ann@example.com");
        assert!(matches!(me(&state, 999).await.unwrap_err(), ApiError::NotFound(_)));
    }
}
