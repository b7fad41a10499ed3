//! Accounts and sessions: registration, login, token refresh, revocation,
//! email verification and password reset

use super::{id_of, now, patch, rules, str_field, users, Args};
use crate::context::RequestContext;
use gazette_core::{
    ApiError, Collection, Document, Filter, FindOptions, MailMessage, Role, SubjectId,
};
use gazette_security::{require_authenticated, Purpose, TokenService};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

pub(super) async fn register(ctx: &RequestContext, input: &Args<'_>) -> Result<Value, ApiError> {
    let username = rules::username(input.str("username")?)?;
    let email = rules::email(input.str("email")?)?;
    let password = input.str("password")?;
    rules::password("password", password)?;

    users::ensure_unique(ctx, "username", &username, None).await?;
    users::ensure_unique(ctx, "email", &email, None).await?;

    let services = ctx.services();
    let password_hash = services.passwords.hash(password)?;
    let role = if services.accounts.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };
    let id = SubjectId::generate();
    let at = now(ctx);
    let user = patch([
        ("id", json!(id.as_str())),
        ("username", json!(username)),
        ("email", json!(email)),
        ("passwordHash", json!(password_hash)),
        ("role", json!(role.as_str())),
        ("emailVerified", json!(false)),
        ("sessionVersion", json!(0)),
        ("refreshTokenHash", Value::Null),
        ("createdAt", json!(at)),
        ("updatedAt", json!(at)),
    ]);
    let user = ctx.store().insert(Collection::Users, user).await?;
    info!(user = %id, role = %role, "account registered");

    send_verification(ctx, &user).await;
    start_session(ctx, user).await
}

pub(super) async fn login(
    ctx: &RequestContext,
    email: &str,
    password: &str,
) -> Result<Value, ApiError> {
    let Some(user) = find_by_email(ctx, email).await? else {
        debug!("login for unknown email");
        return Err(ApiError::InvalidCredential);
    };
    let hash = str_field(&user, "passwordHash").unwrap_or_default();
    if !ctx.services().passwords.verify(password, hash) {
        debug!(user = str_field(&user, "id").unwrap_or_default(), "login with wrong password");
        return Err(ApiError::InvalidCredential);
    }
    start_session(ctx, user).await
}

/// Trade a refresh credential for a new access credential.
///
/// The refresh credential must be the latest one issued to the account and
/// must carry the account's current session version.
pub(super) async fn refresh_token(ctx: &RequestContext, token: &str) -> Result<Value, ApiError> {
    let services = ctx.services();
    let verified = services.tokens.verify(token, Purpose::Refresh)?;
    let user = ctx
        .store()
        .find_by_id(Collection::Users, verified.subject_id.as_str())
        .await?
        .ok_or(ApiError::InvalidCredential)?;

    let fingerprint = TokenService::fingerprint(token);
    if session_version(&user) != verified.session_version
        || str_field(&user, "refreshTokenHash") != Some(fingerprint.as_str())
    {
        debug!(user = %verified.subject_id, "refresh credential has been revoked");
        return Err(ApiError::InvalidCredential);
    }

    let access = services
        .tokens
        .issue(&verified.subject_id, Purpose::Access, verified.session_version)?;
    Ok(json!({ "accessToken": access.token }))
}

pub(super) async fn logout(ctx: &RequestContext) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    revoke_sessions(ctx, principal.subject_id.as_str(), Document::new()).await?;
    info!(user = %principal.subject_id, "logged out");
    Ok(Value::Bool(true))
}

pub(super) async fn change_password(
    ctx: &RequestContext,
    current: &str,
    new: &str,
) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    let user = users::load(ctx, principal.subject_id.as_str()).await?;
    let services = ctx.services();
    if !services
        .passwords
        .verify(current, str_field(&user, "passwordHash").unwrap_or_default())
    {
        return Err(ApiError::InvalidCredential);
    }
    rules::password("newPassword", new)?;

    let hash = services.passwords.hash(new)?;
    revoke_sessions(ctx, principal.subject_id.as_str(), patch([("passwordHash", json!(hash))]))
        .await?;
    info!(user = %principal.subject_id, "password changed");
    Ok(Value::Bool(true))
}

pub(super) async fn request_email_verification(ctx: &RequestContext) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    let user = users::load(ctx, principal.subject_id.as_str()).await?;
    if user.get("emailVerified").and_then(Value::as_bool) == Some(true) {
        debug!(user = %principal.subject_id, "email already verified");
        return Ok(Value::Bool(true));
    }
    send_verification(ctx, &user).await;
    Ok(Value::Bool(true))
}

/// Mark the address as verified. The credential only holds for the address
/// it was mailed to.
pub(super) async fn verify_email(ctx: &RequestContext, token: &str) -> Result<Value, ApiError> {
    let verified = ctx
        .services()
        .tokens
        .verify(token, Purpose::EmailVerification)?;
    let current = ctx
        .store()
        .find_by_id(Collection::Users, verified.subject_id.as_str())
        .await?
        .ok_or(ApiError::InvalidCredential)?;
    if !verified.is_bound_to(str_field(&current, "email").unwrap_or_default()) {
        debug!(user = %verified.subject_id, "verification credential is for another address");
        return Err(ApiError::InvalidCredential);
    }
    let user = ctx
        .store()
        .update_by_id(
            Collection::Users,
            verified.subject_id.as_str(),
            patch([("emailVerified", json!(true)), ("updatedAt", json!(now(ctx)))]),
        )
        .await?
        .ok_or(ApiError::InvalidCredential)?;
    info!(user = %verified.subject_id, "email verified");
    Ok(Value::Object(user))
}

/// Always answers `true`, whether or not the address belongs to an account
pub(super) async fn request_password_reset(
    ctx: &RequestContext,
    email: &str,
) -> Result<Value, ApiError> {
    match find_by_email(ctx, email).await {
        Ok(Some(user)) => send_password_reset(ctx, &user).await,
        Ok(None) => debug!("password reset requested for unknown email"),
        Err(e) => error!(error = %e, "password reset lookup failed"),
    }
    Ok(Value::Bool(true))
}

/// Set a new password with a reset credential. The reset bumps the session
/// version, so the same credential cannot be used twice.
pub(super) async fn reset_password(
    ctx: &RequestContext,
    token: &str,
    new: &str,
) -> Result<Value, ApiError> {
    let services = ctx.services();
    let verified = services.tokens.verify(token, Purpose::PasswordReset)?;
    let user = ctx
        .store()
        .find_by_id(Collection::Users, verified.subject_id.as_str())
        .await?
        .ok_or(ApiError::InvalidCredential)?;
    if session_version(&user) != verified.session_version {
        debug!(user = %verified.subject_id, "password reset credential already used");
        return Err(ApiError::InvalidCredential);
    }
    rules::password("newPassword", new)?;

    let hash = services.passwords.hash(new)?;
    revoke_sessions(ctx, verified.subject_id.as_str(), patch([("passwordHash", json!(hash))]))
        .await?;
    info!(user = %verified.subject_id, "password reset");
    Ok(Value::Bool(true))
}

fn session_version(user: &Document) -> u64 {
    user.get("sessionVersion")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

async fn find_by_email(ctx: &RequestContext, email: &str) -> Result<Option<Document>, ApiError> {
    let filter = Filter::new().with("email", email.trim().to_lowercase());
    let mut found = ctx
        .store()
        .find(Collection::Users, &filter, FindOptions::default().limit(1))
        .await?;
    Ok(found.pop())
}

/// Issue an access/refresh pair and remember the refresh fingerprint
async fn start_session(ctx: &RequestContext, user: Document) -> Result<Value, ApiError> {
    let tokens = &ctx.services().tokens;
    let subject = SubjectId::new(id_of(&user)?);
    let version = session_version(&user);
    let access = tokens.issue(&subject, Purpose::Access, version)?;
    let refresh = tokens.issue(&subject, Purpose::Refresh, version)?;

    let user = ctx
        .store()
        .update_by_id(
            Collection::Users,
            subject.as_str(),
            patch([(
                "refreshTokenHash",
                json!(TokenService::fingerprint(&refresh.token)),
            )]),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    ctx.mark_private();
    ctx.signed_in_as(subject);
    Ok(json!({
        "user": user,
        "accessToken": access.token,
        "refreshToken": refresh.token,
    }))
}

/// Invalidate every outstanding session credential of `user_id`, applying
/// `changes` in the same write
async fn revoke_sessions(
    ctx: &RequestContext,
    user_id: &str,
    mut changes: Document,
) -> Result<Document, ApiError> {
    let user = users::load(ctx, user_id).await?;
    changes.insert("sessionVersion".into(), json!(session_version(&user) + 1));
    changes.insert("refreshTokenHash".into(), Value::Null);
    changes.insert("updatedAt".into(), json!(now(ctx)));
    ctx.store()
        .update_by_id(Collection::Users, user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

async fn send_verification(ctx: &RequestContext, user: &Document) {
    let services = ctx.services();
    let Some((id, email, username)) = recipient(user) else {
        warn!("cannot send verification mail to an incomplete account");
        return;
    };
    let credential = match services.tokens.issue_bound(
        &SubjectId::new(id),
        Purpose::EmailVerification,
        session_version(user),
        email,
    ) {
        Ok(credential) => credential,
        Err(e) => {
            error!(user = %id, error = %e, "failed to issue verification credential");
            return;
        }
    };
    let link = format!(
        "{}/verify-email?token={}",
        services.accounts.public_url.trim_end_matches('/'),
        credential.token
    );
    let message = MailMessage {
        to: email.to_string(),
        subject: "Confirm your email address".to_string(),
        html: format!(
            "<p>Hi {username},</p><p><a href=\"{link}\">Confirm your email address</a></p>"
        ),
        text: Some(format!("Hi {username}, confirm your email address: {link}")),
    };
    if !services.mailer.send(message).await {
        warn!(user = %id, "verification mail was not accepted");
    }
}

async fn send_password_reset(ctx: &RequestContext, user: &Document) {
    let services = ctx.services();
    let Some((id, email, username)) = recipient(user) else {
        warn!("cannot send password reset mail to an incomplete account");
        return;
    };
    let credential = match services.tokens.issue(
        &SubjectId::new(id),
        Purpose::PasswordReset,
        session_version(user),
    ) {
        Ok(credential) => credential,
        Err(e) => {
            error!(user = %id, error = %e, "failed to issue password reset credential");
            return;
        }
    };
    let link = format!(
        "{}/reset-password?token={}",
        services.accounts.public_url.trim_end_matches('/'),
        credential.token
    );
    let message = MailMessage {
        to: email.to_string(),
        subject: "Reset your password".to_string(),
        html: format!(
            "<p>Hi {username},</p><p><a href=\"{link}\">Choose a new password</a>. \
             The link can be used once.</p>"
        ),
        text: Some(format!("Hi {username}, choose a new password: {link}")),
    };
    if !services.mailer.send(message).await {
        warn!(user = %id, "password reset mail was not accepted");
    }
}

fn recipient(user: &Document) -> Option<(&str, &str, &str)> {
    Some((
        str_field(user, "id")?,
        str_field(user, "email")?,
        str_field(user, "username")?,
    ))
}
