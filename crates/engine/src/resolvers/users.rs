//! Users: lookups, profile changes, roles and account deletion

use super::{id_of, now, rules, str_field, Args, Page};
use crate::context::RequestContext;
use gazette_core::{ApiError, Collection, Document, Filter, FindOptions, Role, Sort};
use gazette_security::{require_authenticated, require_owner_or_role, require_role};
use serde_json::{json, Value};
use tracing::info;

pub(super) async fn me(ctx: &RequestContext) -> Result<Value, ApiError> {
    let Some(subject) = ctx.identity().subject_id() else {
        return Ok(Value::Null);
    };
    ctx.mark_private();
    let user = ctx
        .store()
        .find_by_id(Collection::Users, subject.as_str())
        .await?;
    Ok(user.map_or(Value::Null, Value::Object))
}

pub(super) async fn user(ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
    load(ctx, id).await.map(Value::Object)
}

pub(super) async fn users(ctx: &RequestContext, page: Page) -> Result<Value, ApiError> {
    let users = ctx
        .store()
        .find(
            Collection::Users,
            &Filter::new(),
            page.options(Sort::ascending("createdAt")),
        )
        .await?;
    Ok(Value::Array(users.into_iter().map(Value::Object).collect()))
}

/// Visible to the account itself and to admins, `null` for everyone else
pub(super) fn email(ctx: &RequestContext, user: &Document) -> Value {
    let owner = str_field(user, "id").is_some_and(|id| ctx.acts_for(id));
    if owner || ctx.identity().has_role(&[Role::Admin]) {
        ctx.mark_private();
        user.get("email").cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

/// The author of a post or comment; `null` once the account is gone
pub(super) async fn author(ctx: &RequestContext, parent: &Document) -> Result<Value, ApiError> {
    let Some(author_id) = str_field(parent, "authorId") else {
        return Ok(Value::Null);
    };
    let user = ctx.store().find_by_id(Collection::Users, author_id).await?;
    Ok(user.map_or(Value::Null, Value::Object))
}

pub(super) async fn update_profile(ctx: &RequestContext, args: &Args<'_>) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    let id = principal.subject_id.as_str();
    let username = args.opt_str("username");
    let email = args.opt_str("email");
    if username.is_none() && email.is_none() {
        return Err(ApiError::invalid("Provide a username or an email to update"));
    }

    let current = load(ctx, id).await?;
    let mut changes = Document::new();
    if let Some(username) = username {
        let username = rules::username(username)?;
        if str_field(&current, "username") != Some(username.as_str()) {
            ensure_unique(ctx, "username", &username, Some(id)).await?;
            changes.insert("username".into(), json!(username));
        }
    }
    if let Some(email) = email {
        let email = rules::email(email)?;
        if str_field(&current, "email") != Some(email.as_str()) {
            ensure_unique(ctx, "email", &email, Some(id)).await?;
            changes.insert("email".into(), json!(email));
            changes.insert("emailVerified".into(), json!(false));
        }
    }
    if changes.is_empty() {
        return Ok(Value::Object(current));
    }
    changes.insert("updatedAt".into(), json!(now(ctx)));

    let updated = ctx
        .store()
        .update_by_id(Collection::Users, id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user = %id, "profile updated");
    Ok(Value::Object(updated))
}

pub(super) async fn set_user_role(
    ctx: &RequestContext,
    id: &str,
    role: &str,
) -> Result<Value, ApiError> {
    let admin = require_role(ctx.identity(), &[Role::Admin])?;
    let role: Role = role.parse()?;
    let updated = ctx
        .store()
        .update_by_id(
            Collection::Users,
            id,
            super::patch([("role", json!(role.as_str())), ("updatedAt", json!(now(ctx)))]),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user = %id, role = %role, by = %admin.subject_id, "role changed");
    Ok(Value::Object(updated))
}

/// Remove the account, its posts, the comments on those posts and the
/// account's own comments
pub(super) async fn delete_user(ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
    require_owner_or_role(ctx.identity(), id, &[Role::Admin])?;
    let store = ctx.store();
    load(ctx, id).await?;

    let by_author = Filter::new().with("authorId", id);
    let posts = store
        .find(Collection::Posts, &by_author, FindOptions::default())
        .await?;
    let mut comments_removed = 0;
    for post in &posts {
        comments_removed += store
            .delete_many(Collection::Comments, &Filter::new().with("postId", id_of(post)?))
            .await?;
    }
    let posts_removed = store.delete_many(Collection::Posts, &by_author).await?;
    comments_removed += store.delete_many(Collection::Comments, &by_author).await?;
    store.delete_by_id(Collection::Users, id).await?;

    info!(
        user = %id,
        posts = posts_removed,
        comments = comments_removed,
        "account deleted"
    );
    Ok(Value::Bool(true))
}

pub(super) async fn load(ctx: &RequestContext, id: &str) -> Result<Document, ApiError> {
    ctx.store()
        .find_by_id(Collection::Users, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Reject `value` for `field` when another account already holds it
pub(super) async fn ensure_unique(
    ctx: &RequestContext,
    field: &str,
    value: &str,
    except: Option<&str>,
) -> Result<(), ApiError> {
    let holders = ctx
        .store()
        .find(
            Collection::Users,
            &Filter::new().with(field, value),
            FindOptions::default().limit(2),
        )
        .await?;
    let taken = holders
        .iter()
        .any(|holder| str_field(holder, "id") != except);
    if taken {
        let message = match field {
            "username" => "Username is already taken",
            "email" => "Email is already registered",
            _ => "Value is already in use",
        };
        return Err(ApiError::validation(field, message));
    }
    Ok(())
}
