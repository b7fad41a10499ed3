//! Comments on posts

use super::{id_of, now, patch, posts, rules, str_field, Args, Page};
use crate::context::RequestContext;
use gazette_core::{ApiError, Collection, Document, Filter, Role, Sort};
use gazette_security::{require_authenticated, require_owner_or_role};
use serde_json::{json, Value};
use tracing::info;

async fn list(ctx: &RequestContext, post_id: &str, page: Page) -> Result<Value, ApiError> {
    let comments = ctx
        .store()
        .find(
            Collection::Comments,
            &Filter::new().with("postId", post_id),
            page.options(Sort::ascending("createdAt")),
        )
        .await?;
    Ok(Value::Array(comments.into_iter().map(Value::Object).collect()))
}

pub(super) async fn comments(ctx: &RequestContext, args: &Args<'_>) -> Result<Value, ApiError> {
    let page = Page::from_args(args)?;
    let post = posts::visible(ctx, args.str("postId")?).await?;
    list(ctx, id_of(&post)?, page).await
}

pub(super) async fn for_post(
    ctx: &RequestContext,
    post: &Document,
    args: &Args<'_>,
) -> Result<Value, ApiError> {
    let page = Page::from_args(args)?;
    list(ctx, id_of(post)?, page).await
}

pub(super) async fn count_for_post(ctx: &RequestContext, post: &Document) -> Result<Value, ApiError> {
    let count = ctx
        .store()
        .count(Collection::Comments, &Filter::new().with("postId", id_of(post)?))
        .await?;
    Ok(json!(count))
}

pub(super) async fn create_comment(
    ctx: &RequestContext,
    post_id: &str,
    body: &str,
) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    let body = rules::text("body", body, rules::COMMENT_BODY_LENGTH)?;
    posts::visible(ctx, post_id).await?;

    let at = now(ctx);
    let comment = patch([
        ("id", json!(super::new_id())),
        ("body", json!(body)),
        ("postId", json!(post_id)),
        ("authorId", json!(principal.subject_id.as_str())),
        ("createdAt", json!(at)),
        ("updatedAt", json!(at)),
    ]);
    let comment = ctx.store().insert(Collection::Comments, comment).await?;
    info!(
        comment = str_field(&comment, "id").unwrap_or_default(),
        post = %post_id,
        "comment created"
    );
    Ok(Value::Object(comment))
}

/// A comment the caller may change
async fn owned(ctx: &RequestContext, id: &str) -> Result<Document, ApiError> {
    let comment = ctx
        .store()
        .find_by_id(Collection::Comments, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    require_owner_or_role(
        ctx.identity(),
        str_field(&comment, "authorId").unwrap_or_default(),
        &[Role::Admin],
    )?;
    Ok(comment)
}

pub(super) async fn update_comment(
    ctx: &RequestContext,
    id: &str,
    body: &str,
) -> Result<Value, ApiError> {
    owned(ctx, id).await?;
    let body = rules::text("body", body, rules::COMMENT_BODY_LENGTH)?;
    ctx.store()
        .update_by_id(
            Collection::Comments,
            id,
            patch([("body", json!(body)), ("updatedAt", json!(now(ctx)))]),
        )
        .await?
        .map(Value::Object)
        .ok_or_else(|| ApiError::not_found("Comment"))
}

pub(super) async fn delete_comment(ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
    owned(ctx, id).await?;
    let removed = ctx.store().delete_by_id(Collection::Comments, id).await?;
    info!(comment = %id, "comment deleted");
    Ok(Value::Bool(removed))
}
