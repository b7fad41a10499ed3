//! Posts and their visibility
//!
//! An unpublished post exists only for its author and for admins. Anyone
//! else gets `NotFound` for a direct lookup and never sees it in a list.

use super::{id_of, now, patch, rules, str_field, Args, Page};
use crate::context::RequestContext;
use gazette_core::{ApiError, Collection, Document, Filter, Identity, Role, Sort};
use gazette_security::{require_authenticated, require_owner_or_role};
use serde_json::{json, Value};
use tracing::info;

fn is_published(post: &Document) -> bool {
    post.get("published").and_then(Value::as_bool) == Some(true)
}

fn can_view(identity: &Identity, post: &Document) -> bool {
    is_published(post)
        || identity.has_role(&[Role::Admin])
        || str_field(post, "authorId").is_some_and(|author| identity.is_subject(author))
}

/// Load a post the caller is allowed to see
pub(super) async fn visible(ctx: &RequestContext, id: &str) -> Result<Document, ApiError> {
    let post = ctx
        .store()
        .find_by_id(Collection::Posts, id)
        .await?
        .filter(|post| can_view(ctx.identity(), post))
        .ok_or_else(|| ApiError::not_found("Post"))?;
    if !is_published(&post) {
        ctx.mark_private();
    }
    Ok(post)
}

pub(super) async fn post(ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
    visible(ctx, id).await.map(Value::Object)
}

/// The store filter for a post listing as seen by the caller, or `None` when
/// nothing could match. The flag tells whether unpublished posts may appear.
fn listing(
    identity: &Identity,
    author_id: Option<&str>,
    published: Option<bool>,
) -> Option<(Filter, bool)> {
    let privileged = identity.has_role(&[Role::Admin])
        || author_id.is_some_and(|author| identity.is_subject(author));
    let mut filter = Filter::new();
    if let Some(author) = author_id {
        filter = filter.with("authorId", author);
    }
    match (privileged, published) {
        (true, Some(published)) => Some((filter.with("published", published), !published)),
        (true, None) => Some((filter, true)),
        (false, Some(false)) => None,
        (false, _) => Some((filter.with("published", true), false)),
    }
}

async fn list(
    ctx: &RequestContext,
    author_id: Option<&str>,
    published: Option<bool>,
    page: Page,
) -> Result<Value, ApiError> {
    let Some((filter, includes_unpublished)) = listing(ctx.identity(), author_id, published)
    else {
        return Ok(Value::Array(Vec::new()));
    };
    // a page without drafts can still be shifted by drafts on earlier pages
    if includes_unpublished {
        ctx.mark_private();
    }
    let posts = ctx
        .store()
        .find(Collection::Posts, &filter, page.options(Sort::descending("createdAt")))
        .await?;
    Ok(Value::Array(posts.into_iter().map(Value::Object).collect()))
}

pub(super) async fn posts(ctx: &RequestContext, args: &Args<'_>) -> Result<Value, ApiError> {
    let page = Page::from_args(args)?;
    list(ctx, args.opt_str("authorId"), args.opt_bool("published"), page).await
}

pub(super) async fn by_author(
    ctx: &RequestContext,
    user: &Document,
    args: &Args<'_>,
) -> Result<Value, ApiError> {
    let page = Page::from_args(args)?;
    list(ctx, Some(id_of(user)?), None, page).await
}

pub(super) async fn post_count(ctx: &RequestContext, args: &Args<'_>) -> Result<Value, ApiError> {
    let Some((filter, includes_unpublished)) = listing(
        ctx.identity(),
        args.opt_str("authorId"),
        args.opt_bool("published"),
    ) else {
        return Ok(json!(0));
    };
    if includes_unpublished {
        ctx.mark_private();
    }
    let count = ctx.store().count(Collection::Posts, &filter).await?;
    Ok(json!(count))
}

/// The post a comment belongs to, `null` when the caller cannot see it
pub(super) async fn for_comment(ctx: &RequestContext, comment: &Document) -> Result<Value, ApiError> {
    let Some(post_id) = str_field(comment, "postId") else {
        return Ok(Value::Null);
    };
    match visible(ctx, post_id).await {
        Ok(post) => Ok(Value::Object(post)),
        Err(ApiError::NotFound { .. }) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}

pub(super) async fn create_post(ctx: &RequestContext, input: &Args<'_>) -> Result<Value, ApiError> {
    let principal = require_authenticated(ctx.identity())?;
    let title = rules::text("title", input.str("title")?, rules::TITLE_LENGTH)?;
    let body = rules::text("body", input.str("body")?, rules::POST_BODY_LENGTH)?;
    let published = input.opt_bool("published").unwrap_or(false);

    let at = now(ctx);
    let post = patch([
        ("id", json!(super::new_id())),
        ("title", json!(title)),
        ("body", json!(body)),
        ("published", json!(published)),
        ("authorId", json!(principal.subject_id.as_str())),
        ("createdAt", json!(at)),
        ("updatedAt", json!(at)),
        ("publishedAt", if published { json!(at) } else { Value::Null }),
    ]);
    let post = ctx.store().insert(Collection::Posts, post).await?;
    info!(
        post = str_field(&post, "id").unwrap_or_default(),
        author = %principal.subject_id,
        published,
        "post created"
    );
    Ok(Value::Object(post))
}

/// A visible post the caller may change
async fn owned(ctx: &RequestContext, id: &str) -> Result<Document, ApiError> {
    let post = visible(ctx, id).await?;
    require_owner_or_role(
        ctx.identity(),
        str_field(&post, "authorId").unwrap_or_default(),
        &[Role::Admin],
    )?;
    Ok(post)
}

pub(super) async fn update_post(
    ctx: &RequestContext,
    id: &str,
    input: &Args<'_>,
) -> Result<Value, ApiError> {
    owned(ctx, id).await?;
    let mut changes = Document::new();
    if let Some(title) = input.opt_str("title") {
        changes.insert(
            "title".into(),
            json!(rules::text("title", title, rules::TITLE_LENGTH)?),
        );
    }
    if let Some(body) = input.opt_str("body") {
        changes.insert(
            "body".into(),
            json!(rules::text("body", body, rules::POST_BODY_LENGTH)?),
        );
    }
    if changes.is_empty() {
        return Err(ApiError::invalid("Provide a title or a body to update"));
    }
    changes.insert("updatedAt".into(), json!(now(ctx)));
    save(ctx, id, changes).await
}

pub(super) async fn publish_post(
    ctx: &RequestContext,
    id: &str,
    published: bool,
) -> Result<Value, ApiError> {
    let post = owned(ctx, id).await?;
    let at = now(ctx);
    let published_at = match (published, is_published(&post)) {
        (true, true) => post.get("publishedAt").cloned().unwrap_or(json!(at)),
        (true, false) => json!(at),
        (false, _) => Value::Null,
    };
    let changes = patch([
        ("published", json!(published)),
        ("publishedAt", published_at),
        ("updatedAt", json!(at)),
    ]);
    info!(post = %id, published, "publication changed");
    save(ctx, id, changes).await
}

pub(super) async fn delete_post(ctx: &RequestContext, id: &str) -> Result<Value, ApiError> {
    owned(ctx, id).await?;
    let store = ctx.store();
    let comments = store
        .delete_many(Collection::Comments, &Filter::new().with("postId", id))
        .await?;
    let removed = store.delete_by_id(Collection::Posts, id).await?;
    info!(post = %id, comments, "post deleted");
    Ok(Value::Bool(removed))
}

async fn save(ctx: &RequestContext, id: &str, changes: Document) -> Result<Value, ApiError> {
    ctx.store()
        .update_by_id(Collection::Posts, id, changes)
        .await?
        .map(Value::Object)
        .ok_or_else(|| ApiError::not_found("Post"))
}
