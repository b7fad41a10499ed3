//! Field resolvers of the content schema
//!
//! [`resolve`] routes a `(type, field)` pair to its resolver. Fields without
//! one read the property of the same name from the parent document.

mod admin;
mod auth;
mod comments;
mod posts;
pub mod rules;
mod users;

use crate::context::RequestContext;
use gazette_core::clock::timestamp;
use gazette_core::{ApiError, Document, FindOptions, Sort};
use serde_json::{Map, Value};

/// Run the resolver for `type_name.field`
pub async fn resolve(
    ctx: &RequestContext,
    type_name: &str,
    field: &str,
    parent: &Document,
    arguments: &Map<String, Value>,
) -> Result<Value, ApiError> {
    let args = Args::new(arguments);
    match (type_name, field) {
        ("Query", "me") => users::me(ctx).await,
        ("Query", "user") => users::user(ctx, args.str("id")?).await,
        ("Query", "users") => users::users(ctx, Page::from_args(&args)?).await,
        ("Query", "post") => posts::post(ctx, args.str("id")?).await,
        ("Query", "posts") => posts::posts(ctx, &args).await,
        ("Query", "postCount") => posts::post_count(ctx, &args).await,
        ("Query", "comments") => comments::comments(ctx, &args).await,
        ("Query", "cacheStats") => admin::cache_stats(ctx),

        ("Mutation", "register") => auth::register(ctx, &args.object("input")?).await,
        ("Mutation", "login") => auth::login(ctx, args.str("email")?, args.str("password")?).await,
        ("Mutation", "refreshToken") => auth::refresh_token(ctx, args.str("refreshToken")?).await,
        ("Mutation", "logout") => auth::logout(ctx).await,
        ("Mutation", "changePassword") => {
            auth::change_password(ctx, args.str("currentPassword")?, args.str("newPassword")?)
                .await
        }
        ("Mutation", "requestEmailVerification") => auth::request_email_verification(ctx).await,
        ("Mutation", "verifyEmail") => auth::verify_email(ctx, args.str("token")?).await,
        ("Mutation", "requestPasswordReset") => {
            auth::request_password_reset(ctx, args.str("email")?).await
        }
        ("Mutation", "resetPassword") => {
            auth::reset_password(ctx, args.str("token")?, args.str("newPassword")?).await
        }
        ("Mutation", "updateProfile") => users::update_profile(ctx, &args).await,
        ("Mutation", "setUserRole") => {
            users::set_user_role(ctx, args.str("id")?, args.str("role")?).await
        }
        ("Mutation", "deleteUser") => users::delete_user(ctx, args.str("id")?).await,
        ("Mutation", "createPost") => posts::create_post(ctx, &args.object("input")?).await,
        ("Mutation", "updatePost") => {
            posts::update_post(ctx, args.str("id")?, &args.object("input")?).await
        }
        ("Mutation", "publishPost") => {
            posts::publish_post(ctx, args.str("id")?, args.bool("published")?).await
        }
        ("Mutation", "deletePost") => posts::delete_post(ctx, args.str("id")?).await,
        ("Mutation", "createComment") => {
            comments::create_comment(ctx, args.str("postId")?, args.str("body")?).await
        }
        ("Mutation", "updateComment") => {
            comments::update_comment(ctx, args.str("id")?, args.str("body")?).await
        }
        ("Mutation", "deleteComment") => comments::delete_comment(ctx, args.str("id")?).await,
        ("Mutation", "invalidateCache") => admin::invalidate_cache(ctx, &args).await,

        ("User", "email") => Ok(users::email(ctx, parent)),
        ("User", "posts") => posts::by_author(ctx, parent, &args).await,
        ("Post", "author") | ("Comment", "author") => users::author(ctx, parent).await,
        ("Post", "commentCount") => comments::count_for_post(ctx, parent).await,
        ("Post", "comments") => comments::for_post(ctx, parent, &args).await,
        ("Comment", "post") => posts::for_comment(ctx, parent).await,

        _ => Ok(parent.get(field).cloned().unwrap_or(Value::Null)),
    }
}

/// Typed access to coerced field arguments
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn str(&self, name: &str) -> Result<&'a str, ApiError> {
        self.opt_str(name)
            .ok_or_else(|| ApiError::validation(name, format!("{name} is required")))
    }

    pub fn opt_str(&self, name: &str) -> Option<&'a str> {
        self.present(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Result<bool, ApiError> {
        self.opt_bool(name)
            .ok_or_else(|| ApiError::validation(name, format!("{name} is required")))
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.present(name).and_then(Value::as_bool)
    }

    pub fn opt_int(&self, name: &str) -> Option<i64> {
        self.present(name).and_then(Value::as_i64)
    }

    /// An input object argument
    pub fn object(&self, name: &str) -> Result<Args<'a>, ApiError> {
        self.present(name)
            .and_then(Value::as_object)
            .map(Args::new)
            .ok_or_else(|| ApiError::validation(name, format!("{name} is required")))
    }
}

/// `limit`/`offset` paging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    /// `limit` is clamped into `1..=100`; a negative `offset` is rejected
    pub fn from_args(args: &Args<'_>) -> Result<Self, ApiError> {
        let limit = match args.opt_int("limit") {
            None => Self::DEFAULT_LIMIT,
            Some(limit) if limit < 1 => 1,
            Some(limit) => usize::try_from(limit)
                .unwrap_or(Self::MAX_LIMIT)
                .min(Self::MAX_LIMIT),
        };
        let offset = match args.opt_int("offset") {
            None => 0,
            Some(offset) => usize::try_from(offset)
                .map_err(|_| ApiError::validation("offset", "offset must not be negative"))?,
        };
        Ok(Self { limit, offset })
    }

    pub fn options(&self, sort: Sort) -> FindOptions {
        FindOptions::default()
            .sort(sort)
            .skip(self.offset)
            .limit(self.limit)
    }
}

fn now(ctx: &RequestContext) -> String {
    timestamp(ctx.services().clock.now())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn id_of(document: &Document) -> Result<&str, ApiError> {
    document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::internal("stored document has no id"))
}

fn str_field<'d>(document: &'d Document, field: &str) -> Option<&'d str> {
    document.get(field).and_then(Value::as_str)
}

fn patch<const N: usize>(fields: [(&str, Value); N]) -> Document {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_page_defaults_and_clamps() {
        let empty = args(json!({}));
        assert_eq!(
            Page::from_args(&Args::new(&empty)).unwrap(),
            Page { limit: 10, offset: 0 }
        );

        let big = args(json!({"limit": 5000, "offset": 20}));
        assert_eq!(
            Page::from_args(&Args::new(&big)).unwrap(),
            Page { limit: 100, offset: 20 }
        );

        let zero = args(json!({"limit": 0}));
        assert_eq!(Page::from_args(&Args::new(&zero)).unwrap().limit, 1);
    }

    #[test]
    fn test_negative_offset_is_rejected() {
        let negative = args(json!({"offset": -1}));
        let err = Page::from_args(&Args::new(&negative)).unwrap_err();
        assert_eq!(err.extensions()["field"], "offset");
    }

    #[test]
    fn test_null_arguments_count_as_absent() {
        let values = args(json!({"authorId": null, "published": true}));
        let args = Args::new(&values);
        assert!(args.opt_str("authorId").is_none());
        assert_eq!(args.opt_bool("published"), Some(true));
        assert_eq!(args.str("authorId").unwrap_err().extensions()["field"], "authorId");
    }

    #[test]
    fn test_patch_builds_documents() {
        let doc = patch([("title", json!("t")), ("published", json!(true))]);
        assert_eq!(doc["title"], "t");
        assert_eq!(doc["published"], true);
    }
}
