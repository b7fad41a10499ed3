//! Administrative fields: cache counters and invalidation

use super::Args;
use crate::context::RequestContext;
use gazette_core::{ApiError, Role};
use gazette_security::require_role;
use serde_json::{json, Value};
use tracing::info;

pub(super) fn cache_stats(ctx: &RequestContext) -> Result<Value, ApiError> {
    require_role(ctx.identity(), &[Role::Admin])?;
    ctx.mark_private();
    serde_json::to_value(ctx.services().cache.stats())
        .map_err(|e| ApiError::internal(format!("failed to encode cache stats: {e}")))
}

/// Drop cached responses by operation name or by key pattern; answers the
/// number of entries removed
pub(super) async fn invalidate_cache(
    ctx: &RequestContext,
    args: &Args<'_>,
) -> Result<Value, ApiError> {
    let admin = require_role(ctx.identity(), &[Role::Admin])?;
    let cache = &ctx.services().cache;
    let removed = match (args.opt_str("operationName"), args.opt_str("pattern")) {
        (Some(name), None) => cache.invalidate_operation(name).await?,
        (None, Some(pattern)) => cache.invalidate_pattern(pattern).await?,
        _ => {
            return Err(ApiError::invalid(
                "Provide exactly one of operationName or pattern",
            ))
        }
    };
    info!(removed, by = %admin.subject_id, "cache invalidated");
    Ok(json!(removed))
}
