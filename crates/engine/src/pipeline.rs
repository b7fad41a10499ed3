//! The request pipeline
//!
//! ```text
//! Receive (parse, select operation, validate, coerce variables)
//!   -> ResolveIdentity -> EvaluateCost -> CacheLookup
//!   -> HIT:  shape cached payload
//!   -> MISS: Execute -> CacheStore (when eligible) -> shape live result
//! ```
//!
//! Structural failures and cost rejections answer `data: null` before any
//! resolver runs.

use crate::context::RequestContext;
use crate::executor::Executor;
use crate::request::{CacheStatus, ExecutionOutcome, GraphRequest};
use crate::services::Services;
use gazette_cache::{CacheLookup, Fingerprint};
use gazette_core::{ApiError, Response};
use gazette_query::{
    accept, coerce_variables, estimate, parse, validate, CostPolicy, OperationKind, Schema,
};
use gazette_security::IdentityResolver;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

pub struct Pipeline {
    schema: Schema,
    services: Arc<Services>,
    identity: IdentityResolver,
    cost: CostPolicy,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("services", &self.services)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(services: Arc<Services>, cost: CostPolicy) -> Self {
        let identity = IdentityResolver::new(services.tokens.clone(), services.store.clone());
        Self {
            schema: Schema::content_api(),
            services,
            identity,
            cost,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn cost_policy(&self) -> &CostPolicy {
        &self.cost
    }

    /// Answer one request. `authorization` is the raw `Authorization` header.
    pub async fn execute(
        &self,
        request: GraphRequest,
        authorization: Option<&str>,
    ) -> ExecutionOutcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!(
            "graphql",
            request_id = %request_id,
            operation = request.operation_name.as_deref().unwrap_or("anonymous"),
        );
        self.run(request, authorization, request_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: GraphRequest,
        authorization: Option<&str>,
        request_id: String,
    ) -> ExecutionOutcome {
        let document = match parse(&request.query) {
            Ok(document) => document,
            Err(e) => {
                debug!(error = %e, "operation did not parse");
                return reject(&ApiError::from(e));
            }
        };
        let operation = match document.operation(request.operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(e) => {
                debug!(error = %e, "no operation to run");
                return reject(&e);
            }
        };
        if let Err(errors) = validate(&document, operation, &self.schema) {
            debug!(errors = errors.len(), "operation failed validation");
            return ExecutionOutcome::bypass(Response::failure(errors));
        }
        let variables =
            match coerce_variables(operation, &self.schema, request.variables.as_ref()) {
                Ok(variables) => variables,
                Err(e) => {
                    debug!(error = %e, "variables rejected");
                    return reject(&e);
                }
            };
        debug!(kind = %operation.kind, "operation received");

        let identity = self.identity.resolve(authorization).await;
        debug!(authenticated = identity.is_authenticated(), "identity resolved");

        let estimate = match estimate(
            operation,
            &document.fragments,
            &self.schema,
            &variables,
            &self.cost,
        ) {
            Ok(estimate) => estimate,
            Err(e) => return reject(&e),
        };
        if let Err(e) = accept(&estimate, &self.cost) {
            debug!(cost = estimate.cost, depth = estimate.depth, "operation too expensive");
            return reject(&e);
        }
        debug!(cost = estimate.cost, depth = estimate.depth, "cost accepted");

        let cache = &self.services.cache;
        let operation_name = operation.name.as_deref();
        let fingerprint = (operation.kind == OperationKind::Query
            && cache.is_cacheable(operation_name))
        .then(|| {
            Fingerprint::compute(
                &request.query,
                &Value::Object(variables.clone()),
                operation_name,
            )
        });

        // Only anonymous callers are answered from the cache: an entry holds
        // the public view, and a signed-in caller may be entitled to more.
        let mut status = CacheStatus::Bypass;
        if let Some(fingerprint) = fingerprint.as_ref().filter(|_| !identity.is_authenticated()) {
            match cache.lookup(fingerprint).await {
                CacheLookup::Hit { payload, age } => {
                    debug!(age, "answered from cache");
                    return ExecutionOutcome::new(
                        Response::data(payload),
                        CacheStatus::Hit { age },
                    );
                }
                CacheLookup::Miss => status = CacheStatus::Miss,
            }
        }

        let context = RequestContext::new(identity, self.services.clone(), request_id);
        let response = Executor::new(&self.schema, &document.fragments, &variables, &context)
            .execute(operation)
            .await;

        if let (Some(fingerprint), Some(data)) = (&fingerprint, &response.data) {
            if context.is_private() {
                debug!("viewer-specific response not cached");
            } else {
                cache.store(fingerprint, data, response.has_errors()).await;
            }
        }

        debug!(
            errors = response.errors.len(),
            cache = status.header_value(),
            "operation completed"
        );
        ExecutionOutcome::new(response, status)
    }
}

fn reject(error: &ApiError) -> ExecutionOutcome {
    ExecutionOutcome::bypass(Response::from_error(error))
}
