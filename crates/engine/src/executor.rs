//! Executes a validated operation against the resolvers
//!
//! Query fields at every level run concurrently; mutation root fields run one
//! after another in document order. A field that fails leaves `null` at its
//! position and an error carrying its path. When the failing position is
//! non-null, the `null` moves up to the nearest nullable ancestor, and to
//! `data` itself when it reaches the root.

use crate::context::RequestContext;
use crate::resolvers;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use gazette_core::{ApiError, Document, GraphError, Location, PathSegment, Response};
use gazette_query::schema::TypeRef;
use gazette_query::{
    coerce_arguments, introspection, Field, FragmentDefinition, OperationDefinition,
    OperationKind, Schema, Selection, SelectionSet,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};

/// A position that must hold a value ended up null. The error that caused it
/// is already recorded; the nearest nullable ancestor turns into `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NullPropagation;

type Completion = Result<Value, NullPropagation>;

/// Fields sharing one response key, in first-seen order
type GroupedFields<'a> = Vec<(&'a str, Vec<&'a Field>)>;

pub struct Executor<'a> {
    schema: &'a Schema,
    fragments: &'a HashMap<String, FragmentDefinition>,
    variables: &'a Map<String, Value>,
    context: &'a RequestContext,
    errors: Mutex<Vec<GraphError>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        schema: &'a Schema,
        fragments: &'a HashMap<String, FragmentDefinition>,
        variables: &'a Map<String, Value>,
        context: &'a RequestContext,
    ) -> Self {
        Self {
            schema,
            fragments,
            variables,
            context,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Run `operation` and shape the envelope
    pub async fn execute(self, operation: &'a OperationDefinition) -> Response {
        let Some(root) = self.schema.root_type(operation.kind) else {
            return Response::from_error(&ApiError::malformed(
                format!("Schema does not support {} operations", operation.kind),
                Some(operation.location),
            ));
        };

        let serial = operation.kind == OperationKind::Mutation;
        let result = self
            .execute_object(
                vec![&operation.selection_set],
                root.name.as_str(),
                Document::new(),
                Vec::new(),
                serial,
            )
            .await;

        let errors = self.errors.into_inner();
        match result {
            Ok(data) => Response::partial(data, errors),
            Err(NullPropagation) => Response::failure(errors),
        }
    }

    fn execute_object<'b>(
        &'b self,
        selection_sets: Vec<&'a SelectionSet>,
        type_name: &'a str,
        parent: Document,
        path: Vec<PathSegment>,
        serial: bool,
    ) -> BoxFuture<'b, Completion> {
        async move {
            let grouped = self.collect_fields(&selection_sets, type_name);

            let results = if serial {
                let mut results = Vec::with_capacity(grouped.len());
                for (key, fields) in &grouped {
                    results.push(
                        self.execute_field(type_name, &parent, key, fields, &path)
                            .await,
                    );
                }
                results
            } else {
                join_all(
                    grouped
                        .iter()
                        .map(|(key, fields)| self.execute_field(type_name, &parent, key, fields, &path)),
                )
                .await
            };

            let mut data = Map::new();
            let mut propagate = false;
            for ((key, _), result) in grouped.iter().zip(results) {
                match result {
                    Ok(value) => {
                        data.insert((*key).to_string(), value);
                    }
                    Err(NullPropagation) => propagate = true,
                }
            }

            if propagate {
                Err(NullPropagation)
            } else {
                Ok(Value::Object(data))
            }
        }
        .boxed()
    }

    async fn execute_field(
        &self,
        type_name: &'a str,
        parent: &Document,
        key: &str,
        fields: &[&'a Field],
        path: &[PathSegment],
    ) -> Completion {
        let Some(&field) = fields.first() else {
            return Ok(Value::Null);
        };
        let mut path = path.to_vec();
        path.push(PathSegment::Field(key.to_string()));

        if field.name == "__typename" {
            return Ok(Value::String(type_name.to_string()));
        }

        let Some(definition) = self.schema.field(type_name, &field.name) else {
            let error = ApiError::internal(format!(
                "field {type_name}.{} passed validation but is not defined",
                field.name
            ));
            self.record(&error, path, field.location);
            return Ok(Value::Null);
        };

        if Schema::is_introspection_field(&field.name) {
            return Ok(introspection::resolve(
                field,
                self.schema,
                self.fragments,
                self.variables,
            ));
        }

        let arguments = match coerce_arguments(definition, field, self.variables, self.schema) {
            Ok(arguments) => arguments,
            Err(error) => return self.fail(&definition.ty, &error, path, field.location),
        };

        match resolvers::resolve(self.context, type_name, &field.name, parent, &arguments).await {
            Ok(value) => {
                self.complete(&definition.ty, value, fields, path, field.location)
                    .await
            }
            Err(error) => self.fail(&definition.ty, &error, path, field.location),
        }
    }

    /// Fit a resolved value to its declared type, descending into objects
    /// and lists
    fn complete<'b>(
        &'b self,
        ty: &'a TypeRef,
        value: Value,
        fields: &'b [&'a Field],
        path: Vec<PathSegment>,
        location: Location,
    ) -> BoxFuture<'b, Completion> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    let completed = self
                        .complete_nullable(inner, value, fields, path.clone(), location)
                        .await?;
                    if completed.is_null() {
                        let error = ApiError::internal(format!(
                            "resolver returned null for non-null type {ty}"
                        ));
                        self.record(&error, path, location);
                        return Err(NullPropagation);
                    }
                    Ok(completed)
                }
                nullable => Ok(self
                    .complete_nullable(nullable, value, fields, path, location)
                    .await
                    .unwrap_or(Value::Null)),
            }
        }
        .boxed()
    }

    async fn complete_nullable(
        &self,
        ty: &'a TypeRef,
        value: Value,
        fields: &[&'a Field],
        path: Vec<PathSegment>,
        location: Location,
    ) -> Completion {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            TypeRef::List(item_type) => {
                let Value::Array(items) = value else {
                    let error = ApiError::internal(format!("expected a list for {ty}"));
                    self.record(&error, path, location);
                    return Err(NullPropagation);
                };
                let completions = items.into_iter().enumerate().map(|(index, item)| {
                    let mut item_path = path.clone();
                    item_path.push(PathSegment::Index(index));
                    self.complete(item_type, item, fields, item_path, location)
                });
                join_all(completions)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            TypeRef::Named(name) if self.schema.is_leaf(name) => Ok(value),
            TypeRef::Named(name) => {
                let Value::Object(object) = value else {
                    let error = ApiError::internal(format!("expected an object for {name}"));
                    self.record(&error, path, location);
                    return Err(NullPropagation);
                };
                let selection_sets = fields.iter().map(|&field| &field.selection_set).collect();
                self.execute_object(selection_sets, name.as_str(), object, path, false)
                    .await
            }
            TypeRef::NonNull(_) => {
                self.complete(ty, value, fields, path, location).await
            }
        }
    }

    fn fail(
        &self,
        ty: &TypeRef,
        error: &ApiError,
        path: Vec<PathSegment>,
        location: Location,
    ) -> Completion {
        self.record(error, path, location);
        if ty.is_non_null() {
            Err(NullPropagation)
        } else {
            Ok(Value::Null)
        }
    }

    fn record(&self, error: &ApiError, path: Vec<PathSegment>, location: Location) {
        let at = path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        if error.is_internal() {
            error!(path = %at, error = %error, "field failed");
        } else {
            debug!(path = %at, code = %error.code(), "field failed");
        }
        self.errors
            .lock()
            .push(GraphError::from_api(error, path, vec![location]));
    }

    fn collect_fields(&self, selection_sets: &[&'a SelectionSet], type_name: &str) -> GroupedFields<'a> {
        let mut grouped = Vec::new();
        let mut visited = HashSet::new();
        for selection_set in selection_sets {
            self.collect_into(selection_set, type_name, &mut grouped, &mut visited);
        }
        grouped
    }

    fn collect_into(
        &self,
        selection_set: &'a SelectionSet,
        type_name: &str,
        grouped: &mut GroupedFields<'a>,
        visited: &mut HashSet<&'a str>,
    ) {
        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    let key = field.response_key();
                    match grouped.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, fields)) => fields.push(field),
                        None => grouped.push((key, vec![field])),
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !visited.insert(spread.name.as_str()) {
                        continue;
                    }
                    if let Some(fragment) = self.fragments.get(&spread.name) {
                        if fragment.type_condition == type_name {
                            self.collect_into(&fragment.selection_set, type_name, grouped, visited);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline
                        .type_condition
                        .as_deref()
                        .map_or(true, |condition| condition == type_name);
                    if applies {
                        self.collect_into(&inline.selection_set, type_name, grouped, visited);
                    }
                }
            }
        }
    }
}
