//! Static validation of an operation against the schema
//!
//! Runs before identity resolution and cost evaluation. Every problem found
//! is reported; nothing here touches the store.

use crate::ast::{Document, InputValue, OperationDefinition, Selection, SelectionSet};
use crate::schema::{Schema, TypeKind};
use crate::variables::{coerce_input, contains_variable, resolve_value};
use gazette_core::{ApiError, GraphError, Location};
use serde_json::Map;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Validate `operation` (selected from `document`) against `schema`
pub fn validate(
    document: &Document,
    operation: &OperationDefinition,
    schema: &Schema,
) -> Result<(), Vec<GraphError>> {
    let cycles = fragment_cycles(document);
    if !cycles.is_empty() {
        debug!(cycles = cycles.len(), "fragment cycles found");
        return Err(cycles);
    }

    let mut validator = Validator {
        document,
        schema,
        errors: Vec::new(),
        used_variables: Vec::new(),
        visited_fragments: HashSet::new(),
    };

    let Some(root) = schema.root_type(operation.kind) else {
        return Err(vec![error(
            format!("Schema does not support {} operations", operation.kind),
            operation.location,
        )]);
    };

    for definition in &operation.variables {
        let named = definition.ty.named();
        match schema.type_def(named) {
            Some(def) if def.is_input() => {}
            Some(_) => validator.report(
                format!(
                    "Variable \"${}\" cannot be non-input type \"{}\".",
                    definition.name, definition.ty
                ),
                definition.location,
            ),
            None => validator.report(format!("Unknown type \"{named}\"."), definition.location),
        }
    }

    validator.selection_set(&operation.selection_set, &root.name);

    let defined: HashMap<&str, Location> = operation
        .variables
        .iter()
        .map(|d| (d.name.as_str(), d.location))
        .collect();
    let mut reported = HashSet::new();
    for (name, location) in std::mem::take(&mut validator.used_variables) {
        if !defined.contains_key(name.as_str()) && reported.insert(name.clone()) {
            validator.report(format!("Variable \"${name}\" is not defined."), location);
        }
    }
    let used: HashSet<String> = collect_used(operation, document);
    for definition in &operation.variables {
        if !used.contains(&definition.name) {
            validator.report(
                format!("Variable \"${}\" is never used.", definition.name),
                definition.location,
            );
        }
    }

    if validator.errors.is_empty() {
        Ok(())
    } else {
        debug!(errors = validator.errors.len(), "operation failed validation");
        Err(validator.errors)
    }
}

fn error(message: impl Into<String>, location: Location) -> GraphError {
    GraphError::from_api(&ApiError::invalid(message), Vec::new(), vec![location])
}

struct Validator<'a> {
    document: &'a Document,
    schema: &'a Schema,
    errors: Vec<GraphError>,
    used_variables: Vec<(String, Location)>,
    visited_fragments: HashSet<&'a str>,
}

impl<'a> Validator<'a> {
    fn report(&mut self, message: impl Into<String>, location: Location) {
        self.errors.push(error(message, location));
    }

    fn check_type_condition(&mut self, condition: &str, parent: &str, location: Location) -> bool {
        let schema = self.schema;
        match schema.type_def(condition) {
            None => {
                self.report(format!("Unknown type \"{condition}\"."), location);
                false
            }
            Some(def) if def.kind != TypeKind::Object => {
                self.report(
                    format!("Fragment cannot condition on non composite type \"{condition}\"."),
                    location,
                );
                false
            }
            Some(_) if condition != parent => {
                self.report(
                    format!(
                        "Fragment cannot be spread here as objects of type \"{parent}\" can never be of type \"{condition}\"."
                    ),
                    location,
                );
                false
            }
            Some(_) => true,
        }
    }

    fn selection_set(&mut self, selection_set: &'a SelectionSet, parent: &str) {
        let schema = self.schema;
        let document = self.document;
        let mut seen: HashMap<&str, &str> = HashMap::new();

        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    let key = field.response_key();
                    if let Some(previous) = seen.insert(key, &field.name) {
                        if previous != field.name {
                            self.report(
                                format!(
                                    "Fields \"{key}\" conflict because \"{previous}\" and \"{}\" are different fields.",
                                    field.name
                                ),
                                field.location,
                            );
                        }
                    }

                    let Some(definition) = schema.field(parent, &field.name) else {
                        self.report(
                            format!(
                                "Cannot query field \"{}\" on type \"{parent}\".",
                                field.name
                            ),
                            field.location,
                        );
                        continue;
                    };

                    for (name, value) in &field.arguments {
                        collect_variables(value, field.location, &mut self.used_variables);
                        let Some(arg) = definition.argument(name) else {
                            self.report(
                                format!(
                                    "Unknown argument \"{name}\" on field \"{parent}.{}\".",
                                    field.name
                                ),
                                field.location,
                            );
                            continue;
                        };
                        if !contains_variable(value) {
                            let literal = resolve_value(value, &Map::new());
                            if let Err(reason) = coerce_input(&literal, &arg.ty, schema) {
                                self.report(
                                    format!("Argument \"{name}\" has invalid value: {reason}."),
                                    field.location,
                                );
                            }
                        }
                    }

                    for arg in definition.args.iter().filter(|a| a.is_required()) {
                        if field.argument(&arg.name).is_none() {
                            self.report(
                                format!(
                                    "Field \"{}\" argument \"{}\" of type \"{}\" is required, but it was not provided.",
                                    field.name, arg.name, arg.ty
                                ),
                                field.location,
                            );
                        }
                    }

                    let named = definition.ty.named();
                    if schema.is_leaf(named) {
                        if !field.selection_set.is_empty() {
                            self.report(
                                format!(
                                    "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
                                    field.name, definition.ty
                                ),
                                field.location,
                            );
                        }
                    } else if field.selection_set.is_empty() {
                        self.report(
                            format!(
                                "Field \"{}\" of type \"{}\" must have a selection of subfields.",
                                field.name, definition.ty
                            ),
                            field.location,
                        );
                    } else {
                        let named = named.to_string();
                        self.selection_set(&field.selection_set, &named);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = document.fragments.get(&spread.name) else {
                        self.report(
                            format!("Unknown fragment \"{}\".", spread.name),
                            spread.location,
                        );
                        continue;
                    };
                    if self.check_type_condition(&fragment.type_condition, parent, spread.location)
                        && self.visited_fragments.insert(fragment.name.as_str())
                    {
                        self.selection_set(&fragment.selection_set, parent);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = match &inline.type_condition {
                        Some(condition) => {
                            self.check_type_condition(condition, parent, inline.location)
                        }
                        None => true,
                    };
                    if applies {
                        self.selection_set(&inline.selection_set, parent);
                    }
                }
            }
        }
    }
}

fn collect_variables(value: &InputValue, location: Location, into: &mut Vec<(String, Location)>) {
    match value {
        InputValue::Variable(name) => into.push((name.clone(), location)),
        InputValue::List(items) => items
            .iter()
            .for_each(|item| collect_variables(item, location, into)),
        InputValue::Object(fields) => fields
            .iter()
            .for_each(|(_, v)| collect_variables(v, location, into)),
        _ => {}
    }
}

/// Names of variables referenced anywhere in the operation, following
/// fragment spreads
fn collect_used(operation: &OperationDefinition, document: &Document) -> HashSet<String> {
    fn walk<'a>(
        set: &'a SelectionSet,
        document: &'a Document,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<(String, Location)>,
    ) {
        for selection in set {
            match selection {
                Selection::Field(field) => {
                    for (_, value) in &field.arguments {
                        collect_variables(value, field.location, out);
                    }
                    walk(&field.selection_set, document, seen, out);
                }
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = document.fragments.get(&spread.name) {
                        if seen.insert(fragment.name.as_str()) {
                            walk(&fragment.selection_set, document, seen, out);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    walk(&inline.selection_set, document, seen, out)
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(&operation.selection_set, document, &mut HashSet::new(), &mut out);
    out.into_iter().map(|(name, _)| name).collect()
}

fn spreads(set: &SelectionSet, out: &mut Vec<String>) {
    for selection in set {
        match selection {
            Selection::Field(field) => spreads(&field.selection_set, out),
            Selection::FragmentSpread(spread) => out.push(spread.name.clone()),
            Selection::InlineFragment(inline) => spreads(&inline.selection_set, out),
        }
    }
}

/// Report every fragment that can reach itself through spreads
fn fragment_cycles(document: &Document) -> Vec<GraphError> {
    let edges: HashMap<&str, Vec<String>> = document
        .fragments
        .iter()
        .map(|(name, fragment)| {
            let mut out = Vec::new();
            spreads(&fragment.selection_set, &mut out);
            (name.as_str(), out)
        })
        .collect();

    let mut names: Vec<&str> = edges.keys().copied().collect();
    names.sort_unstable();

    let mut errors = Vec::new();
    for start in names {
        let mut stack: Vec<&str> = vec![start];
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cyclic = false;
        while let Some(current) = stack.pop() {
            for next in edges.get(current).into_iter().flatten() {
                if next == start {
                    cyclic = true;
                    break;
                }
                if let Some((key, _)) = edges.get_key_value(next.as_str()) {
                    if seen.insert(key) {
                        stack.push(key);
                    }
                }
            }
            if cyclic {
                break;
            }
        }
        if cyclic {
            if let Some(fragment) = document.fragments.get(start) {
                errors.push(error(
                    format!("Cannot spread fragment \"{start}\" within itself."),
                    fragment.location,
                ));
            }
        }
    }
    errors
}
