//! Input coercion for variables and field arguments

use crate::ast::{Field, InputValue, OperationDefinition};
use crate::schema::{FieldDef, Schema, TypeKind, TypeRef};
use gazette_core::ApiError;
use serde_json::{Map, Number, Value};

/// Turn an argument literal into JSON, substituting variables.
///
/// A reference to a variable that was not supplied becomes `null`.
pub fn resolve_value(value: &InputValue, variables: &Map<String, Value>) -> Value {
    match value {
        InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        InputValue::Int(v) => Value::from(*v),
        InputValue::Float(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
        InputValue::Boolean(b) => Value::Bool(*b),
        InputValue::Null => Value::Null,
        InputValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, variables))
                .collect(),
        ),
        InputValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), resolve_value(value, variables)))
                .collect(),
        ),
    }
}

/// Whether a literal references any variable
pub fn contains_variable(value: &InputValue) -> bool {
    match value {
        InputValue::Variable(_) => true,
        InputValue::List(items) => items.iter().any(contains_variable),
        InputValue::Object(fields) => fields.iter().any(|(_, v)| contains_variable(v)),
        _ => false,
    }
}

/// Coerce a JSON value to an input type.
///
/// The error is a human readable reason, without the name of the value.
pub fn coerce_input(value: &Value, ty: &TypeRef, schema: &Schema) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                Err(format!("Expected non-null value of type \"{ty}\""))
            } else {
                coerce_input(value, inner, schema)
            }
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input(item, inner, schema))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_input(single, inner, schema)?])),
        },
        TypeRef::Named(name) => {
            let def = schema
                .type_def(name)
                .ok_or_else(|| format!("Unknown type \"{name}\""))?;
            match def.kind {
                TypeKind::Scalar => coerce_scalar(name, value),
                TypeKind::Enum => match value.as_str() {
                    Some(v) if def.enum_values.iter().any(|e| e == v) => Ok(value.clone()),
                    _ => Err(format!("Expected a value of enum \"{name}\"")),
                },
                TypeKind::InputObject => {
                    let Value::Object(provided) = value else {
                        return Err(format!("Expected an object of type \"{name}\""));
                    };
                    if let Some(unknown) = provided.keys().find(|k| def.input_field(k).is_none()) {
                        return Err(format!(
                            "Field \"{unknown}\" is not defined by type \"{name}\""
                        ));
                    }
                    let mut coerced = Map::new();
                    for field in &def.input_fields {
                        match provided.get(&field.name) {
                            Some(v) => {
                                let v = coerce_input(v, &field.ty, schema).map_err(|reason| {
                                    format!("In field \"{}\": {reason}", field.name)
                                })?;
                                coerced.insert(field.name.clone(), v);
                            }
                            None => {
                                if let Some(default) = &field.default_value {
                                    coerced.insert(field.name.clone(), default.clone());
                                } else if field.ty.is_non_null() {
                                    return Err(format!(
                                        "Field \"{}\" of required type \"{}\" was not provided",
                                        field.name, field.ty
                                    ));
                                }
                            }
                        }
                    }
                    Ok(Value::Object(coerced))
                }
                TypeKind::Object => Err(format!("\"{name}\" is not an input type")),
            }
        }
    }
}

fn coerce_scalar(name: &str, value: &Value) -> Result<Value, String> {
    let coerced = match name {
        "Int" => value
            .as_i64()
            .filter(|v| i32::try_from(*v).is_ok())
            .map(Value::from),
        "Float" => value.as_f64().and_then(Number::from_f64).map(Value::Number),
        "String" => value.as_str().map(|_| value.clone()),
        "Boolean" => value.as_bool().map(Value::Bool),
        "ID" => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::String(n.to_string())),
            _ => None,
        },
        _ => Some(value.clone()),
    };
    coerced.ok_or_else(|| format!("{name} cannot represent {value}"))
}

/// Coerce the request's variables against the operation's definitions.
///
/// Variables that are neither supplied nor defaulted are left out, so that
/// arguments referencing them count as not provided.
pub fn coerce_variables(
    operation: &OperationDefinition,
    schema: &Schema,
    provided: Option<&Map<String, Value>>,
) -> Result<Map<String, Value>, ApiError> {
    let empty = Map::new();
    let provided = provided.unwrap_or(&empty);
    let mut coerced = Map::new();

    for definition in &operation.variables {
        let ty = TypeRef::from(&definition.ty);
        let value = match provided.get(&definition.name) {
            Some(value) => value.clone(),
            None => match &definition.default_value {
                Some(default) => resolve_value(default, &empty),
                None if ty.is_non_null() => {
                    return Err(ApiError::invalid(format!(
                        "Variable \"${}\" of required type \"{ty}\" was not provided",
                        definition.name
                    )))
                }
                None => continue,
            },
        };
        let value = coerce_input(&value, &ty, schema).map_err(|reason| {
            ApiError::invalid(format!(
                "Variable \"${}\" got invalid value: {reason}",
                definition.name
            ))
        })?;
        coerced.insert(definition.name.clone(), value);
    }

    Ok(coerced)
}

/// Coerce the arguments given to `field` against its definition, applying
/// defaults. Absent optional arguments are left out of the map.
pub fn coerce_arguments(
    definition: &FieldDef,
    field: &Field,
    variables: &Map<String, Value>,
    schema: &Schema,
) -> Result<Map<String, Value>, ApiError> {
    let mut coerced = Map::new();

    for arg in &definition.args {
        let supplied = match field.argument(&arg.name) {
            Some(InputValue::Variable(var)) if !variables.contains_key(var) => None,
            Some(value) => Some(resolve_value(value, variables)),
            None => None,
        };
        match supplied {
            Some(value) => {
                let value = coerce_input(&value, &arg.ty, schema).map_err(|reason| {
                    ApiError::invalid(format!(
                        "Argument \"{}\" has invalid value: {reason}",
                        arg.name
                    ))
                })?;
                coerced.insert(arg.name.clone(), value);
            }
            None => {
                if let Some(default) = &arg.default_value {
                    coerced.insert(arg.name.clone(), default.clone());
                } else if arg.ty.is_non_null() {
                    return Err(ApiError::invalid(format!(
                        "Argument \"{}\" of required type \"{}\" was not provided",
                        arg.name, arg.ty
                    )));
                }
            }
        }
    }

    Ok(coerced)
}
