//! Syntax tree of an operation document

use gazette_core::{ApiError, Location};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed document: its operations and named fragments
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: HashMap<String, FragmentDefinition>,
}

impl Document {
    /// Pick the operation to run.
    ///
    /// Without a name the document must hold exactly one operation.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, ApiError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| ApiError::malformed(format!("Unknown operation named '{name}'"), None)),
            None => match self.operations.as_slice() {
                [only] => Ok(only),
                [] => Err(ApiError::malformed("Document contains no operations", None)),
                _ => Err(ApiError::malformed(
                    "Document contains several operations; operationName is required",
                    None,
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeAnnotation,
    pub default_value: Option<InputValue>,
    pub location: Location,
}

/// A type written in a variable definition, e.g. `[ID!]!`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotation {
    Named(String),
    List(Box<TypeAnnotation>),
    NonNull(Box<TypeAnnotation>),
}

impl TypeAnnotation {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeAnnotation::NonNull(_))
    }

    pub fn named(&self) -> &str {
        match self {
            TypeAnnotation::Named(name) => name,
            TypeAnnotation::List(inner) | TypeAnnotation::NonNull(inner) => inner.named(),
        }
    }
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAnnotation::Named(name) => f.write_str(name),
            TypeAnnotation::List(inner) => write!(f, "[{inner}]"),
            TypeAnnotation::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

pub type SelectionSet = Vec<Selection>;

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub selection_set: SelectionSet,
    pub location: Location,
}

impl Field {
    /// The key this field occupies in the response object
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub selection_set: SelectionSet,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: SelectionSet,
    pub location: Location,
}

/// A literal or variable reference in argument position
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}
