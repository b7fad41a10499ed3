//! Operation documents for gazette
//!
//! Parses the GraphQL subset gazette accepts, validates it against the fixed
//! content schema, coerces variables and arguments, and estimates the static
//! cost of an operation before anything executes.

pub mod ast;
pub mod cost;
pub mod introspection;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod validation;
pub mod variables;

pub use ast::{
    Document, Field, FragmentDefinition, InputValue, OperationDefinition, OperationKind,
    Selection, SelectionSet,
};
pub use cost::{accept, estimate, CostEstimate, CostPolicy, IntrospectionPolicy};
pub use parser::{parse, ParseError};
pub use schema::{ArgumentDef, FieldDef, Schema, TypeDef, TypeKind, TypeRef};
pub use validation::validate;
pub use variables::{coerce_arguments, coerce_input, coerce_variables, resolve_value};
