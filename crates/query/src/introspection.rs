//! Answers `__schema` and `__type` from the schema definition
//!
//! Introspection never touches resolvers or the store; the requested
//! selection is projected directly over the schema.

use crate::ast::{Field, FragmentDefinition, Selection, SelectionSet};
use crate::schema::{ArgumentDef, FieldDef, Schema, TypeDef, TypeKind, TypeRef};
use crate::variables::resolve_value;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Resolve an introspection root field (`__schema` or `__type`)
pub fn resolve(
    field: &Field,
    schema: &Schema,
    fragments: &HashMap<String, FragmentDefinition>,
    variables: &Map<String, Value>,
) -> Value {
    let projector = Projector {
        schema,
        fragments,
    };
    match field.name.as_str() {
        "__schema" => projector.project(&Node::Schema, &field.selection_set),
        "__type" => {
            let name = field
                .argument("name")
                .map(|value| resolve_value(value, variables));
            match name
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|name| schema.type_def(name))
            {
                Some(def) => projector.project(&Node::Type(TypeView::Named(def)), &field.selection_set),
                None => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

#[derive(Debug, Clone, Copy)]
enum TypeView<'a> {
    Named(&'a TypeDef),
    List(&'a TypeRef),
    NonNull(&'a TypeRef),
}

#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Schema,
    Type(TypeView<'a>),
    Field(&'a FieldDef),
    InputValue(&'a ArgumentDef),
    EnumValue(&'a str),
}

enum Resolved<'a> {
    Leaf(Value),
    Node(Node<'a>),
    List(Vec<Node<'a>>),
}

impl<'a> Node<'a> {
    fn typename(&self) -> &'static str {
        match self {
            Node::Schema => "__Schema",
            Node::Type(_) => "__Type",
            Node::Field(_) => "__Field",
            Node::InputValue(_) => "__InputValue",
            Node::EnumValue(_) => "__EnumValue",
        }
    }
}

fn text(value: &Option<String>) -> Resolved<'static> {
    Resolved::Leaf(value.clone().map_or(Value::Null, Value::String))
}

fn null() -> Resolved<'static> {
    Resolved::Leaf(Value::Null)
}

struct Projector<'a> {
    schema: &'a Schema,
    fragments: &'a HashMap<String, FragmentDefinition>,
}

impl<'a> Projector<'a> {
    fn type_view(&self, ty: &'a TypeRef) -> Resolved<'a> {
        match ty {
            TypeRef::Named(name) => match self.schema.type_def(name) {
                Some(def) => Resolved::Node(Node::Type(TypeView::Named(def))),
                None => null(),
            },
            TypeRef::List(inner) => Resolved::Node(Node::Type(TypeView::List(inner))),
            TypeRef::NonNull(inner) => Resolved::Node(Node::Type(TypeView::NonNull(inner))),
        }
    }

    fn named(&self, name: Option<&str>) -> Resolved<'a> {
        match name.and_then(|name| self.schema.type_def(name)) {
            Some(def) => Resolved::Node(Node::Type(TypeView::Named(def))),
            None => null(),
        }
    }

    fn field(&self, node: &Node<'a>, name: &str) -> Resolved<'a> {
        match *node {
            Node::Schema => match name {
                "types" => Resolved::List(
                    self.schema
                        .types()
                        .map(|def| Node::Type(TypeView::Named(def)))
                        .collect(),
                ),
                "queryType" => self.named(Some(self.schema.query_type())),
                "mutationType" => self.named(self.schema.mutation_type()),
                "directives" => Resolved::List(Vec::new()),
                _ => null(),
            },
            Node::Type(TypeView::Named(def)) => match name {
                "kind" => Resolved::Leaf(Value::from(def.kind.as_str())),
                "name" => Resolved::Leaf(Value::from(def.name.as_str())),
                "description" => text(&def.description),
                "fields" if def.kind == TypeKind::Object => {
                    Resolved::List(def.fields.iter().map(Node::Field).collect())
                }
                "interfaces" if def.kind == TypeKind::Object => Resolved::List(Vec::new()),
                "enumValues" if def.kind == TypeKind::Enum => Resolved::List(
                    def.enum_values
                        .iter()
                        .map(|v| Node::EnumValue(v.as_str()))
                        .collect(),
                ),
                "inputFields" if def.kind == TypeKind::InputObject => {
                    Resolved::List(def.input_fields.iter().map(Node::InputValue).collect())
                }
                _ => null(),
            },
            Node::Type(TypeView::List(inner)) => match name {
                "kind" => Resolved::Leaf(Value::from("LIST")),
                "ofType" => self.type_view(inner),
                _ => null(),
            },
            Node::Type(TypeView::NonNull(inner)) => match name {
                "kind" => Resolved::Leaf(Value::from("NON_NULL")),
                "ofType" => self.type_view(inner),
                _ => null(),
            },
            Node::Field(def) => match name {
                "name" => Resolved::Leaf(Value::from(def.name.as_str())),
                "description" => text(&def.description),
                "args" => Resolved::List(def.args.iter().map(Node::InputValue).collect()),
                "type" => self.type_view(&def.ty),
                "isDeprecated" => Resolved::Leaf(Value::Bool(false)),
                _ => null(),
            },
            Node::InputValue(def) => match name {
                "name" => Resolved::Leaf(Value::from(def.name.as_str())),
                "description" => text(&def.description),
                "type" => self.type_view(&def.ty),
                "defaultValue" => Resolved::Leaf(
                    def.default_value
                        .as_ref()
                        .map_or(Value::Null, |v| Value::String(v.to_string())),
                ),
                _ => null(),
            },
            Node::EnumValue(value) => match name {
                "name" => Resolved::Leaf(Value::from(value)),
                "isDeprecated" => Resolved::Leaf(Value::Bool(false)),
                _ => null(),
            },
        }
    }

    fn collect<'s>(
        &self,
        node: &Node<'a>,
        selection_set: &'s SelectionSet,
        out: &mut Vec<&'s Field>,
        depth: usize,
    ) where
        'a: 's,
    {
        if depth > crate::parser::MAX_NESTING {
            return;
        }
        for selection in selection_set {
            match selection {
                Selection::Field(field) => out.push(field),
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = self.fragments.get(&spread.name) {
                        if fragment.type_condition == node.typename() {
                            self.collect(node, &fragment.selection_set, out, depth + 1);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline
                        .type_condition
                        .as_deref()
                        .map_or(true, |t| t == node.typename());
                    if applies {
                        self.collect(node, &inline.selection_set, out, depth + 1);
                    }
                }
            }
        }
    }

    fn project<'s>(&self, node: &Node<'a>, selection_set: &'s SelectionSet) -> Value
    where
        'a: 's,
    {
        let mut fields = Vec::new();
        self.collect(node, selection_set, &mut fields, 0);

        let mut object = Map::new();
        for field in fields {
            let key = field.response_key();
            if object.contains_key(key) {
                continue;
            }
            let value = if field.name == "__typename" {
                Value::from(node.typename())
            } else {
                match self.field(node, &field.name) {
                    Resolved::Leaf(value) => value,
                    Resolved::Node(child) => self.project(&child, &field.selection_set),
                    Resolved::List(children) => Value::Array(
                        children
                            .iter()
                            .map(|child| self.project(child, &field.selection_set))
                            .collect(),
                    ),
                }
            };
            object.insert(key.to_string(), value);
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn introspect(source: &str, variables: Value) -> Value {
        let schema = Schema::content_api();
        let doc = parse(source).unwrap();
        let op = doc.operation(None).unwrap();
        let Selection::Field(field) = &op.selection_set[0] else {
            panic!("expected field");
        };
        let vars = variables.as_object().cloned().unwrap_or_default();
        resolve(field, &schema, &doc.fragments, &vars)
    }

    #[test]
    fn test_schema_roots() {
        let value = introspect(
            "{ __schema { queryType { name } mutationType { name } subscriptionType { name } } }",
            json!({}),
        );
        assert_eq!(
            value,
            json!({
                "queryType": {"name": "Query"},
                "mutationType": {"name": "Mutation"},
                "subscriptionType": null
            })
        );
    }

    #[test]
    fn test_types_include_content_and_meta_types() {
        let value = introspect("{ __schema { types { name kind } } }", json!({}));
        let names: Vec<&str> = value["types"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        for expected in ["Post", "User", "Comment", "PostInput", "String", "__Type"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_type_wrappers() {
        let value = introspect(
            "query ($n: String!) { __type(name: $n) { name fields { name type { kind ofType { kind ofType { name } } } } } }",
            json!({"n": "Query"}),
        );
        let posts = value["fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == "posts")
            .unwrap();
        assert_eq!(
            posts["type"],
            json!({"kind": "NON_NULL", "ofType": {"kind": "LIST", "ofType": {"name": null}}})
        );
    }

    #[test]
    fn test_unknown_type_is_null() {
        assert_eq!(introspect("{ __type(name: \"Nope\") { name } }", json!({})), Value::Null);
    }

    #[test]
    fn test_fragments_and_typename() {
        let value = introspect(
            "{ __type(name: \"PostInput\") { __typename ...T } } fragment T on __Type { kind inputFields { name defaultValue } }",
            json!({}),
        );
        assert_eq!(value["__typename"], "__Type");
        assert_eq!(value["kind"], "INPUT_OBJECT");
        assert_eq!(value["inputFields"][2], json!({"name": "published", "defaultValue": "false"}));
    }
}
