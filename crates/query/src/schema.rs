//! The fixed schema contract of the content API
//!
//! The schema is declared in code rather than parsed from SDL. It drives
//! validation, cost estimation, argument coercion and introspection.

use crate::ast::{OperationKind, TypeAnnotation};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Reference to a type from a field, argument or input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Read the notation used in declarations, e.g. `[Post!]!`
    pub fn parse(notation: &str) -> Self {
        let notation = notation.trim();
        if let Some(inner) = notation.strip_suffix('!') {
            return TypeRef::NonNull(Box::new(TypeRef::parse(inner)));
        }
        if let Some(inner) = notation
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return TypeRef::List(Box::new(TypeRef::parse(inner)));
        }
        TypeRef::Named(notation.to_string())
    }

    /// Innermost named type
    pub fn named(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// The type with an outer non-null wrapper removed
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    /// Whether values of this type are lists (ignoring non-null)
    pub fn is_list(&self) -> bool {
        matches!(self.nullable(), TypeRef::List(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

impl From<&TypeAnnotation> for TypeRef {
    fn from(annotation: &TypeAnnotation) -> Self {
        match annotation {
            TypeAnnotation::Named(name) => TypeRef::Named(name.clone()),
            TypeAnnotation::List(inner) => TypeRef::List(Box::new(TypeRef::from(inner.as_ref()))),
            TypeAnnotation::NonNull(inner) => {
                TypeRef::NonNull(Box::new(TypeRef::from(inner.as_ref())))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Object,
    Enum,
    InputObject,
}

impl TypeKind {
    /// Name of the kind as reported by introspection
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Scalar => "SCALAR",
            TypeKind::Object => "OBJECT",
            TypeKind::Enum => "ENUM",
            TypeKind::InputObject => "INPUT_OBJECT",
        }
    }
}

/// An argument or input-object field
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDef {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub default_value: Option<Value>,
}

impl ArgumentDef {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: TypeRef::parse(ty),
            description: None,
            default_value: None,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Whether leaving this argument out is an error
    pub fn is_required(&self) -> bool {
        self.ty.is_non_null() && self.default_value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
    pub args: Vec<ArgumentDef>,
}

impl FieldDef {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: TypeRef::parse(ty),
            description: None,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, name: &str, ty: &str) -> Self {
        self.args.push(ArgumentDef::new(name, ty));
        self
    }

    #[must_use]
    pub fn arg_with_default(mut self, name: &str, ty: &str, default: Value) -> Self {
        self.args.push(ArgumentDef::new(name, ty).default_value(default));
        self
    }

    #[must_use]
    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|arg| arg.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub input_fields: Vec<ArgumentDef>,
    pub enum_values: Vec<String>,
}

impl TypeDef {
    fn empty(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: None,
            fields: Vec::new(),
            input_fields: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn scalar(name: &str, description: &str) -> Self {
        let mut def = Self::empty(name, TypeKind::Scalar);
        def.description = Some(description.to_string());
        def
    }

    pub fn object(name: &str, fields: Vec<FieldDef>) -> Self {
        let mut def = Self::empty(name, TypeKind::Object);
        def.fields = fields;
        def
    }

    pub fn input(name: &str, fields: Vec<ArgumentDef>) -> Self {
        let mut def = Self::empty(name, TypeKind::InputObject);
        def.input_fields = fields;
        def
    }

    pub fn enumeration(name: &str, values: &[&str]) -> Self {
        let mut def = Self::empty(name, TypeKind::Enum);
        def.enum_values = values.iter().map(|v| v.to_string()).collect();
        def
    }

    #[must_use]
    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn input_field(&self, name: &str) -> Option<&ArgumentDef> {
        self.input_fields.iter().find(|field| field.name == name)
    }

    /// Scalars and enums have no subfields
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar | TypeKind::Enum)
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Scalar | TypeKind::Enum | TypeKind::InputObject
        )
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
    query_type: String,
    mutation_type: Option<String>,
    typename_field: FieldDef,
    meta_fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(query_type: &str, mutation_type: Option<&str>, types: Vec<TypeDef>) -> Self {
        let mut all: BTreeMap<String, TypeDef> = types
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        for def in builtin_scalars().into_iter().chain(meta_types()) {
            all.entry(def.name.clone()).or_insert(def);
        }
        Self {
            types: all,
            query_type: query_type.to_string(),
            mutation_type: mutation_type.map(str::to_string),
            typename_field: FieldDef::new("__typename", "String!")
                .describe("The name of the current object type"),
            meta_fields: vec![
                FieldDef::new("__schema", "__Schema!")
                    .describe("Access the current type schema of this server"),
                FieldDef::new("__type", "__Type")
                    .arg("name", "String!")
                    .describe("Request the type information of a single type"),
            ],
        }
    }

    /// The users/posts/comments schema served by gazette
    pub fn content_api() -> Self {
        let page = |field: FieldDef| field.arg("limit", "Int").arg("offset", "Int");

        let query = TypeDef::object(
            "Query",
            vec![
                FieldDef::new("me", "User").describe("The authenticated viewer, if any"),
                FieldDef::new("user", "User").arg("id", "ID!"),
                page(FieldDef::new("users", "[User!]!")),
                FieldDef::new("post", "Post").arg("id", "ID!"),
                page(FieldDef::new("posts", "[Post!]!"))
                    .arg("authorId", "ID")
                    .arg("published", "Boolean")
                    .describe("Posts, newest first"),
                FieldDef::new("postCount", "Int!")
                    .arg("authorId", "ID")
                    .arg("published", "Boolean"),
                page(FieldDef::new("comments", "[Comment!]!").arg("postId", "ID!"))
                    .describe("Comments on a post, oldest first"),
                FieldDef::new("cacheStats", "CacheStats!")
                    .describe("Response cache counters (admin only)"),
            ],
        );

        let mutation = TypeDef::object(
            "Mutation",
            vec![
                FieldDef::new("register", "AuthPayload!").arg("input", "RegisterInput!"),
                FieldDef::new("login", "AuthPayload!")
                    .arg("email", "String!")
                    .arg("password", "String!"),
                FieldDef::new("refreshToken", "AccessPayload!").arg("refreshToken", "String!"),
                FieldDef::new("logout", "Boolean!")
                    .describe("Revoke every credential issued to the viewer"),
                FieldDef::new("changePassword", "Boolean!")
                    .arg("currentPassword", "String!")
                    .arg("newPassword", "String!"),
                FieldDef::new("requestEmailVerification", "Boolean!"),
                FieldDef::new("verifyEmail", "User!").arg("token", "String!"),
                FieldDef::new("requestPasswordReset", "Boolean!").arg("email", "String!"),
                FieldDef::new("resetPassword", "Boolean!")
                    .arg("token", "String!")
                    .arg("newPassword", "String!"),
                FieldDef::new("updateProfile", "User!")
                    .arg("username", "String")
                    .arg("email", "String"),
                FieldDef::new("setUserRole", "User!")
                    .arg("id", "ID!")
                    .arg("role", "String!"),
                FieldDef::new("deleteUser", "Boolean!").arg("id", "ID!"),
                FieldDef::new("createPost", "Post!").arg("input", "PostInput!"),
                FieldDef::new("updatePost", "Post!")
                    .arg("id", "ID!")
                    .arg("input", "PostUpdateInput!"),
                FieldDef::new("publishPost", "Post!")
                    .arg("id", "ID!")
                    .arg("published", "Boolean!"),
                FieldDef::new("deletePost", "Boolean!").arg("id", "ID!"),
                FieldDef::new("createComment", "Comment!")
                    .arg("postId", "ID!")
                    .arg("body", "String!"),
                FieldDef::new("updateComment", "Comment!")
                    .arg("id", "ID!")
                    .arg("body", "String!"),
                FieldDef::new("deleteComment", "Boolean!").arg("id", "ID!"),
                FieldDef::new("invalidateCache", "Int!")
                    .arg("operationName", "String")
                    .arg("pattern", "String")
                    .describe("Drop cached responses; returns the number of entries removed"),
            ],
        );

        let user = TypeDef::object(
            "User",
            vec![
                FieldDef::new("id", "ID!"),
                FieldDef::new("username", "String!"),
                FieldDef::new("email", "String")
                    .describe("Visible to the user themself and to admins"),
                FieldDef::new("role", "String!"),
                FieldDef::new("emailVerified", "Boolean!"),
                FieldDef::new("createdAt", "String!"),
                FieldDef::new("updatedAt", "String!"),
                page(FieldDef::new("posts", "[Post!]!")),
            ],
        );

        let post = TypeDef::object(
            "Post",
            vec![
                FieldDef::new("id", "ID!"),
                FieldDef::new("title", "String!"),
                FieldDef::new("body", "String!"),
                FieldDef::new("published", "Boolean!"),
                FieldDef::new("author", "User"),
                FieldDef::new("commentCount", "Int!"),
                page(FieldDef::new("comments", "[Comment!]!")),
                FieldDef::new("createdAt", "String!"),
                FieldDef::new("updatedAt", "String!"),
                FieldDef::new("publishedAt", "String"),
            ],
        );

        let comment = TypeDef::object(
            "Comment",
            vec![
                FieldDef::new("id", "ID!"),
                FieldDef::new("body", "String!"),
                FieldDef::new("author", "User"),
                FieldDef::new("post", "Post"),
                FieldDef::new("createdAt", "String!"),
                FieldDef::new("updatedAt", "String!"),
            ],
        );

        let auth_payload = TypeDef::object(
            "AuthPayload",
            vec![
                FieldDef::new("user", "User!"),
                FieldDef::new("accessToken", "String!"),
                FieldDef::new("refreshToken", "String!"),
            ],
        );
        let access_payload =
            TypeDef::object("AccessPayload", vec![FieldDef::new("accessToken", "String!")]);
        let cache_stats = TypeDef::object(
            "CacheStats",
            vec![
                FieldDef::new("hits", "Int!"),
                FieldDef::new("misses", "Int!"),
                FieldDef::new("stores", "Int!"),
                FieldDef::new("skipped", "Int!"),
                FieldDef::new("errors", "Int!"),
            ],
        );

        let register_input = TypeDef::input(
            "RegisterInput",
            vec![
                ArgumentDef::new("username", "String!"),
                ArgumentDef::new("email", "String!"),
                ArgumentDef::new("password", "String!"),
            ],
        );
        let post_input = TypeDef::input(
            "PostInput",
            vec![
                ArgumentDef::new("title", "String!"),
                ArgumentDef::new("body", "String!"),
                ArgumentDef::new("published", "Boolean").default_value(Value::Bool(false)),
            ],
        );
        let post_update_input = TypeDef::input(
            "PostUpdateInput",
            vec![
                ArgumentDef::new("title", "String"),
                ArgumentDef::new("body", "String"),
            ],
        );

        Schema::new(
            "Query",
            Some("Mutation"),
            vec![
                query,
                mutation,
                user,
                post,
                comment,
                auth_payload,
                access_payload,
                cache_stats,
                register_input,
                post_input,
                post_update_input,
            ],
        )
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    /// Root object type for an operation kind
    pub fn root_type(&self, kind: OperationKind) -> Option<&TypeDef> {
        match kind {
            OperationKind::Query => self.type_def(&self.query_type),
            OperationKind::Mutation => self
                .mutation_type
                .as_deref()
                .and_then(|name| self.type_def(name)),
        }
    }

    /// Look up a selectable field, including `__typename` on every object
    /// type and `__schema`/`__type` on the query root
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        let def = self.type_def(type_name)?;
        if def.kind != TypeKind::Object {
            return None;
        }
        if field_name == "__typename" {
            return Some(&self.typename_field);
        }
        if type_name == self.query_type {
            if let Some(meta) = self.meta_fields.iter().find(|f| f.name == field_name) {
                return Some(meta);
            }
        }
        def.field(field_name)
    }

    pub fn is_leaf(&self, type_name: &str) -> bool {
        self.type_def(type_name).is_some_and(TypeDef::is_leaf)
    }

    /// Whether `name` is one of the introspection root fields
    pub fn is_introspection_field(name: &str) -> bool {
        matches!(name, "__schema" | "__type")
    }
}

fn builtin_scalars() -> Vec<TypeDef> {
    vec![
        TypeDef::scalar("ID", "A unique identifier, serialized as a string"),
        TypeDef::scalar("String", "UTF-8 character sequence"),
        TypeDef::scalar("Int", "Signed 32-bit integer"),
        TypeDef::scalar("Float", "Double-precision floating point value"),
        TypeDef::scalar("Boolean", "true or false"),
    ]
}

fn meta_types() -> Vec<TypeDef> {
    vec![
        TypeDef::object(
            "__Schema",
            vec![
                FieldDef::new("description", "String"),
                FieldDef::new("types", "[__Type!]!"),
                FieldDef::new("queryType", "__Type!"),
                FieldDef::new("mutationType", "__Type"),
                FieldDef::new("subscriptionType", "__Type"),
                FieldDef::new("directives", "[__Directive!]!"),
            ],
        ),
        TypeDef::object(
            "__Type",
            vec![
                FieldDef::new("kind", "__TypeKind!"),
                FieldDef::new("name", "String"),
                FieldDef::new("description", "String"),
                FieldDef::new("specifiedByURL", "String"),
                FieldDef::new("fields", "[__Field!]").arg_with_default(
                    "includeDeprecated",
                    "Boolean",
                    Value::Bool(false),
                ),
                FieldDef::new("interfaces", "[__Type!]"),
                FieldDef::new("possibleTypes", "[__Type!]"),
                FieldDef::new("enumValues", "[__EnumValue!]").arg_with_default(
                    "includeDeprecated",
                    "Boolean",
                    Value::Bool(false),
                ),
                FieldDef::new("inputFields", "[__InputValue!]"),
                FieldDef::new("ofType", "__Type"),
            ],
        ),
        TypeDef::object(
            "__Field",
            vec![
                FieldDef::new("name", "String!"),
                FieldDef::new("description", "String"),
                FieldDef::new("args", "[__InputValue!]!"),
                FieldDef::new("type", "__Type!"),
                FieldDef::new("isDeprecated", "Boolean!"),
                FieldDef::new("deprecationReason", "String"),
            ],
        ),
        TypeDef::object(
            "__InputValue",
            vec![
                FieldDef::new("name", "String!"),
                FieldDef::new("description", "String"),
                FieldDef::new("type", "__Type!"),
                FieldDef::new("defaultValue", "String"),
            ],
        ),
        TypeDef::object(
            "__EnumValue",
            vec![
                FieldDef::new("name", "String!"),
                FieldDef::new("description", "String"),
                FieldDef::new("isDeprecated", "Boolean!"),
                FieldDef::new("deprecationReason", "String"),
            ],
        ),
        TypeDef::object(
            "__Directive",
            vec![
                FieldDef::new("name", "String!"),
                FieldDef::new("description", "String"),
                FieldDef::new("locations", "[String!]!"),
                FieldDef::new("args", "[__InputValue!]!"),
            ],
        ),
        TypeDef::enumeration(
            "__TypeKind",
            &[
                "SCALAR",
                "OBJECT",
                "INTERFACE",
                "UNION",
                "ENUM",
                "INPUT_OBJECT",
                "LIST",
                "NON_NULL",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_notation() {
        let ty = TypeRef::parse("[Post!]!");
        assert!(ty.is_non_null());
        assert!(ty.is_list());
        assert_eq!(ty.named(), "Post");
        assert_eq!(ty.to_string(), "[Post!]!");
        assert!(!TypeRef::parse("User").is_list());
    }

    #[test]
    fn test_content_schema_roots() {
        let schema = Schema::content_api();
        assert_eq!(
            schema.root_type(OperationKind::Query).map(|t| t.name.as_str()),
            Some("Query")
        );
        assert_eq!(
            schema
                .root_type(OperationKind::Mutation)
                .map(|t| t.name.as_str()),
            Some("Mutation")
        );
    }

    #[test]
    fn test_field_lookup() {
        let schema = Schema::content_api();
        let posts = schema.field("Query", "posts").unwrap();
        assert_eq!(posts.ty.to_string(), "[Post!]!");
        assert!(posts.argument("limit").is_some());
        assert!(!posts.argument("limit").unwrap().is_required());
        assert!(schema.field("Query", "post").unwrap().args[0].is_required());

        assert!(schema.field("Post", "__typename").is_some());
        assert!(schema.field("Query", "__schema").is_some());
        assert!(schema.field("Post", "__schema").is_none());
        assert!(schema.field("Post", "nope").is_none());
        assert!(schema.field("String", "length").is_none());
    }

    #[test]
    fn test_leaf_and_input_types() {
        let schema = Schema::content_api();
        assert!(schema.is_leaf("String"));
        assert!(schema.is_leaf("__TypeKind"));
        assert!(!schema.is_leaf("User"));
        assert!(schema.type_def("PostInput").unwrap().is_input());
        assert!(!schema.type_def("Post").unwrap().is_input());
    }
}
