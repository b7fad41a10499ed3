//! Recursive-descent parser for the supported operation language
//!
//! Accepted: queries and mutations (named or shorthand), variables with
//! defaults, aliases, arguments, named fragments and inline fragments.
//! Directives and subscriptions are rejected.

use crate::ast::{
    Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, InputValue,
    OperationDefinition, OperationKind, Selection, SelectionSet, TypeAnnotation,
    VariableDefinition,
};
use crate::lexer::{tokenize, Spanned, Token};
use gazette_core::{ApiError, Location};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Selection sets and literal lists/objects may nest at most this deep
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Syntax error: {message} ({}:{})", location.line, location.column)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(error: ParseError) -> Self {
        ApiError::malformed(format!("Syntax error: {}", error.message), Some(error.location))
    }
}

/// Parse an operation document
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let parsed = tokenize(source).and_then(|tokens| {
        Parser {
            tokens,
            pos: 0,
            nesting: 0,
        }
        .document()
    });
    match &parsed {
        Ok(document) => trace!(
            operations = document.operations.len(),
            fragments = document.fragments.len(),
            "parsed document"
        ),
        Err(error) => debug!(
            line = error.location.line,
            column = error.location.column,
            message = %error.message,
            "document rejected by parser"
        ),
    }
    parsed
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.location)
            .unwrap_or(Location { line: 1, column: 1 })
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> ParseError {
        ParseError::new(format!("Unexpected {}", self.peek().describe()), self.location())
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(
                format!(
                    "Expected {}, found {}",
                    expected.describe(),
                    self.peek().describe()
                ),
                self.location(),
            ))
        }
    }

    fn skip_if(&mut self, token: Token) -> bool {
        if *self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::new(
                format!("Expected Name, found {}", self.peek().describe()),
                self.location(),
            )),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(name) if name == keyword)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(ParseError::new(
                format!("Document nesting exceeds {MAX_NESTING} levels"),
                self.location(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn reject_directives(&self) -> Result<(), ParseError> {
        if *self.peek() == Token::At {
            return Err(ParseError::new("Directives are not supported", self.location()));
        }
        Ok(())
    }

    fn document(mut self) -> Result<Document, ParseError> {
        let mut operations: Vec<OperationDefinition> = Vec::new();
        let mut fragments: HashMap<String, FragmentDefinition> = HashMap::new();
        let mut operation_names = HashSet::new();

        if *self.peek() == Token::Eof {
            return Err(ParseError::new("Document is empty", self.location()));
        }

        while *self.peek() != Token::Eof {
            let location = self.location();
            match self.peek() {
                Token::LBrace => operations.push(self.shorthand_query()?),
                Token::Name(keyword) => match keyword.as_str() {
                    "query" | "mutation" => {
                        let operation = self.operation()?;
                        if let Some(name) = &operation.name {
                            if !operation_names.insert(name.clone()) {
                                return Err(ParseError::new(
                                    format!("There can be only one operation named \"{name}\""),
                                    location,
                                ));
                            }
                        }
                        operations.push(operation);
                    }
                    "fragment" => {
                        let fragment = self.fragment()?;
                        if fragments.contains_key(&fragment.name) {
                            return Err(ParseError::new(
                                format!(
                                    "There can be only one fragment named \"{}\"",
                                    fragment.name
                                ),
                                location,
                            ));
                        }
                        fragments.insert(fragment.name.clone(), fragment);
                    }
                    "subscription" => {
                        return Err(ParseError::new("Subscriptions are not supported", location))
                    }
                    _ => return Err(self.unexpected()),
                },
                _ => return Err(self.unexpected()),
            }
        }

        if operations.len() > 1 {
            if let Some(anonymous) = operations.iter().find(|op| op.name.is_none()) {
                return Err(ParseError::new(
                    "An anonymous operation must be the only operation in the document",
                    anonymous.location,
                ));
            }
        }

        Ok(Document {
            operations,
            fragments,
        })
    }

    fn shorthand_query(&mut self) -> Result<OperationDefinition, ParseError> {
        let location = self.location();
        let selection_set = self.selection_set()?;
        Ok(OperationDefinition {
            kind: OperationKind::Query,
            name: None,
            variables: Vec::new(),
            selection_set,
            location,
        })
    }

    fn operation(&mut self) -> Result<OperationDefinition, ParseError> {
        let location = self.location();
        let kind = match self.name()?.as_str() {
            "mutation" => OperationKind::Mutation,
            _ => OperationKind::Query,
        };
        let name = match self.peek() {
            Token::Name(_) => Some(self.name()?),
            _ => None,
        };
        let variables = if *self.peek() == Token::LParen {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        self.reject_directives()?;
        let selection_set = self.selection_set()?;
        Ok(OperationDefinition {
            kind,
            name,
            variables,
            selection_set,
            location,
        })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, ParseError> {
        self.expect(Token::LParen)?;
        let mut definitions: Vec<VariableDefinition> = Vec::new();
        loop {
            let location = self.location();
            self.expect(Token::Dollar)?;
            let name = self.name()?;
            if definitions.iter().any(|d| d.name == name) {
                return Err(ParseError::new(
                    format!("There can be only one variable named \"${name}\""),
                    location,
                ));
            }
            self.expect(Token::Colon)?;
            let ty = self.type_annotation()?;
            let default_value = if self.skip_if(Token::Equals) {
                Some(self.value(true)?)
            } else {
                None
            };
            self.reject_directives()?;
            definitions.push(VariableDefinition {
                name,
                ty,
                default_value,
                location,
            });
            if self.skip_if(Token::RParen) {
                return Ok(definitions);
            }
        }
    }

    fn type_annotation(&mut self) -> Result<TypeAnnotation, ParseError> {
        self.enter()?;
        let inner = if self.skip_if(Token::LBracket) {
            let item = self.type_annotation()?;
            self.expect(Token::RBracket)?;
            TypeAnnotation::List(Box::new(item))
        } else {
            TypeAnnotation::Named(self.name()?)
        };
        self.leave();
        if self.skip_if(Token::Bang) {
            Ok(TypeAnnotation::NonNull(Box::new(inner)))
        } else {
            Ok(inner)
        }
    }

    fn selection_set(&mut self) -> Result<SelectionSet, ParseError> {
        self.expect(Token::LBrace)?;
        self.enter()?;
        let mut selections = Vec::new();
        while !self.skip_if(Token::RBrace) {
            if *self.peek() == Token::Eof {
                return Err(ParseError::new("Expected \"}\", found <EOF>", self.location()));
            }
            selections.push(self.selection()?);
        }
        self.leave();
        if selections.is_empty() {
            return Err(ParseError::new("Selection set must not be empty", self.location()));
        }
        Ok(selections)
    }

    fn selection(&mut self) -> Result<Selection, ParseError> {
        if *self.peek() != Token::Spread {
            return self.field().map(Selection::Field);
        }

        let location = self.location();
        self.advance();
        let inline = match self.peek() {
            Token::LBrace | Token::At => true,
            Token::Name(name) => name == "on",
            _ => false,
        };

        if inline {
            let type_condition = if self.peek_keyword("on") {
                self.advance();
                Some(self.name()?)
            } else {
                None
            };
            self.reject_directives()?;
            let selection_set = self.selection_set()?;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition,
                selection_set,
                location,
            }))
        } else {
            let name = self.name()?;
            self.reject_directives()?;
            Ok(Selection::FragmentSpread(FragmentSpread { name, location }))
        }
    }

    fn field(&mut self) -> Result<Field, ParseError> {
        let location = self.location();
        let first = self.name()?;
        let (alias, name) = if self.skip_if(Token::Colon) {
            (Some(first), self.name()?)
        } else {
            (None, first)
        };
        let arguments = if *self.peek() == Token::LParen {
            self.arguments()?
        } else {
            Vec::new()
        };
        self.reject_directives()?;
        let selection_set = if *self.peek() == Token::LBrace {
            self.selection_set()?
        } else {
            Vec::new()
        };
        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
            location,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, InputValue)>, ParseError> {
        self.expect(Token::LParen)?;
        let mut arguments: Vec<(String, InputValue)> = Vec::new();
        loop {
            let location = self.location();
            let name = self.name()?;
            if arguments.iter().any(|(existing, _)| *existing == name) {
                return Err(ParseError::new(
                    format!("There can be only one argument named \"{name}\""),
                    location,
                ));
            }
            self.expect(Token::Colon)?;
            let value = self.value(false)?;
            arguments.push((name, value));
            if self.skip_if(Token::RParen) {
                return Ok(arguments);
            }
        }
    }

    fn value(&mut self, constant: bool) -> Result<InputValue, ParseError> {
        let location = self.location();
        match self.advance() {
            Token::Dollar if !constant => Ok(InputValue::Variable(self.name()?)),
            Token::Dollar => Err(ParseError::new(
                "Variables are not allowed in default values",
                location,
            )),
            Token::Int(v) => Ok(InputValue::Int(v)),
            Token::Float(v) => Ok(InputValue::Float(v)),
            Token::Str(s) => Ok(InputValue::String(s)),
            Token::Name(name) => Ok(match name.as_str() {
                "true" => InputValue::Boolean(true),
                "false" => InputValue::Boolean(false),
                "null" => InputValue::Null,
                _ => InputValue::Enum(name),
            }),
            Token::LBracket => {
                self.enter()?;
                let mut items = Vec::new();
                while !self.skip_if(Token::RBracket) {
                    items.push(self.value(constant)?);
                }
                self.leave();
                Ok(InputValue::List(items))
            }
            Token::LBrace => {
                self.enter()?;
                let mut fields: Vec<(String, InputValue)> = Vec::new();
                while !self.skip_if(Token::RBrace) {
                    let field_location = self.location();
                    let name = self.name()?;
                    if fields.iter().any(|(existing, _)| *existing == name) {
                        return Err(ParseError::new(
                            format!("There can be only one input field named \"{name}\""),
                            field_location,
                        ));
                    }
                    self.expect(Token::Colon)?;
                    let value = self.value(constant)?;
                    fields.push((name, value));
                }
                self.leave();
                Ok(InputValue::Object(fields))
            }
            other => Err(ParseError::new(
                format!("Unexpected {}", other.describe()),
                location,
            )),
        }
    }

    fn fragment(&mut self) -> Result<FragmentDefinition, ParseError> {
        let location = self.location();
        self.advance();
        if self.peek_keyword("on") {
            return Err(ParseError::new("Fragment cannot be named \"on\"", self.location()));
        }
        let name = self.name()?;
        if !self.peek_keyword("on") {
            return Err(ParseError::new(
                format!("Expected \"on\", found {}", self.peek().describe()),
                self.location(),
            ));
        }
        self.advance();
        let type_condition = self.name()?;
        self.reject_directives()?;
        let selection_set = self.selection_set()?;
        Ok(FragmentDefinition {
            name,
            type_condition,
            selection_set,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_core::ErrorCode;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_rejected_document_is_logged_with_position() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert!(parse("{ posts { id }").is_err());
        });

        let logs = captured.text();
        assert!(logs.contains("document rejected by parser"), "{logs}");
        assert!(logs.contains("line=1"), "{logs}");
    }

    fn single_field(doc: &Document) -> &Field {
        match &doc.operations[0].selection_set[0] {
            Selection::Field(field) => field,
            other => panic!("expected field, got {other:?}"),
        }
    }

    #[test]
    fn test_shorthand_query() {
        let doc = parse("{ post(id: \"p1\") { title } }").unwrap();
        assert_eq!(doc.operations.len(), 1);
        let op = &doc.operations[0];
        assert_eq!(op.kind, OperationKind::Query);
        assert!(op.name.is_none());

        let field = single_field(&doc);
        assert_eq!(field.name, "post");
        assert_eq!(field.argument("id"), Some(&InputValue::String("p1".into())));
        assert_eq!(field.selection_set.len(), 1);
    }

    #[test]
    fn test_named_mutation_with_variables() {
        let doc = parse(
            "mutation Publish($id: ID!, $flag: Boolean = true) {\n  publishPost(id: $id, published: $flag) { id }\n}",
        )
        .unwrap();
        let op = &doc.operations[0];
        assert_eq!(op.kind, OperationKind::Mutation);
        assert_eq!(op.name.as_deref(), Some("Publish"));
        assert_eq!(op.variables.len(), 2);
        assert_eq!(op.variables[0].ty.to_string(), "ID!");
        assert_eq!(op.variables[1].default_value, Some(InputValue::Boolean(true)));

        let field = single_field(&doc);
        assert_eq!(field.argument("id"), Some(&InputValue::Variable("id".into())));
        assert_eq!(field.location, Location { line: 2, column: 3 });
    }

    #[test]
    fn test_alias_and_response_key() {
        let doc = parse("{ first: post(id: 1) { id } }").unwrap();
        let field = single_field(&doc);
        assert_eq!(field.name, "post");
        assert_eq!(field.response_key(), "first");
    }

    #[test]
    fn test_fragments() {
        let doc = parse(
            "query { posts { ...PostFields ... on Post { body } } }\nfragment PostFields on Post { id title }",
        )
        .unwrap();
        assert!(doc.fragments.contains_key("PostFields"));
        let posts = single_field(&doc);
        assert!(matches!(posts.selection_set[0], Selection::FragmentSpread(_)));
        assert!(matches!(posts.selection_set[1], Selection::InlineFragment(_)));
    }

    #[test]
    fn test_complex_values() {
        let doc = parse(
            "mutation { createPost(input: {title: \"T\", body: \"B\", tags: [1, 2.5, null, FOO]}) { id } }",
        )
        .unwrap();
        let field = single_field(&doc);
        let Some(InputValue::Object(fields)) = field.argument("input") else {
            panic!("expected object argument");
        };
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[2].1,
            InputValue::List(vec![
                InputValue::Int(1),
                InputValue::Float(2.5),
                InputValue::Null,
                InputValue::Enum("FOO".into()),
            ])
        );
    }

    #[test]
    fn test_rejects_directives_and_subscriptions() {
        assert!(parse("{ me @include(if: true) { id } }")
            .unwrap_err()
            .message
            .contains("Directives"));
        assert!(parse("subscription { me { id } }")
            .unwrap_err()
            .message
            .contains("Subscriptions"));
    }

    #[test]
    fn test_rejects_structural_mistakes() {
        assert!(parse("").is_err());
        assert!(parse("{ }").is_err());
        assert!(parse("{ me { id }").is_err());
        assert!(parse("query A { me { id } } query A { me { id } }").is_err());
        assert!(parse("{ me { id } } query B { me { id } }").is_err());
        assert!(parse("{ post(id: 1, id: 2) { id } }").is_err());
        assert!(parse("query ($a: Int = $b) { me { id } }").is_err());
    }

    #[test]
    fn test_nesting_guard() {
        let depth = MAX_NESTING + 1;
        let source = format!("{}{}{}", "{ a ".repeat(depth), "b", " }".repeat(depth));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn test_parse_error_becomes_malformed_operation() {
        let err: ApiError = parse("{ me { id }").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::MalformedOperation);
        assert!(err.location().is_some());
    }
}
