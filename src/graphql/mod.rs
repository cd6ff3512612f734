//! GraphQL wire types and the parsers for schema definitions and executable documents.
//! Execution lives with the schema artifact in `crate::schema`.

pub mod document;
pub mod lexer;
pub mod sdl;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use document::{parse_document, Document, Field, InputValue, Operation, OperationKind};
pub use lexer::SyntaxError;
pub use sdl::{parse_schema, DefinitionError, SchemaDefinition, TypeDef, TypeKind, TypeRef};

pub mod codes {
    pub const PARSE_FAILED: &str = "GRAPHQL_PARSE_FAILED";
    pub const VALIDATION_FAILED: &str = "GRAPHQL_VALIDATION_FAILED";
    pub const BAD_USER_INPUT: &str = "BAD_USER_INPUT";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const INTERNAL: &str = "INTERNAL_SERVER_ERROR";
}

/// Body of `POST /graphql` and the payload of a `subscribe` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), variables: None, operation_name: None }
    }

    pub fn with_variables(mut self, vars: Value) -> Self {
        if let Value::Object(m) = vars { self.variables = Some(m); }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>, code: &str) -> Self {
        Self { message: message.into(), path: None, extensions: Some(ErrorExtensions { code: code.to_string() }) }
    }

    pub fn at(mut self, path: &[PathSegment]) -> Self {
        self.path = Some(path.to_vec());
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref().map(|e| e.code.as_str())
    }
}

/// Error raised by a resolver. Becomes a `GraphQLError` with the field's path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
    pub code: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: codes::INTERNAL.to_string() }
    }

    pub fn with_code(message: impl Into<String>, code: &str) -> Self {
        Self { message: message.into(), code: code.to_string() }
    }

    pub fn unauthenticated() -> Self {
        Self::with_code("Unauthorized", codes::UNAUTHENTICATED)
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::with_code(message, codes::BAD_USER_INPUT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    /// Request-level failure: no execution happened, so there is no `data` key.
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }

    pub fn is_ok(&self) -> bool { self.errors.is_empty() }
}
