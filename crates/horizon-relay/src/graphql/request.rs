//! GraphQL operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::GraphQLResponse;
use crate::error::{RelayError, Result};

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A query operation (read-only).
    #[default]
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (real-time updates).
    Subscription,
}

/// An operation the transport core can send and decode.
///
/// Generated operation types implement this; [`GraphQLRequest`] is a
/// ready-made untyped implementation.
pub trait Operation: Send + Sync + fmt::Debug {
    /// The operation name, or an empty string for anonymous operations.
    fn name(&self) -> &str;

    /// The GraphQL document text.
    fn document(&self) -> &str;

    /// The operation variables.
    fn variables(&self) -> Option<&Value>;

    /// Query, mutation or subscription.
    fn kind(&self) -> OperationType;

    /// Protocol extensions sent alongside the operation.
    fn extensions(&self) -> Option<&Value> {
        None
    }

    /// The key under which results of this operation are cached.
    ///
    /// Defaults to the operation name (or the document for anonymous
    /// operations) followed by the variables in canonical JSON form.
    fn cache_key(&self) -> String {
        let id = if self.name().is_empty() {
            self.document()
        } else {
            self.name()
        };
        match self.variables() {
            Some(variables) => format!("{id}({variables})"),
            None => id.to_string(),
        }
    }

    /// Decode a raw response payload.
    fn decode(&self, payload: &[u8]) -> Result<GraphQLResponse> {
        serde_json::from_slice(payload)
            .map_err(|e| RelayError::Decode(format!("{}: {e}", self.name())))
    }
}

/// A GraphQL request.
///
/// Represents a GraphQL operation with optional variables and operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// The GraphQL query string.
    pub query: String,

    /// Optional variables for the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    /// Optional operation name (for documents with multiple operations).
    #[serde(skip_serializing_if = "Option::is_none", rename = "operationName")]
    pub operation_name: Option<String>,

    /// Extensions (implementation-specific metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,

    /// The operation type (not serialized, used internally).
    #[serde(skip)]
    pub(crate) operation_type: OperationType,
}

impl GraphQLRequest {
    /// Create a new query request.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = GraphQLRequest::query(r#"
    ///     query GetUsers {
    ///         users {
    ///             id
    ///             name
    ///         }
    ///     }
    /// "#);
    /// ```
    pub fn query(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Query)
    }

    /// Create a new mutation request.
    pub fn mutation(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Mutation)
    }

    /// Create a new subscription request.
    pub fn subscription(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Subscription)
    }

    /// Create a new request from raw query string.
    ///
    /// The operation type will be inferred from the query if possible,
    /// defaulting to Query.
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let operation_type = Self::infer_operation_type(&query);
        Self::with_type(query, operation_type)
    }

    fn with_type(query: impl Into<String>, operation_type: OperationType) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
            extensions: None,
            operation_type,
        }
    }

    /// Set a variable value.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = GraphQLRequest::query("...")
    ///     .variable("id", "123")
    ///     .variable("limit", 10);
    /// ```
    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let variables = self
            .variables
            .get_or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = variables
            && let Ok(value) = serde_json::to_value(value)
        {
            map.insert(name.into(), value);
        }
        self
    }

    /// Set multiple variables from a serializable value.
    pub fn variables(mut self, variables: impl Serialize) -> Self {
        self.variables = serde_json::to_value(variables).ok();
        self
    }

    /// Set the operation name.
    ///
    /// Required when the query document contains multiple operations.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set extensions (implementation-specific metadata).
    pub fn extensions(mut self, extensions: impl Serialize) -> Self {
        self.extensions = serde_json::to_value(extensions).ok();
        self
    }

    /// Get the operation type.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Infer operation type from query string.
    fn infer_operation_type(query: &str) -> OperationType {
        let trimmed = query.trim_start();
        if trimmed.starts_with("subscription") {
            OperationType::Subscription
        } else if trimmed.starts_with("mutation") {
            OperationType::Mutation
        } else {
            OperationType::Query
        }
    }
}

impl Operation for GraphQLRequest {
    fn name(&self) -> &str {
        self.operation_name.as_deref().unwrap_or_default()
    }

    fn document(&self) -> &str {
        &self.query
    }

    fn variables(&self) -> Option<&Value> {
        self.variables.as_ref()
    }

    fn kind(&self) -> OperationType {
        self.operation_type
    }

    fn extensions(&self) -> Option<&Value> {
        self.extensions.as_ref()
    }
}
