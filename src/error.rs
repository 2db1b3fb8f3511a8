//! Error taxonomy (spec §7).
//!
//! Mirrors the reduction pattern `rendy-resource`'s `error.rs` uses: a small
//! set of `#[derive(Fail)]` variants with `#[fail(display = ...)]` strings
//! and `From` impls feeding the connector/node-scoped errors into the
//! top-level enum.

use failure::Fail;

/// One of the seven error kinds a build or run can surface.
#[derive(Debug, Fail)]
pub enum GraphError {
    /// Programming error in a `GraphDescription` builder call, e.g.
    /// `add_node` with a colliding identifier.
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),

    /// A non-optional input has no producing output after resolution.
    #[fail(
        display = "node '{}': input '{}' has no connected output",
        node, input
    )]
    ConnectionMissing { node: String, input: String },

    /// Kind/payload mismatch, incompatible usage, or a cycle in the
    /// delay-0 subgraph.
    #[fail(display = "invalid connection: {}", _0)]
    InvalidConnection(String),

    /// Structural build failure other than the two above, e.g. ring size
    /// too small for the requested delay.
    #[fail(display = "build error: {}", _0)]
    BuildError(String),

    /// Recoverable error raised by a node's lifecycle method.
    #[fail(display = "node '{}' error: {}", node, message)]
    NodeError { node: String, message: String },

    /// Recoverable error raised by a connector's lifecycle method.
    #[fail(
        display = "connector '{}' on node '{}' error: {}",
        connector, node, message
    )]
    ConnectorError {
        node: String,
        connector: String,
        message: String,
    },

    /// Allocation or device-level failure while creating a resource.
    #[fail(display = "resource error: {}", _0)]
    ResourceError(String),
}

impl GraphError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        GraphError::InvalidArgument(message.into())
    }

    pub fn connection_missing(node: impl Into<String>, input: impl Into<String>) -> Self {
        GraphError::ConnectionMissing {
            node: node.into(),
            input: input.into(),
        }
    }

    pub fn invalid_connection(message: impl Into<String>) -> Self {
        GraphError::InvalidConnection(message.into())
    }

    pub fn build_error(message: impl Into<String>) -> Self {
        GraphError::BuildError(message.into())
    }

    pub fn node_error(node: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::NodeError {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn connector_error(
        node: impl Into<String>,
        connector: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GraphError::ConnectorError {
            node: node.into(),
            connector: connector.into(),
            message: message.into(),
        }
    }

    pub fn resource_error(message: impl Into<String>) -> Self {
        GraphError::ResourceError(message.into())
    }

    /// Whether this kind leaves the previously built schedule intact
    /// (propagation policy, spec §7): everything except node/connector
    /// errors, which are handled by the runner instead of `connect()`.
    pub fn aborts_build(&self) -> bool {
        !matches!(
            self,
            GraphError::NodeError { .. } | GraphError::ConnectorError { .. }
        )
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
