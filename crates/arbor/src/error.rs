//! Engine error type.
//!
//! Every fallible engine operation returns [`Result`]. Variants that concern
//! a node carry its name so a failure surfacing in the frame loop can be
//! reported as `[node] reason` without extra bookkeeping.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// `attach` found a sibling with the same name.
    #[error("[{parent}] already has a child named '{child}'")]
    DuplicateChild { parent: String, child: String },

    /// The node handle is stale or was never attached. A dead handle has no
    /// name left, so the error carries the handle itself.
    #[error("unknown node handle {handle}")]
    UnknownNode { handle: String },

    /// Leaf behaviors refuse children.
    #[error("[{node}] is a leaf and cannot own children")]
    LeafNode { node: String },

    /// A switch was asked for a target it has no constructor for.
    #[error("[{node}] has no registered target '{target}'")]
    UnknownTarget { node: String, target: String },

    /// A factory was asked for a type it has no constructor for.
    #[error("[{node}] has no registered type '{kind}'")]
    UnknownType { node: String, kind: String },

    /// A required shared service is not installed on the tree.
    #[error("[{node}] service '{service}' is unavailable")]
    ServiceUnavailable { node: String, service: &'static str },

    /// A node hook failed.
    #[error("[{node}] {message}")]
    Hook { node: String, message: String },

    #[error("asset '{path}': {reason}")]
    Asset { path: PathBuf, reason: String },

    #[error("config: {0}")]
    Config(String),

    #[error("backend: {0}")]
    Backend(String),
}

impl EngineError {
    /// Name of the node the error is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::DuplicateChild { parent, .. } => Some(parent),
            Self::LeafNode { node }
            | Self::UnknownTarget { node, .. }
            | Self::UnknownType { node, .. }
            | Self::ServiceUnavailable { node, .. }
            | Self::Hook { node, .. } => Some(node),
            Self::UnknownNode { .. } | Self::Asset { .. } | Self::Config(_) | Self::Backend(_) => {
                None
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
