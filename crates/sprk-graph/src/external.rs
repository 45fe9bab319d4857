//! Redirection of objects to storage outside the current graph.
//!
//! A writer may be given an [`ExternalHandler`]; a reader may be given an
//! [`ExternalResolver`]. Which wire form each edge uses is decided once, at
//! construction, and recorded in the header's [`ReferenceMode`].

use serde::{Deserialize, Serialize};
use sprk_types::{ExternalReference, ReferenceMode};

use crate::error::GraphResult;
use crate::savable::SavableRef;

/// Write-side collaborator that stores objects somewhere else.
pub trait ExternalHandler {
    /// Store `object` externally and return where it went.
    ///
    /// `Ok(None)` declines the object; the edge is then written as absent.
    fn process(&mut self, object: &SavableRef) -> GraphResult<Option<ExternalReference>>;

    /// Commit anything buffered by [`process`](Self::process).
    ///
    /// Called once per finalized graph.
    fn flush(&mut self) -> GraphResult<()>;
}

/// Read-side collaborator that loads externally stored objects.
pub trait ExternalResolver {
    /// Load the object behind `reference`, or `Ok(None)` if it has no value.
    fn load(&mut self, reference: &ExternalReference) -> GraphResult<Option<SavableRef>>;
}

/// What to do with genuinely external data when no resolver is configured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingResolverPolicy {
    /// Decode the edge as absent and log a warning.
    #[default]
    Lenient,
    /// Fail the read with [`GraphError::MissingResolver`](crate::GraphError::MissingResolver).
    Strict,
}

/// How a writer routes shared and external edges.
pub(crate) enum WriteRouting<'a> {
    /// No handler (or all-shared requested): external edges become shared.
    Shared,
    /// External edges go to the handler; shared edges too when `all` is set.
    Handler {
        handler: Box<dyn ExternalHandler + 'a>,
        all: bool,
    },
}

impl<'a> WriteRouting<'a> {
    pub fn new(requested: ReferenceMode, handler: Option<Box<dyn ExternalHandler + 'a>>) -> Self {
        match (requested, handler) {
            (ReferenceMode::AllShared, _) | (_, None) => Self::Shared,
            (ReferenceMode::AllExternal, Some(handler)) => Self::Handler { handler, all: true },
            (ReferenceMode::Mixed, Some(handler)) => Self::Handler {
                handler,
                all: false,
            },
        }
    }

    /// Mode recorded in the header.
    pub fn mode(&self) -> ReferenceMode {
        match self {
            Self::Shared => ReferenceMode::AllShared,
            Self::Handler { all: true, .. } => ReferenceMode::AllExternal,
            Self::Handler { all: false, .. } => ReferenceMode::Mixed,
        }
    }

    pub fn flush(&mut self) -> GraphResult<()> {
        match self {
            Self::Shared => Ok(()),
            Self::Handler { handler, .. } => handler.flush(),
        }
    }
}

/// Which wire form an edge takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EdgeForm {
    Shared,
    External,
}

/// Wire form of a declared-shared edge under `mode`.
pub(crate) fn shared_edge_form(mode: ReferenceMode) -> EdgeForm {
    match mode {
        ReferenceMode::AllExternal => EdgeForm::External,
        ReferenceMode::AllShared | ReferenceMode::Mixed => EdgeForm::Shared,
    }
}

/// Wire form of a declared-external edge under `mode`.
pub(crate) fn external_edge_form(mode: ReferenceMode) -> EdgeForm {
    match mode {
        ReferenceMode::AllShared => EdgeForm::Shared,
        ReferenceMode::AllExternal | ReferenceMode::Mixed => EdgeForm::External,
    }
}

/// How a reader satisfies external edges.
pub(crate) enum ReadRouting<'a> {
    Resolver(Box<dyn ExternalResolver + 'a>),
    Missing(MissingResolverPolicy),
}

impl<'a> ReadRouting<'a> {
    pub fn new(
        resolver: Option<Box<dyn ExternalResolver + 'a>>,
        policy: MissingResolverPolicy,
    ) -> Self {
        match resolver {
            Some(resolver) => Self::Resolver(resolver),
            None => Self::Missing(policy),
        }
    }
}
