//! Compiled-release collaborator.
//!
//! The release writer stores whatever payload the compiler returns in the
//! compiled table. Merging strategies live behind [`ReleaseCompiler`].

use crate::model::release::ReleaseEntity;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by a compiler implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError(pub String);

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "release compilation failed: {}", self.0)
    }
}

impl Error for CompileError {}

/// Computes the compiled (latest merged) payload for an incoming release.
pub trait ReleaseCompiler {
    /// `previous` is the latest compiled row of the same operation, if any.
    fn compile(
        &self,
        previous: Option<&ReleaseEntity>,
        incoming: &ReleaseEntity,
    ) -> Result<String, CompileError>;
}

/// Stores the incoming payload unchanged as the compiled state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCompiler;

impl ReleaseCompiler for PassThroughCompiler {
    fn compile(
        &self,
        _previous: Option<&ReleaseEntity>,
        incoming: &ReleaseEntity,
    ) -> Result<String, CompileError> {
        Ok(incoming.json_data.clone())
    }
}
