//! External decision source for destination and conflict choices.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use handoff_channel::FileDetails;

/// Future type returned by oracle methods.
pub type OracleFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Decision for an existing file at the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Delete the existing file and take its name.
    Overwrite,
    /// Save under a different name instead.
    Rename(PathBuf),
    /// Abandon the transfer.
    Cancel,
}

/// Decision for a leftover partial file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialChoice {
    /// Continue where the partial file ends.
    Resume,
    /// Keep the leftover and accumulate under a different partial name.
    Rename(PathBuf),
    /// Start over on top of the leftover.
    Overwrite,
}

/// Where destination and conflict decisions come from.
///
/// Interactive front ends put a dialog behind each method; headless
/// deployments use [`AutoDecide`]. Every method is a suspend point: the
/// job waits for the answer but stays killable while it does.
pub trait DecisionOracle: Send + Sync {
    /// Picks the destination for an incoming transfer. `None` declines,
    /// which cancels the transfer without an error.
    fn choose_destination<'a>(
        &'a self,
        suggested: &'a Path,
        details: &'a FileDetails,
    ) -> OracleFuture<'a, Option<PathBuf>>;

    /// Resolves a collision with an existing file at the destination.
    fn resolve_existing<'a>(
        &'a self,
        destination: &'a Path,
        details: &'a FileDetails,
    ) -> OracleFuture<'a, ConflictChoice>;

    /// Resolves a collision with a leftover partial file of `size` bytes.
    fn resolve_partial<'a>(
        &'a self,
        partial: &'a Path,
        size: u64,
        details: &'a FileDetails,
    ) -> OracleFuture<'a, PartialChoice>;
}

/// Non-interactive policy: accept the suggested destination, overwrite
/// colliding files and resume partial files.
#[derive(Debug, Clone)]
pub struct AutoDecide {
    pub resume_partials: bool,
}

impl Default for AutoDecide {
    fn default() -> Self {
        Self { resume_partials: true }
    }
}

impl DecisionOracle for AutoDecide {
    fn choose_destination<'a>(
        &'a self,
        suggested: &'a Path,
        _details: &'a FileDetails,
    ) -> OracleFuture<'a, Option<PathBuf>> {
        Box::pin(async move { Some(suggested.to_path_buf()) })
    }

    fn resolve_existing<'a>(
        &'a self,
        _destination: &'a Path,
        _details: &'a FileDetails,
    ) -> OracleFuture<'a, ConflictChoice> {
        Box::pin(async move { ConflictChoice::Overwrite })
    }

    fn resolve_partial<'a>(
        &'a self,
        _partial: &'a Path,
        _size: u64,
        _details: &'a FileDetails,
    ) -> OracleFuture<'a, PartialChoice> {
        Box::pin(async move {
            if self.resume_partials {
                PartialChoice::Resume
            } else {
                PartialChoice::Overwrite
            }
        })
    }
}
