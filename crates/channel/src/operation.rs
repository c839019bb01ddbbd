//! One-shot middleware operations.
//!
//! Every channel verb returns a [`PendingOperation`]: a handle that resolves
//! exactly once, either successfully or with the middleware's named error.
//! The completing side holds the matching [`OperationCompleter`]; dropping
//! the completer without resolving counts as a failure, so a waiter can
//! never hang on a connection that went away.

use tokio::sync::oneshot;

/// Error reported by a failed middleware operation.
///
/// `name` is the middleware's symbolic error identifier, `message` the
/// human-readable detail that came with it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct OperationError {
    pub name: String,
    pub message: String,
}

impl OperationError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Error used when the completer was dropped without resolving.
    pub fn abandoned() -> Self {
        Self::new(
            "operation-abandoned",
            "the middleware dropped the operation without completing it",
        )
    }
}

/// Resolving side of a [`PendingOperation`].
#[derive(Debug)]
pub struct OperationCompleter {
    tx: oneshot::Sender<Result<(), OperationError>>,
}

impl OperationCompleter {
    pub fn succeed(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub fn fail(self, error: OperationError) {
        let _ = self.tx.send(Err(error));
    }
}

/// A middleware operation that completes exactly once.
#[derive(Debug)]
pub struct PendingOperation {
    rx: oneshot::Receiver<Result<(), OperationError>>,
}

impl PendingOperation {
    /// Creates an unresolved operation and its completer.
    pub fn pair() -> (OperationCompleter, PendingOperation) {
        let (tx, rx) = oneshot::channel();
        (OperationCompleter { tx }, PendingOperation { rx })
    }

    /// An operation that is already resolved.
    pub fn ready(result: Result<(), OperationError>) -> PendingOperation {
        let (completer, op) = Self::pair();
        match result {
            Ok(()) => completer.succeed(),
            Err(error) => completer.fail(error),
        }
        op
    }

    /// Waits for the result. Resolves to [`OperationError::abandoned`] if the
    /// completing side disappeared.
    pub async fn wait(self) -> Result<(), OperationError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(OperationError::abandoned()),
        }
    }
}
