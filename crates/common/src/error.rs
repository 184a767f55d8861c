/// Erros de parsing/validação de comandos. Nunca tocam o store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CommandError {
    pub fn unknown(verb: &str) -> Self {
        CommandError::InvalidCommand(format!("unknown command '{verb}'"))
    }

    pub fn wrong_arity(verb: &str) -> Self {
        CommandError::InvalidCommand(format!("wrong number of arguments for '{verb}'"))
    }
}

/// Erros do store e da fila.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("key already exists")]
    KeyExists,
    #[error("key does not exist")]
    KeyMissing,
    #[error("key not found")]
    NotFound,
    #[error("queue is empty")]
    QueueEmpty,
    #[error("timeout")]
    Timeout,
    #[error("operation against a key holding the wrong kind of value")]
    TypeMismatch,
}

/// Erro top-level do GustDB.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GustError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias.
pub type GustResult<T> = Result<T, GustError>;
