use tracing::debug;

use gustdb_common::GustResult;
use gustdb_protocol::{Command, Reply};
use gustdb_storage::Db;

/// Interpreta uma linha de comando e a executa contra o store.
/// Comandos malformados falham antes de tocar o store.
pub async fn execute_line(line: &str, db: &Db) -> GustResult<Reply> {
    let cmd = Command::parse(line)?;
    debug!("comando recebido: {} '{}'", cmd.name(), cmd.key());
    execute(cmd, db).await
}

/// Executa um comando e retorna a resposta.
pub async fn execute(cmd: Command, db: &Db) -> GustResult<Reply> {
    let reply = match cmd {
        Command::Get(key) => Reply::Value(db.get(&key)?),
        Command::Set {
            key,
            value,
            options,
        } => {
            db.set(key, value, &options)?;
            Reply::Ok
        }
        Command::QPush { key, values } => {
            db.push(&key, &values);
            Reply::Ok
        }
        Command::QPop(key) => Reply::Value(db.pop(&key)?),
        Command::BQPop { key, timeout } => Reply::Value(db.blocking_pop(&key, timeout).await?),
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gustdb_common::{CommandError, GustError, StorageError};

    #[tokio::test]
    async fn set_then_get() {
        let db = Db::new();
        assert_eq!(execute_line("SET k v", &db).await, Ok(Reply::Ok));
        assert_eq!(
            execute_line("GET k", &db).await,
            Ok(Reply::Value("v".into()))
        );
    }

    #[tokio::test]
    async fn queue_round_trip() {
        let db = Db::new();
        assert_eq!(execute_line("QPUSH q a b", &db).await, Ok(Reply::Ok));
        assert_eq!(
            execute_line("QPOP q", &db).await,
            Ok(Reply::Value("b".into()))
        );
        assert_eq!(
            execute_line("BQPOP q 0", &db).await,
            Ok(Reply::Value("a".into()))
        );
        assert_eq!(
            execute_line("QPOP q", &db).await,
            Err(GustError::Storage(StorageError::QueueEmpty))
        );
    }

    #[tokio::test]
    async fn malformed_command_leaves_store_untouched() {
        let db = Db::new();
        assert!(matches!(
            execute_line("SET k v EX nope", &db).await,
            Err(GustError::Command(CommandError::InvalidArgument(_)))
        ));
        assert!(matches!(
            execute_line("QPUSH q", &db).await,
            Err(GustError::Command(CommandError::InvalidCommand(_)))
        ));
        assert!(db.is_empty());
    }

    #[tokio::test]
    async fn conditional_set_errors() {
        let db = Db::new();
        assert_eq!(
            execute_line("SET k v XX", &db).await,
            Err(GustError::Storage(StorageError::KeyMissing))
        );
        execute_line("SET k v NX", &db).await.unwrap();
        assert_eq!(
            execute_line("SET k w NX", &db).await,
            Err(GustError::Storage(StorageError::KeyExists))
        );
    }
}
