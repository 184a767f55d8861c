/// Resultado bem-sucedido de um comando.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Sucesso sem valor (SET, QPUSH).
    Ok,
    /// Valor retornado (GET, QPOP, BQPOP).
    Value(String),
}
