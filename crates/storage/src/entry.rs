use std::collections::VecDeque;
use tokio::time::Instant;

/// Tipo do valor armazenado.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Queue(VecDeque<String>),
}

/// Entrada no store: valor + TTL opcional.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    pub fn empty_queue() -> Self {
        Self::new(Value::Queue(VecDeque::new()), None)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|t| Instant::now() >= t)
            .unwrap_or(false)
    }

    /// Garante que a entrada é uma fila. Um escalar vira o primeiro elemento.
    pub fn as_queue_mut(&mut self) -> &mut VecDeque<String> {
        if let Value::Scalar(s) = &mut self.value {
            let first = std::mem::take(s);
            self.value = Value::Queue(VecDeque::from([first]));
        }
        match &mut self.value {
            Value::Queue(queue) => queue,
            Value::Scalar(_) => unreachable!("convertido acima"),
        }
    }
}
