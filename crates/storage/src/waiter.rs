use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Registro de um BQPOP bloqueado aguardando um push na chave.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub id: u64,
    pub deadline: Instant,
    tx: oneshot::Sender<String>,
}

impl Waiter {
    pub fn new(id: u64, deadline: Instant) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (Self { id, deadline, tx }, rx)
    }

    /// Um waiter cujo prazo passou ou cujo receptor foi descartado não aceita valores.
    pub fn is_dead(&self) -> bool {
        self.tx.is_closed() || Instant::now() >= self.deadline
    }
}

/// Fila FIFO de waiters de uma chave.
#[derive(Debug, Default)]
pub(crate) struct WaiterQueue {
    waiters: VecDeque<Waiter>,
}

impl WaiterQueue {
    pub fn register(&mut self, waiter: Waiter) {
        self.waiters.push_back(waiter);
    }

    /// Entrega o valor ao waiter vivo mais antigo. Devolve o valor se ninguém aceitou.
    pub fn offer(&mut self, mut value: String) -> Option<String> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.is_dead() {
                continue;
            }
            match waiter.tx.send(value) {
                Ok(()) => return None,
                Err(rejected) => value = rejected,
            }
        }
        Some(value)
    }

    /// Remove o waiter pelo id. Retorna false se um push já o consumiu.
    pub fn deregister(&mut self, id: u64) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.id != id);
        self.waiters.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }
}
