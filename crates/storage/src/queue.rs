//! Operações de fila: push, pop pelo final e pop bloqueante com timeout.
//!
//! A política de pop é LIFO: QPOP e BQPOP removem o elemento mais recente.
//! Waiters bloqueados, por outro lado, são servidos em ordem de registro.

use std::sync::atomic::Ordering;

use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::debug;

use gustdb_common::StorageError;

use crate::db::{Db, deadline_after};
use crate::entry::{Entry, Value};
use crate::waiter::Waiter;

/// Resultado da primeira fase de um BQPOP.
enum Attempt {
    Hit(String),
    Registered {
        id: u64,
        rx: oneshot::Receiver<String>,
    },
}

/// Waiter registrado por um BQPOP em andamento. Ao ser descartado (prazo
/// vencido ou future cancelado) remove o waiter do índice; se um push já
/// tinha entregue um valor no canal, o valor volta para a fila.
struct Registration<'a> {
    db: &'a Db,
    key: &'a str,
    id: u64,
    rx: oneshot::Receiver<String>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let waiters = &self.db.shared.waiters;
        if let Some(mut queue) = waiters.get_mut(self.key) {
            queue.deregister(self.id);
            let drained = queue.is_empty();
            drop(queue);
            if drained {
                waiters.remove_if(self.key, |_, w| w.is_empty());
            }
        }

        // Fora do índice nenhum push alcança mais este canal.
        self.rx.close();
        if let Ok(value) = self.rx.try_recv() {
            debug!("waiter {} cancelado com valor pendente, devolvendo à fila", self.id);
            self.db.push(self.key, &[value]);
        }
    }
}

impl Db {
    /// Anexa os valores ao final da fila, na ordem dos argumentos, criando a
    /// fila se necessário. Cada valor é oferecido antes ao waiter mais antigo
    /// da chave. Retorna o tamanho da fila após o push.
    pub fn push(&self, key: &str, values: &[String]) -> usize {
        let mut entry = self
            .shared
            .data
            .entry(key.to_string())
            .or_insert_with(Entry::empty_queue);

        if entry.is_expired() {
            *entry = Entry::empty_queue();
        }

        let queue = entry.as_queue_mut();
        for value in values {
            if let Some(rejected) = self.offer_to_waiters(key, value.clone()) {
                queue.push_back(rejected);
            }
        }
        queue.len()
    }

    /// Remove e retorna o elemento mais recente da fila.
    pub fn pop(&self, key: &str) -> Result<String, StorageError> {
        let mut entry = self
            .shared
            .data
            .get_mut(key)
            .ok_or(StorageError::QueueEmpty)?;

        if entry.is_expired() {
            drop(entry);
            self.evict_expired(key);
            return Err(StorageError::QueueEmpty);
        }

        match &mut entry.value {
            // Fila drenada continua existindo como sequência vazia
            Value::Queue(queue) => queue.pop_back().ok_or(StorageError::QueueEmpty),
            Value::Scalar(_) => Err(StorageError::TypeMismatch),
        }
    }

    /// Pop bloqueante. Com `timeout` zero é idêntico a [`Db::pop`]. Chave
    /// ausente retorna `QueueEmpty` sem bloquear; fila existente e vazia
    /// registra um waiter e espera um push até o prazo.
    pub async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<String, StorageError> {
        if timeout.is_zero() {
            return self.pop(key);
        }

        let deadline = deadline_after(timeout);
        let (id, rx) = match self.pop_or_register(key, deadline)? {
            Attempt::Hit(value) => return Ok(value),
            Attempt::Registered { id, rx } => (id, rx),
        };
        let mut registration = Registration {
            db: self,
            key,
            id,
            rx,
        };

        match tokio::time::timeout_at(deadline, &mut registration.rx).await {
            Ok(Ok(value)) => {
                debug!("waiter {id} atendido em '{key}'");
                Ok(value)
            }
            // Sender descartado: o push viu o prazo vencido
            Ok(Err(_)) => Err(StorageError::Timeout),
            Err(_) => {
                debug!("waiter {id} expirou em '{key}'");
                Err(StorageError::Timeout)
            }
        }
    }

    /// Número de waiters registrados na chave.
    pub fn waiter_count(&self, key: &str) -> usize {
        self.shared
            .waiters
            .get(key)
            .map(|waiters| waiters.len())
            .unwrap_or(0)
    }

    /// Tenta o pop imediato; se a fila existe e está vazia, registra o waiter
    /// sob o mesmo lock exclusivo da chave, de modo que nenhum push se perde
    /// entre a checagem e o registro.
    fn pop_or_register(
        &self,
        key: &str,
        deadline: Instant,
    ) -> Result<Attempt, StorageError> {
        let mut entry = self
            .shared
            .data
            .get_mut(key)
            .ok_or(StorageError::QueueEmpty)?;

        if entry.is_expired() {
            drop(entry);
            self.evict_expired(key);
            return Err(StorageError::QueueEmpty);
        }

        match &mut entry.value {
            Value::Queue(queue) => {
                if let Some(value) = queue.pop_back() {
                    return Ok(Attempt::Hit(value));
                }
            }
            Value::Scalar(_) => return Err(StorageError::TypeMismatch),
        }

        let id = self.shared.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let (waiter, rx) = Waiter::new(id, deadline);
        self.shared
            .waiters
            .entry(key.to_string())
            .or_default()
            .register(waiter);
        debug!("waiter {id} registrado em '{key}'");

        Ok(Attempt::Registered { id, rx })
    }

    /// Oferece um valor aos waiters da chave. Chamado com o lock de `data` da
    /// chave já adquirido.
    fn offer_to_waiters(&self, key: &str, value: String) -> Option<String> {
        let mut waiters = match self.shared.waiters.get_mut(key) {
            Some(w) => w,
            None => return Some(value),
        };
        let rejected = waiters.offer(value);
        let drained = waiters.is_empty();
        drop(waiters);

        if drained {
            self.shared.waiters.remove_if(key, |_, w| w.is_empty());
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gustdb_protocol::SetOptions;

    fn vals(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Cria uma fila existente e vazia.
    fn drained_queue(db: &Db, key: &str) {
        db.push(key, &vals(&["seed"]));
        db.pop(key).unwrap();
    }

    async fn wait_for_waiters(db: &Db, key: &str, n: usize) {
        while db.waiter_count(key) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn push_then_pop() {
        let db = Db::new();
        assert_eq!(db.push("q", &vals(&["a"])), 1);
        assert_eq!(db.pop("q"), Ok("a".to_string()));
        assert_eq!(db.pop("q"), Err(StorageError::QueueEmpty));
    }

    #[tokio::test]
    async fn pop_is_lifo() {
        let db = Db::new();
        db.push("q", &vals(&["a"]));
        db.push("q", &vals(&["b"]));
        assert_eq!(db.pop("q"), Ok("b".to_string()));
        assert_eq!(db.pop("q"), Ok("a".to_string()));
    }

    #[tokio::test]
    async fn push_many_keeps_argument_order() {
        let db = Db::new();
        assert_eq!(db.push("q", &vals(&["a", "b", "c"])), 3);
        assert_eq!(db.pop("q"), Ok("c".to_string()));
        assert_eq!(db.pop("q"), Ok("b".to_string()));
        assert_eq!(db.pop("q"), Ok("a".to_string()));
    }

    #[tokio::test]
    async fn pop_absent_key() {
        let db = Db::new();
        assert_eq!(db.pop("missing"), Err(StorageError::QueueEmpty));
    }

    #[tokio::test]
    async fn drained_queue_keeps_key() {
        let db = Db::new();
        drained_queue(&db, "q");
        assert_eq!(db.len(), 1);
        assert_eq!(db.pop("q"), Err(StorageError::QueueEmpty));
    }

    #[tokio::test]
    async fn pop_on_scalar_is_type_mismatch() {
        let db = Db::new();
        db.set("k".into(), "v".into(), &SetOptions::default())
            .unwrap();
        assert_eq!(db.pop("k"), Err(StorageError::TypeMismatch));
        assert_eq!(
            db.blocking_pop("k", Duration::from_secs(1)).await,
            Err(StorageError::TypeMismatch)
        );
        assert_eq!(db.get("k"), Ok("v".to_string()));
    }

    #[tokio::test]
    async fn push_converts_scalar() {
        let db = Db::new();
        db.set("k".into(), "v".into(), &SetOptions::default())
            .unwrap();
        assert_eq!(db.push("k", &vals(&["a"])), 2);
        assert_eq!(db.pop("k"), Ok("a".to_string()));
        assert_eq!(db.pop("k"), Ok("v".to_string()));
    }

    #[tokio::test]
    async fn push_on_expired_entry_starts_fresh() {
        let db = Db::with_sweeper(false);
        let opts = SetOptions {
            expire: Some(Duration::ZERO),
            condition: None,
        };
        db.set("k".into(), "stale".into(), &opts).unwrap();
        assert_eq!(db.push("k", &vals(&["a"])), 1);
        assert_eq!(db.pop("k"), Ok("a".to_string()));
        assert_eq!(db.pop("k"), Err(StorageError::QueueEmpty));
    }

    #[tokio::test]
    async fn pop_on_expired_queue() {
        let db = Db::with_sweeper(false);
        let opts = SetOptions {
            expire: Some(Duration::ZERO),
            condition: None,
        };
        db.set("k".into(), "v".into(), &opts).unwrap();
        // Conversão mantém o TTL, que já venceu
        db.shared.data.get_mut("k").unwrap().as_queue_mut();
        assert_eq!(db.pop("k"), Err(StorageError::QueueEmpty));
        assert!(db.is_empty());
    }

    #[tokio::test]
    async fn blocking_pop_zero_timeout_does_not_wait() {
        let db = Db::new();
        assert_eq!(
            db.blocking_pop("q", Duration::ZERO).await,
            Err(StorageError::QueueEmpty)
        );
        drained_queue(&db, "q");
        assert_eq!(
            db.blocking_pop("q", Duration::ZERO).await,
            Err(StorageError::QueueEmpty)
        );
        db.push("q", &vals(&["a", "b"]));
        assert_eq!(db.blocking_pop("q", Duration::ZERO).await, Ok("b".to_string()));
    }

    #[tokio::test]
    async fn blocking_pop_absent_key_does_not_wait() {
        let db = Db::new();
        assert_eq!(
            db.blocking_pop("missing", Duration::from_secs(30)).await,
            Err(StorageError::QueueEmpty)
        );
        assert_eq!(db.waiter_count("missing"), 0);
    }

    #[tokio::test]
    async fn blocking_pop_immediate_hit() {
        let db = Db::new();
        db.push("q", &vals(&["a", "b"]));
        assert_eq!(
            db.blocking_pop("q", Duration::from_secs(5)).await,
            Ok("b".to_string())
        );
        assert_eq!(db.waiter_count("q"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_pop_woken_by_push() {
        let db = Db::new();
        drained_queue(&db, "q");

        let waiter = {
            let db = db.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                let result = db.blocking_pop("q", Duration::from_secs(10)).await;
                (result, start.elapsed())
            })
        };
        wait_for_waiters(&db, "q", 1).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(db.push("q", &vals(&["x"])), 0);

        let (result, elapsed) = waiter.await.unwrap();
        assert_eq!(result, Ok("x".to_string()));
        assert!(elapsed < Duration::from_secs(3), "elapsed = {elapsed:?}");
        assert_eq!(db.waiter_count("q"), 0);
        assert_eq!(db.pop("q"), Err(StorageError::QueueEmpty));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_in_registration_order() {
        let db = Db::new();
        drained_queue(&db, "k");

        let spawn_waiter = |db: Db| {
            tokio::spawn(async move { db.blocking_pop("k", Duration::from_secs(5)).await })
        };

        let a = spawn_waiter(db.clone());
        wait_for_waiters(&db, "k", 1).await;
        let b = spawn_waiter(db.clone());
        wait_for_waiters(&db, "k", 2).await;

        db.push("k", &vals(&["y"]));
        assert_eq!(a.await.unwrap(), Ok("y".to_string()));
        assert!(!b.is_finished());
        assert_eq!(db.waiter_count("k"), 1);

        db.push("k", &vals(&["z"]));
        assert_eq!(b.await.unwrap(), Ok("z".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn one_push_of_many_values_feeds_waiters_then_queue() {
        let db = Db::new();
        drained_queue(&db, "k");

        let a = {
            let db = db.clone();
            tokio::spawn(async move { db.blocking_pop("k", Duration::from_secs(5)).await })
        };
        wait_for_waiters(&db, "k", 1).await;

        assert_eq!(db.push("k", &vals(&["first", "second"])), 1);
        assert_eq!(a.await.unwrap(), Ok("first".to_string()));
        assert_eq!(db.pop("k"), Ok("second".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_pop_times_out_not_earlier() {
        let db = Db::new();
        drained_queue(&db, "k");

        let start = Instant::now();
        let result = db.blocking_pop("k", Duration::from_secs(1)).await;
        let elapsed = start.elapsed();

        assert_eq!(result, Err(StorageError::Timeout));
        assert!(elapsed >= Duration::from_secs(1), "elapsed = {elapsed:?}");
        assert_eq!(db.waiter_count("k"), 0);

        // Push tardio não é entregue ao waiter morto
        db.push("k", &vals(&["late"]));
        assert_eq!(db.pop("k"), Ok("late".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_blocking_pop_does_not_swallow_push() {
        let db = Db::new();
        drained_queue(&db, "k");

        let task = {
            let db = db.clone();
            tokio::spawn(async move { db.blocking_pop("k", Duration::from_secs(60)).await })
        };
        wait_for_waiters(&db, "k", 1).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(db.waiter_count("k"), 0);

        db.push("k", &vals(&["v"]));
        assert_eq!(db.pop("k"), Ok("v".to_string()));
    }

    #[tokio::test]
    async fn value_delivered_during_cancellation_returns_to_queue() {
        let db = Db::new();
        drained_queue(&db, "k");

        let deadline = Instant::now() + Duration::from_secs(60);
        let (id, rx) = match db.pop_or_register("k", deadline).unwrap() {
            Attempt::Registered { id, rx } => (id, rx),
            Attempt::Hit(v) => panic!("unexpected hit {v}"),
        };

        // Push alcança o waiter antes do cancelamento terminar
        assert_eq!(db.push("k", &vals(&["raced"])), 0);
        drop(Registration {
            db: &db,
            key: "k",
            id,
            rx,
        });

        assert_eq!(db.pop("k"), Ok("raced".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_waiters_each_get_one_value() {
        let db = Db::new();
        drained_queue(&db, "jobs");

        let mut waiters = Vec::new();
        for _ in 0..32 {
            let db = db.clone();
            waiters.push(tokio::spawn(async move {
                db.blocking_pop("jobs", Duration::from_secs(10)).await
            }));
        }

        let mut pushers = Vec::new();
        for i in 0..32 {
            let db = db.clone();
            pushers.push(tokio::spawn(async move {
                db.push("jobs", &[format!("job:{i}")]);
            }));
        }
        for p in pushers {
            p.await.unwrap();
        }

        let mut received = Vec::new();
        for w in waiters {
            received.push(w.await.unwrap().unwrap());
        }
        received.sort();
        let mut expected: Vec<String> = (0..32).map(|i| format!("job:{i}")).collect();
        expected.sort();

        assert_eq!(received, expected);
        assert_eq!(db.pop("jobs"), Err(StorageError::QueueEmpty));
        assert_eq!(db.waiter_count("jobs"), 0);
    }
}
