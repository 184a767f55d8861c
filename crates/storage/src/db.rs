use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as Slot;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tracing::debug;

use gustdb_common::StorageError;
use gustdb_protocol::{SetCondition, SetOptions};

use crate::entry::{Entry, Value};
use crate::waiter::WaiterQueue;

/// Prazo usado quando `now + duração` não cabe em um `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Item no BTreeSet de expiração: (instante, chave).
/// Ordenado por instante para purga eficiente.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct ExpiryEntry(Instant, String);

/// Estado compartilhado entre todos os handles.
pub(crate) struct SharedState {
    pub(crate) data: DashMap<String, Entry>,
    pub(crate) waiters: DashMap<String, WaiterQueue>,
    pub(crate) next_waiter_id: AtomicU64,
    expiry: Mutex<BTreeSet<ExpiryEntry>>,
    notify_expiry: Notify,
    sweep: bool,
}

/// Handle para o banco de dados in-memory.
///
/// Locks: o shard de `data` da chave é sempre adquirido antes do shard de
/// `waiters`, e nenhum dos dois atravessa um `.await`.
#[derive(Clone)]
pub struct Db {
    pub(crate) shared: Arc<SharedState>,
}

impl Db {
    /// Cria um store com a purga de chaves expiradas em background.
    /// Precisa ser chamado dentro de um runtime tokio.
    pub fn new() -> Self {
        Self::with_sweeper(true)
    }

    /// Cria um store; com `sweep == false` a expiração é só lazy.
    pub fn with_sweeper(sweep: bool) -> Self {
        let db = Db {
            shared: Arc::new(SharedState {
                data: DashMap::new(),
                waiters: DashMap::new(),
                next_waiter_id: AtomicU64::new(0),
                expiry: Mutex::new(BTreeSet::new()),
                notify_expiry: Notify::new(),
                sweep,
            }),
        };

        if sweep {
            let shared = db.shared.clone();
            tokio::spawn(async move {
                purge_expired_keys(shared).await;
            });
        }

        db
    }

    // --- Scalar operations ---

    pub fn get(&self, key: &str) -> Result<String, StorageError> {
        let entry = self.shared.data.get(key).ok_or(StorageError::NotFound)?;
        if entry.is_expired() {
            drop(entry);
            self.evict_expired(key);
            return Err(StorageError::NotFound);
        }
        match &entry.value {
            Value::Scalar(value) => Ok(value.clone()),
            Value::Queue(_) => Err(StorageError::TypeMismatch),
        }
    }

    pub fn set(&self, key: String, value: String, options: &SetOptions) -> Result<(), StorageError> {
        let expires_at = options.expire.map(deadline_after);
        let entry = Entry::new(Value::Scalar(value), expires_at);

        match self.shared.data.entry(key.clone()) {
            Slot::Occupied(mut slot) => {
                // NX/XX olham só a presença; entrada expirada ainda não removida conta
                if options.condition == Some(SetCondition::Nx) {
                    return Err(StorageError::KeyExists);
                }
                slot.insert(entry);
            }
            Slot::Vacant(slot) => {
                if options.condition == Some(SetCondition::Xx) {
                    return Err(StorageError::KeyMissing);
                }
                slot.insert(entry);
            }
        }

        if let Some(when) = expires_at {
            self.track_expiry(key, when);
        }

        Ok(())
    }

    /// Número de entradas armazenadas, incluindo expiradas ainda não purgadas.
    pub fn len(&self) -> usize {
        self.shared.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.data.is_empty()
    }

    /// Remove a chave só se ela ainda estiver expirada; um SET concorrente vence.
    pub(crate) fn evict_expired(&self, key: &str) {
        if self
            .shared
            .data
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            debug!("key expirada removida na leitura: {key}");
        }
    }

    fn track_expiry(&self, key: String, when: Instant) {
        if !self.shared.sweep {
            return;
        }
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut expiry = shared.expiry.lock().await;
            expiry.insert(ExpiryEntry(when, key));
            drop(expiry);
            shared.notify_expiry.notify_one();
        });
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

/// `now + duration`, saturando em um futuro distante.
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Background task que purga chaves expiradas.
async fn purge_expired_keys(shared: Arc<SharedState>) {
    loop {
        let next_expiry = {
            let expiry = shared.expiry.lock().await;
            expiry.iter().next().map(|e| e.0)
        };

        match next_expiry {
            Some(when) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(when) => {}
                    _ = shared.notify_expiry.notified() => { continue; }
                }
            }
            None => {
                shared.notify_expiry.notified().await;
                continue;
            }
        }

        // Purgar todas as chaves que expiraram
        let now = Instant::now();
        let mut expiry = shared.expiry.lock().await;
        let mut to_remove = Vec::new();

        for entry in expiry.iter() {
            if entry.0 <= now {
                to_remove.push(entry.clone());
            } else {
                break; // BTreeSet é ordenado, os próximos são todos futuros
            }
        }

        for entry in &to_remove {
            expiry.remove(entry);
            // Só remove se realmente expirou (pode ter sido re-setado)
            if shared
                .data
                .remove_if(&entry.1, |_, e| e.is_expired())
                .is_some()
            {
                debug!("key expirada removida: {}", entry.1);
            }
        }
    }
}
