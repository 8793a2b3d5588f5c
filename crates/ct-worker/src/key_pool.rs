//! Pool of rate-limited recognition credentials.
//!
//! Each credential carries a load counter. `acquire` hands out the least
//! loaded credential (first in configuration order on ties) and binds it to
//! the resource; `release` undoes exactly that binding. All reads and writes
//! go through one mutex that is never held across I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// A recognition service credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Stable label, `key-{n}` in configuration order
    pub id: String,
    api_key: String,
    /// Service region
    pub region: String,
    /// Jobs using this credential when the snapshot was taken
    pub load: u32,
}

impl Credential {
    pub fn new(id: impl Into<String>, api_key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: api_key.into(),
            region: region.into(),
            load: 0,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("api_key", &"<redacted>")
            .field("region", &self.region)
            .field("load", &self.load)
            .finish()
    }
}

/// The resource already holds a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{resource_id} is already bound to credential {credential_id}")]
pub struct AlreadyBound {
    pub resource_id: String,
    pub credential_id: String,
}

/// Never empty: `KeyPool::new` rejects an empty credential list.
#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    /// resource id -> index into `credentials`
    bindings: HashMap<String, usize>,
}

impl PoolState {
    /// Index of the least-loaded credential; the earliest one wins a tie.
    fn least_loaded(&self) -> usize {
        (1..self.credentials.len()).fold(0, |best, i| {
            if self.credentials[i].load < self.credentials[best].load {
                i
            } else {
                best
            }
        })
    }
}

/// Least-loaded credential pool. Clones share the same state.
#[derive(Debug, Clone)]
pub struct KeyPool {
    state: Arc<Mutex<PoolState>>,
}

impl KeyPool {
    pub fn new(credentials: Vec<Credential>) -> WorkerResult<Self> {
        if credentials.is_empty() {
            return Err(WorkerError::config_error("No recognition credentials configured"));
        }
        for credential in &credentials {
            metrics::set_key_load(&credential.id, 0);
        }
        Ok(Self {
            state: Arc::new(Mutex::new(PoolState {
                credentials,
                bindings: HashMap::new(),
            })),
        })
    }

    /// Parse `key,region;key,region`. Blank entries are ignored.
    pub fn from_spec(spec: &str) -> WorkerResult<Self> {
        let mut credentials = Vec::new();
        for (n, entry) in spec.split(';').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
            let mut parts = entry.split(',').map(str::trim);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(region), None) if !key.is_empty() && !region.is_empty() => {
                    credentials.push(Credential::new(format!("key-{}", n), key, region));
                }
                _ => {
                    return Err(WorkerError::config_error(format!(
                        "Malformed subscription key entry #{}: expected key,region",
                        n
                    )))
                }
            }
        }
        let pool = Self::new(credentials)?;
        info!("Key pool loaded with {} credentials", pool.len());
        Ok(pool)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind the least-loaded credential to `resource_id`.
    pub fn acquire(&self, resource_id: &str) -> Result<Credential, AlreadyBound> {
        let mut state = self.lock();

        if let Some(&index) = state.bindings.get(resource_id) {
            return Err(AlreadyBound {
                resource_id: resource_id.to_string(),
                credential_id: state.credentials[index].id.clone(),
            });
        }

        let index = state.least_loaded();
        state.credentials[index].load += 1;
        state.bindings.insert(resource_id.to_string(), index);

        let credential = state.credentials[index].clone();
        metrics::set_key_load(&credential.id, credential.load);
        debug!(resource_id, key = %credential.id, load = credential.load, "Acquired credential");
        Ok(credential)
    }

    /// Undo the binding made by `acquire`. Unknown pairs are logged and ignored.
    pub fn release(&self, credential: &Credential, resource_id: &str) {
        let mut state = self.lock();

        let bound = state.bindings.get(resource_id).copied();
        let index = state.credentials.iter().position(|c| c.id == credential.id);

        match (bound, index) {
            (Some(b), Some(i)) if b == i => {
                state.bindings.remove(resource_id);
                let entry = &mut state.credentials[i];
                entry.load = entry.load.saturating_sub(1);
                metrics::set_key_load(&entry.id, entry.load);
                debug!(resource_id, key = %entry.id, load = entry.load, "Released credential");
            }
            _ => {
                error!(
                    resource_id,
                    key = %credential.id,
                    "Release without a matching acquire; pool left unchanged"
                );
            }
        }
    }

    /// Acquire a credential that is released when the lease drops.
    pub fn lease(&self, resource_id: &str) -> Result<KeyLease, AlreadyBound> {
        let credential = self.acquire(resource_id)?;
        Ok(KeyLease {
            pool: self.clone(),
            credential,
            resource_id: resource_id.to_string(),
        })
    }

    /// `(id, load)` for every credential, in configuration order.
    pub fn loads(&self) -> Vec<(String, u32)> {
        self.lock()
            .credentials
            .iter()
            .map(|c| (c.id.clone(), c.load))
            .collect()
    }

    pub fn bound_resources(&self) -> usize {
        self.lock().bindings.len()
    }
}

/// A credential bound to one resource for as long as the lease lives.
#[derive(Debug)]
pub struct KeyLease {
    pool: KeyPool,
    credential: Credential,
    resource_id: String,
}

impl KeyLease {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        self.pool.release(&self.credential, &self.resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> KeyPool {
        KeyPool::new(
            (0..n)
                .map(|i| Credential::new(format!("key-{}", i), format!("secret-{}", i), "eastus"))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_least_loaded_with_tie_break() {
        let pool = pool(2);

        let k1 = pool.acquire("v1").unwrap();
        assert_eq!(k1.id, "key-0");

        let k2 = pool.acquire("v2").unwrap();
        assert_eq!(k2.id, "key-1");

        pool.release(&k1, "v1");
        let k3 = pool.acquire("v3").unwrap();
        assert_eq!(k3.id, "key-0");
        assert_eq!(pool.loads(), vec![("key-0".to_string(), 1), ("key-1".to_string(), 1)]);
    }

    #[test]
    fn test_least_loaded_prefers_earliest_minimum() {
        let pool = pool(3);
        let _a = pool.acquire("v1").unwrap();
        let state = pool.lock();
        assert_eq!(state.least_loaded(), 1);
        drop(state);

        let _b = pool.acquire("v2").unwrap();
        let _c = pool.acquire("v3").unwrap();
        assert_eq!(pool.lock().least_loaded(), 0);
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(KeyPool::new(Vec::new()), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_double_acquire_rejected() {
        let pool = pool(2);
        let k = pool.acquire("v1").unwrap();

        let err = pool.acquire("v1").unwrap_err();
        assert_eq!(err.credential_id, k.id);
        assert_eq!(pool.loads()[1].1, 0);
    }

    #[test]
    fn test_unmatched_release_does_not_corrupt() {
        let pool = pool(2);
        let k0 = pool.acquire("v1").unwrap();
        let k1 = pool.acquire("v2").unwrap();

        pool.release(&k1, "v1");
        pool.release(&k0, "never-acquired");
        assert_eq!(pool.loads(), vec![("key-0".to_string(), 1), ("key-1".to_string(), 1)]);
        assert_eq!(pool.bound_resources(), 2);

        pool.release(&k0, "v1");
        pool.release(&k0, "v1");
        assert_eq!(pool.loads()[0].1, 0);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let pool = pool(1);
        {
            let lease = pool.lease("v1").unwrap();
            assert_eq!(lease.credential().region, "eastus");
            assert_eq!(pool.loads()[0].1, 1);
            assert!(pool.lease("v1").is_err());
        }
        assert_eq!(pool.loads()[0].1, 0);
        assert!(pool.lease("v1").is_ok());
    }

    #[test]
    fn test_load_stays_balanced() {
        let pool = pool(3);
        let mut held: Vec<(Credential, String)> = Vec::new();

        for round in 0..60 {
            let id = format!("v{}", round);
            held.push((pool.acquire(&id).unwrap(), id));
            if held.len() == 3 || round % 4 == 0 {
                let (credential, id) = held.remove(round % held.len());
                pool.release(&credential, &id);
            }

            let loads: Vec<u32> = pool.loads().into_iter().map(|(_, l)| l).collect();
            let min = *loads.iter().min().unwrap();
            assert!(loads.iter().all(|l| l - min <= 1), "unbalanced: {:?}", loads);
        }
    }

    #[test]
    fn test_from_spec() {
        let pool = KeyPool::from_spec("abc,eastus; ;def , westus2;").unwrap();
        assert_eq!(pool.len(), 2);
        let k = pool.acquire("v").unwrap();
        assert_eq!(k.api_key(), "abc");
        assert_eq!(k.region, "eastus");

        assert!(KeyPool::from_spec("").is_err());
        assert!(KeyPool::from_spec("novalue").is_err());
        assert!(KeyPool::from_spec("a,b,c").is_err());
        assert!(KeyPool::from_spec("a,").is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let credential = Credential::new("key-0", "top-secret", "eastus");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("top-secret"));
    }
}
