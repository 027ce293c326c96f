//! Storage seams for pedigree records and the active breeding policy.
//!
//! The engine only ever sees the two traits below. The in-memory adapters back
//! the CLI and the tests; a database-backed adapter plugs in the same way.

use crossbeam::channel;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{RepositoryError, Result};
use crate::types::{Animal, AnimalId, BreedingPolicy};

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Read access to animal records
pub trait PedigreeRepository: Send + Sync {
    /// `Ok(None)` when no record exists for `id`
    fn find_by_id(&self, id: &AnimalId) -> RepositoryResult<Option<Animal>>;
}

impl<R: PedigreeRepository + ?Sized> PedigreeRepository for Arc<R> {
    fn find_by_id(&self, id: &AnimalId) -> RepositoryResult<Option<Animal>> {
        (**self).find_by_id(id)
    }
}

/// Holder of the singleton active breeding policy
pub trait PolicyStore: Send + Sync {
    fn find_active_policy(&self) -> RepositoryResult<Option<Arc<BreedingPolicy>>>;

    /// Return the active policy, creating the default record if none exists.
    ///
    /// Implementations must make the check and the creation one atomic step so
    /// concurrent callers never produce two active records.
    fn get_or_create_default(&self) -> RepositoryResult<Arc<BreedingPolicy>>;

    /// Replace the active policy as a whole record
    fn upsert_policy(&self, policy: BreedingPolicy) -> RepositoryResult<Arc<BreedingPolicy>>;

    /// Derive the next record from the active one (the default if none is
    /// active) and store it, as one atomic step. Nothing is stored when
    /// `update` fails.
    fn update_policy(
        &self,
        update: &dyn Fn(&BreedingPolicy) -> Result<BreedingPolicy>,
    ) -> Result<Arc<BreedingPolicy>>;
}

/// Concurrent in-memory animal registry
#[derive(Debug, Default)]
pub struct InMemoryPedigree {
    animals: DashMap<AnimalId, Animal>,
}

impl InMemoryPedigree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_animals(animals: impl IntoIterator<Item = Animal>) -> Self {
        let pedigree = Self::new();
        for animal in animals {
            pedigree.insert(animal);
        }
        pedigree
    }

    /// Insert or replace a record, returning the previous one
    pub fn insert(&self, animal: Animal) -> Option<Animal> {
        self.animals.insert(animal.id.clone(), animal)
    }

    /// Soft-deactivate a record; animals are never removed
    pub fn deactivate(&self, id: &AnimalId) -> bool {
        match self.animals.get_mut(id) {
            Some(mut entry) => {
                entry.active = false;
                true
            }
            None => false,
        }
    }

    /// Identifiers of every active animal, sorted
    pub fn active_ids(&self) -> Vec<AnimalId> {
        let mut ids: Vec<AnimalId> = self
            .animals
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.animals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animals.is_empty()
    }
}

impl PedigreeRepository for InMemoryPedigree {
    fn find_by_id(&self, id: &AnimalId) -> RepositoryResult<Option<Animal>> {
        Ok(self.animals.get(id).map(|entry| entry.value().clone()))
    }
}

/// In-memory policy store.
///
/// Readers clone an `Arc` under a shared lock, so a replace is observed either
/// entirely or not at all.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    active: RwLock<Option<Arc<BreedingPolicy>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: BreedingPolicy) -> Self {
        Self {
            active: RwLock::new(Some(Arc::new(policy))),
        }
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn find_active_policy(&self) -> RepositoryResult<Option<Arc<BreedingPolicy>>> {
        Ok(self
            .active
            .read()
            .as_ref()
            .filter(|policy| policy.active)
            .cloned())
    }

    fn get_or_create_default(&self) -> RepositoryResult<Arc<BreedingPolicy>> {
        // Only one upgradable guard exists at a time, so the absent check and
        // the insert below cannot interleave with another creator.
        let guard = self.active.upgradable_read();
        if let Some(policy) = guard.as_ref().filter(|policy| policy.active) {
            return Ok(Arc::clone(policy));
        }

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let policy = Arc::new(BreedingPolicy::default());
        *guard = Some(Arc::clone(&policy));
        info!("No active breeding policy found, created default policy");
        Ok(policy)
    }

    fn upsert_policy(&self, policy: BreedingPolicy) -> RepositoryResult<Arc<BreedingPolicy>> {
        let policy = Arc::new(policy);
        *self.active.write() = Some(Arc::clone(&policy));
        debug!(
            inbreeding_limit = policy.inbreeding_limit,
            max_generations = policy.max_generations,
            "Replaced active breeding policy"
        );
        Ok(policy)
    }

    fn update_policy(
        &self,
        update: &dyn Fn(&BreedingPolicy) -> Result<BreedingPolicy>,
    ) -> Result<Arc<BreedingPolicy>> {
        let mut guard = self.active.write();
        let current = match guard.as_ref().filter(|policy| policy.active) {
            Some(policy) => Arc::clone(policy),
            None => Arc::new(BreedingPolicy::default()),
        };

        let next = Arc::new(update(&current)?);
        *guard = Some(Arc::clone(&next));
        debug!(
            inbreeding_limit = next.inbreeding_limit,
            max_generations = next.max_generations,
            "Updated active breeding policy"
        );
        Ok(next)
    }
}

/// Wraps a repository so every lookup carries its own timeout.
///
/// Lookups run on a dedicated thread pool; the caller waits on a channel and
/// gets `RepositoryError::Timeout` once the timeout elapses. A lookup that
/// overruns keeps running in the background and its answer is discarded.
pub struct TimedRepository<R> {
    inner: Arc<R>,
    pool: rayon::ThreadPool,
    timeout: Duration,
}

impl<R: PedigreeRepository + 'static> TimedRepository<R> {
    pub fn new(inner: Arc<R>, timeout: Duration, threads: usize) -> RepositoryResult<Self> {
        let num_threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("pedigree-lookup-{}", i))
            .build()
            .map_err(|e| {
                RepositoryError::Unavailable(format!("Failed to start lookup pool: {}", e))
            })?;

        Ok(Self {
            inner,
            pool,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<R: PedigreeRepository + 'static> PedigreeRepository for TimedRepository<R> {
    fn find_by_id(&self, id: &AnimalId) -> RepositoryResult<Option<Animal>> {
        let (tx, rx) = channel::bounded(1);
        let inner = Arc::clone(&self.inner);
        let id_owned = id.clone();

        self.pool.spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(inner.find_by_id(&id_owned));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(channel::RecvTimeoutError::Timeout) => {
                debug!(animal = %id, timeout = ?self.timeout, "Repository lookup timed out");
                Err(RepositoryError::Timeout(self.timeout))
            }
            Err(channel::RecvTimeoutError::Disconnected) => Err(RepositoryError::Unavailable(
                format!("lookup worker for {} exited without a result", id),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DysplasiaGrade, Gender};
    use std::thread;

    struct SlowRepository {
        inner: InMemoryPedigree,
        delay: Duration,
    }

    impl PedigreeRepository for SlowRepository {
        fn find_by_id(&self, id: &AnimalId) -> RepositoryResult<Option<Animal>> {
            thread::sleep(self.delay);
            self.inner.find_by_id(id)
        }
    }

    fn id(raw: &str) -> AnimalId {
        AnimalId::new(raw).unwrap()
    }

    #[test]
    fn test_in_memory_lookup_and_deactivation() {
        let pedigree = InMemoryPedigree::from_animals(vec![
            Animal::new(id("A1"), Gender::Male, DysplasiaGrade::A),
            Animal::new(id("B1"), Gender::Female, DysplasiaGrade::B),
        ]);

        assert!(pedigree.find_by_id(&id("A1")).unwrap().is_some());
        assert!(pedigree.find_by_id(&id("ZZ")).unwrap().is_none());

        assert!(pedigree.deactivate(&id("A1")));
        assert_eq!(pedigree.active_ids(), vec![id("B1")]);
        // Deactivated animals still resolve for pedigree purposes
        let a1 = pedigree.find_by_id(&id("A1")).unwrap().unwrap();
        assert!(!a1.active);
    }

    #[test]
    fn test_get_or_create_default_is_atomic() {
        let store = Arc::new(InMemoryPolicyStore::new());
        assert!(store.find_active_policy().unwrap().is_none());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create_default().unwrap())
            })
            .collect();

        let policies: Vec<Arc<BreedingPolicy>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let first = &policies[0];
        assert!(policies.iter().all(|p| Arc::ptr_eq(p, first)));
        let stored = store.find_active_policy().unwrap().unwrap();
        assert!(Arc::ptr_eq(&stored, first));
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let store = InMemoryPolicyStore::new();
        let before = store.get_or_create_default().unwrap();

        let mut next = BreedingPolicy::default();
        next.inbreeding_limit = 6.25;
        next.max_generations = 8;
        store.upsert_policy(next).unwrap();

        let after = store.find_active_policy().unwrap().unwrap();
        assert_eq!(after.inbreeding_limit, 6.25);
        assert_eq!(after.max_generations, 8);
        // Earlier snapshots are unaffected
        assert_eq!(before.inbreeding_limit, 12.5);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let mut start = BreedingPolicy::default();
        start.inbreeding_limit = 0.0;
        let store = Arc::new(InMemoryPolicyStore::with_policy(start));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .update_policy(&|current: &BreedingPolicy| {
                            let mut next = current.clone();
                            next.inbreeding_limit += 1.0;
                            thread::yield_now();
                            Ok(next)
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = store.find_active_policy().unwrap().unwrap();
        assert_eq!(stored.inbreeding_limit, 20.0);
    }

    #[test]
    fn test_failed_update_keeps_current_policy() {
        let store = InMemoryPolicyStore::new();
        let before = store.get_or_create_default().unwrap();

        let result = store.update_policy(&|_: &BreedingPolicy| {
            Err(crate::error::PedigreeError::InvalidInput("rejected".to_string()))
        });
        assert!(result.is_err());

        let after = store.find_active_policy().unwrap().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_inactive_policy_is_replaced_by_default() {
        let mut retired = BreedingPolicy::default();
        retired.active = false;
        retired.inbreeding_limit = 1.0;
        let store = InMemoryPolicyStore::with_policy(retired);

        assert!(store.find_active_policy().unwrap().is_none());
        let policy = store.get_or_create_default().unwrap();
        assert_eq!(policy.inbreeding_limit, 12.5);
    }

    #[test]
    fn test_timed_repository_times_out() {
        let slow = Arc::new(SlowRepository {
            inner: InMemoryPedigree::from_animals(vec![Animal::new(
                id("A1"),
                Gender::Male,
                DysplasiaGrade::A,
            )]),
            delay: Duration::from_millis(200),
        });
        let timed = TimedRepository::new(slow, Duration::from_millis(20), 2).unwrap();

        match timed.find_by_id(&id("A1")) {
            Err(RepositoryError::Timeout(elapsed)) => assert_eq!(elapsed, timed.timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timed_repository_passes_through() {
        let fast = Arc::new(InMemoryPedigree::from_animals(vec![Animal::new(
            id("A1"),
            Gender::Male,
            DysplasiaGrade::A,
        )]));
        let timed = TimedRepository::new(fast, Duration::from_secs(2), 1).unwrap();

        assert!(timed.find_by_id(&id("A1")).unwrap().is_some());
        assert!(timed.find_by_id(&id("B1")).unwrap().is_none());
    }
}
