use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{PedigreeError, RepositoryError, Result};
use crate::repository::PedigreeRepository;
use crate::types::{Animal, AnimalId};

/// Upper bound on the pre-allocated frontier
const MAX_FRONTIER_CAPACITY: usize = 1024;

/// Ancestors of one root animal, keyed by the generation at which each was
/// first reached. The root itself is present at generation 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AncestryMap {
    root: AnimalId,
    generations: HashMap<AnimalId, u32>,
}

impl AncestryMap {
    fn empty(root: AnimalId) -> Self {
        Self {
            root,
            generations: HashMap::new(),
        }
    }

    pub fn root(&self) -> &AnimalId {
        &self.root
    }

    pub fn generation_of(&self, id: &AnimalId) -> Option<u32> {
        self.generations.get(id).copied()
    }

    pub fn contains(&self, id: &AnimalId) -> bool {
        self.generations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnimalId, u32)> {
        self.generations.iter().map(|(id, generation)| (id, *generation))
    }
}

/// Identifiers present in both maps. Empty means no shared ancestry within
/// the search horizon.
pub fn common_ancestors(a: &AncestryMap, b: &AncestryMap) -> HashSet<AnimalId> {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    smaller
        .generations
        .keys()
        .filter(|id| larger.contains(id))
        .cloned()
        .collect()
}

/// Breadth-first ancestry traversal over a pedigree repository.
///
/// Processing is strictly FIFO, so the first time an ancestor is dequeued is
/// its minimal generation distance. Every identifier is looked up at most once
/// per build, which together with the generation bound guarantees termination
/// on cyclic or self-referencing records.
pub struct AncestryTreeBuilder<'a> {
    repository: &'a dyn PedigreeRepository,
    deadline: Option<Duration>,
}

impl<'a> AncestryTreeBuilder<'a> {
    pub fn new(repository: &'a dyn PedigreeRepository) -> Self {
        Self {
            repository,
            deadline: None,
        }
    }

    /// Fail the build if it runs longer than `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the ancestry map of `root`, resolving the root through the
    /// repository. A root that cannot be resolved yields an empty map.
    pub fn build(&self, root: &AnimalId, max_generations: u32) -> Result<AncestryMap> {
        match self.lookup(root)? {
            Some(animal) => self.build_from(&animal, max_generations),
            None => Ok(AncestryMap::empty(root.clone())),
        }
    }

    /// Build the ancestry map of an already resolved root animal
    pub fn build_from(&self, root: &Animal, max_generations: u32) -> Result<AncestryMap> {
        let started = Instant::now();
        let mut generations = HashMap::new();
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::with_capacity(frontier_capacity(max_generations));
        let mut lookups = 0usize;
        let mut pruned = 0usize;

        generations.insert(root.id.clone(), 0);
        visited.insert(root.id.clone());
        if max_generations > 0 {
            for parent in root.parents() {
                frontier.push_back((parent.clone(), 1));
            }
        }

        while let Some((id, generation)) = frontier.pop_front() {
            if generation > max_generations || !visited.insert(id.clone()) {
                continue;
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() > deadline {
                    return Err(PedigreeError::TraversalDeadlineExceeded {
                        root: root.id.clone(),
                        deadline,
                    });
                }
            }

            lookups += 1;
            let Some(animal) = self.lookup(&id)? else {
                pruned += 1;
                continue;
            };

            generations.insert(id, generation);
            if generation < max_generations {
                for parent in animal.parents() {
                    if !visited.contains(parent) {
                        frontier.push_back((parent.clone(), generation + 1));
                    }
                }
            }
        }

        debug!(
            root = %root.id,
            ancestors = generations.len() - 1,
            lookups,
            pruned,
            elapsed = ?started.elapsed(),
            "Built ancestry map"
        );

        Ok(AncestryMap {
            root: root.id.clone(),
            generations,
        })
    }

    /// Resolve one node. Missing records and timed-out lookups prune the
    /// branch; an unavailable store aborts the build.
    fn lookup(&self, id: &AnimalId) -> Result<Option<Animal>> {
        match self.repository.find_by_id(id) {
            Ok(animal) => {
                if animal.is_none() {
                    debug!(animal = %id, "Ancestor record not found, pruning branch");
                }
                Ok(animal)
            }
            Err(RepositoryError::Timeout(elapsed)) => {
                warn!(animal = %id, ?elapsed, "Ancestor lookup timed out, pruning branch");
                Ok(None)
            }
            Err(err @ RepositoryError::Unavailable(_)) => Err(err.into()),
        }
    }
}

fn frontier_capacity(max_generations: u32) -> usize {
    // A full pedigree holds 2^g ancestors at generation g.
    1usize
        .checked_shl(max_generations.min(16))
        .unwrap_or(MAX_FRONTIER_CAPACITY)
        .min(MAX_FRONTIER_CAPACITY)
}
