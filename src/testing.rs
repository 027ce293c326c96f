//! Pedigree fixtures shared by the unit tests.

use std::collections::HashSet;

use crate::error::RepositoryError;
use crate::repository::{InMemoryPedigree, PedigreeRepository, RepositoryResult};
use crate::types::{Animal, AnimalId, DysplasiaGrade, Gender};

pub fn id(raw: &str) -> AnimalId {
    AnimalId::new(raw).unwrap()
}

/// Small builder for hand-drawn pedigrees
#[derive(Default)]
pub struct PedigreeFixture {
    pedigree: InMemoryPedigree,
}

impl PedigreeFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn founder(self, raw: &str, gender: Gender) -> Self {
        self.pedigree
            .insert(Animal::new(id(raw), gender, DysplasiaGrade::A));
        self
    }

    pub fn child(self, raw: &str, gender: Gender, sire: Option<&str>, dam: Option<&str>) -> Self {
        let mut animal = Animal::new(id(raw), gender, DysplasiaGrade::A);
        animal.sire = sire.map(id);
        animal.dam = dam.map(id);
        self.pedigree.insert(animal);
        self
    }

    pub fn graded(self, raw: &str, grade: DysplasiaGrade) -> Self {
        if let Some(mut animal) = self.pedigree.find_by_id(&id(raw)).unwrap() {
            animal.dysplasia_grade = grade;
            self.pedigree.insert(animal);
        }
        self
    }

    pub fn build(self) -> InMemoryPedigree {
        self.pedigree
    }
}

/// Repository double that fails lookups for selected identifiers
pub struct FlakyRepository {
    pub inner: InMemoryPedigree,
    pub timeouts: HashSet<AnimalId>,
    pub unavailable: HashSet<AnimalId>,
}

impl FlakyRepository {
    pub fn new(inner: InMemoryPedigree) -> Self {
        Self {
            inner,
            timeouts: HashSet::new(),
            unavailable: HashSet::new(),
        }
    }

    pub fn timing_out(mut self, raw: &str) -> Self {
        self.timeouts.insert(id(raw));
        self
    }

    pub fn failing(mut self, raw: &str) -> Self {
        self.unavailable.insert(id(raw));
        self
    }
}

impl PedigreeRepository for FlakyRepository {
    fn find_by_id(&self, animal: &AnimalId) -> RepositoryResult<Option<Animal>> {
        if self.timeouts.contains(animal) {
            return Err(RepositoryError::Timeout(std::time::Duration::from_millis(1)));
        }
        if self.unavailable.contains(animal) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        self.inner.find_by_id(animal)
    }
}
