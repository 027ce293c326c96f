use rayon::prelude::*;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dysplasia::DysplasiaEvaluator;
use crate::error::{PedigreeError, Result};
use crate::relatedness::RelatednessCalculator;
use crate::repository::PedigreeRepository;
use crate::types::{Animal, AnimalId, BreedingPolicy, CompatibilityReport};

/// Breeding compatibility checker combining gender, relatedness and
/// dysplasia criteria under one policy snapshot
pub struct CompatibilityChecker<'a> {
    repository: &'a dyn PedigreeRepository,
    deadline: Option<Duration>,
}

impl<'a> CompatibilityChecker<'a> {
    pub fn new(repository: &'a dyn PedigreeRepository) -> Self {
        Self {
            repository,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Resolve a caller-supplied animal. Unlike ancestors, a missing or
    /// timed-out primary animal fails the request.
    pub fn resolve(&self, id: &AnimalId) -> Result<Animal> {
        match self.repository.find_by_id(id) {
            Ok(Some(animal)) => Ok(animal),
            Ok(None) => Err(PedigreeError::NotFound(id.clone())),
            Err(err) => Err(PedigreeError::from_root_lookup(id, err)),
        }
    }

    /// Fetch both primary animals concurrently
    pub fn resolve_pair(&self, a: &AnimalId, b: &AnimalId) -> Result<(Animal, Animal)> {
        let (animal_a, animal_b) = rayon::join(|| self.resolve(a), || self.resolve(b));
        Ok((animal_a?, animal_b?))
    }

    pub fn evaluate(
        &self,
        a: &AnimalId,
        b: &AnimalId,
        policy: &BreedingPolicy,
    ) -> Result<CompatibilityReport> {
        let (animal_a, animal_b) = self.resolve_pair(a, b)?;
        self.evaluate_animals(&animal_a, &animal_b, policy)
    }

    pub fn evaluate_animals(
        &self,
        a: &Animal,
        b: &Animal,
        policy: &BreedingPolicy,
    ) -> Result<CompatibilityReport> {
        let gender_compatible = a.gender != b.gender;

        let relatedness = self
            .calculator()
            .relatedness(a, b, policy.max_generations)?;
        let relatedness_compatible = relatedness.percentage <= policy.inbreeding_limit;

        let dysplasia_compatible =
            DysplasiaEvaluator::new(policy).compatible(a.dysplasia_grade, b.dysplasia_grade);

        let overall_compatible = gender_compatible && relatedness_compatible && dysplasia_compatible;

        debug!(
            a = %a.id,
            b = %b.id,
            gender_compatible,
            relatedness = relatedness.percentage,
            relatedness_compatible,
            dysplasia_compatible,
            overall_compatible,
            "Evaluated pairing"
        );

        Ok(CompatibilityReport {
            animal_a: a.id.clone(),
            animal_b: b.id.clone(),
            gender_compatible,
            relatedness: relatedness.percentage,
            basis: relatedness.basis,
            relatedness_compatible,
            dysplasia_compatible,
            overall_compatible,
        })
    }

    /// Evaluate `subject` against every candidate in parallel.
    ///
    /// The subject itself and inactive candidates are skipped, as are
    /// candidates that are missing or whose lookup timed out. Results are
    /// ordered compatible first, then by ascending relatedness.
    pub fn rank_candidates(
        &self,
        subject: &AnimalId,
        candidates: &[AnimalId],
        policy: &BreedingPolicy,
        on_progress: &(dyn Fn() + Sync),
    ) -> Result<Vec<CompatibilityReport>> {
        let subject = self.resolve(subject)?;

        let evaluated: Vec<Option<CompatibilityReport>> = candidates
            .par_iter()
            .map(|candidate_id| {
                let outcome = if candidate_id == &subject.id {
                    Ok(None)
                } else {
                    match self.resolve(candidate_id) {
                        Ok(candidate) if !candidate.active => Ok(None),
                        Ok(candidate) => {
                            self.evaluate_animals(&subject, &candidate, policy).map(Some)
                        }
                        Err(err @ (PedigreeError::NotFound(_) | PedigreeError::LookupTimeout { .. })) => {
                            warn!(candidate = %candidate_id, error = %err, "Skipping unresolvable candidate");
                            Ok(None)
                        }
                        Err(err) => Err(err),
                    }
                };
                on_progress();
                outcome
            })
            .collect::<Result<_>>()?;

        let mut reports: Vec<CompatibilityReport> = evaluated.into_iter().flatten().collect();
        reports.sort_by(rank_order);

        info!(
            subject = %subject.id,
            candidates = candidates.len(),
            evaluated = reports.len(),
            compatible = reports.iter().filter(|r| r.overall_compatible).count(),
            "Ranked breeding candidates"
        );

        Ok(reports)
    }

    fn calculator(&self) -> RelatednessCalculator<'a> {
        let calculator = RelatednessCalculator::new(self.repository);
        match self.deadline {
            Some(deadline) => calculator.with_deadline(deadline),
            None => calculator,
        }
    }
}

fn rank_order(a: &CompatibilityReport, b: &CompatibilityReport) -> Ordering {
    b.overall_compatible
        .cmp(&a.overall_compatible)
        .then_with(|| a.relatedness.total_cmp(&b.relatedness))
        .then_with(|| a.animal_b.cmp(&b.animal_b))
}
