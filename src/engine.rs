//! Boundary operations of the compatibility engine.
//!
//! Every operation loads the active policy once and passes that snapshot down,
//! so a concurrent policy replace never changes the rules mid-computation.

use std::sync::Arc;
use tracing::info;

use crate::compatibility::CompatibilityChecker;
use crate::config::EngineSettings;
use crate::dysplasia::DysplasiaEvaluator;
use crate::error::{PedigreeError, Result};
use crate::relatedness::RelatednessCalculator;
use crate::repository::{PedigreeRepository, PolicyStore, TimedRepository};
use crate::types::{
    AnimalId, BreedingPolicy, CompatibilityReport, DysplasiaGrade, PolicyUpdate,
    RelatednessReport,
};

pub struct PedigreeEngine {
    repository: Arc<dyn PedigreeRepository>,
    policies: Arc<dyn PolicyStore>,
    settings: EngineSettings,
}

impl PedigreeEngine {
    pub fn new(
        repository: Arc<dyn PedigreeRepository>,
        policies: Arc<dyn PolicyStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repository,
            policies,
            settings,
        }
    }

    /// Like `new`, but every repository lookup is bounded by the configured
    /// lookup timeout
    pub fn with_lookup_timeout<R: PedigreeRepository + 'static>(
        repository: Arc<R>,
        policies: Arc<dyn PolicyStore>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let repository: Arc<dyn PedigreeRepository> = match settings.lookup_timeout() {
            Some(timeout) => Arc::new(TimedRepository::new(
                repository,
                timeout,
                settings.lookup_threads,
            )?),
            None => repository,
        };
        Ok(Self::new(repository, policies, settings))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Relatedness between two animals, as a percentage
    pub fn compute_relatedness(&self, a: &str, b: &str) -> Result<RelatednessReport> {
        let (a, b) = (parse_id(a)?, parse_id(b)?);
        let policy = self.active_policy()?;

        let checker = self.checker();
        let (animal_a, animal_b) = checker.resolve_pair(&a, &b)?;

        let mut calculator = RelatednessCalculator::new(self.repository.as_ref());
        if let Some(deadline) = self.settings.traversal_deadline() {
            calculator = calculator.with_deadline(deadline);
        }
        let relatedness = calculator.relatedness(&animal_a, &animal_b, policy.max_generations)?;

        info!(a = %a, b = %b, relatedness = relatedness.percentage, "Computed relatedness");
        Ok(RelatednessReport {
            animal_a: a,
            animal_b: b,
            relatedness: relatedness.percentage,
            basis: relatedness.basis,
        })
    }

    /// Whether two dysplasia grades may be paired under the active policy
    pub fn evaluate_dysplasia(&self, grade_a: &str, grade_b: &str) -> Result<bool> {
        let grade_a: DysplasiaGrade = grade_a.parse()?;
        let grade_b: DysplasiaGrade = grade_b.parse()?;
        let policy = self.active_policy()?;
        Ok(DysplasiaEvaluator::new(&policy).compatible(grade_a, grade_b))
    }

    /// Full compatibility verdict for a pairing
    pub fn evaluate_compatibility(&self, a: &str, b: &str) -> Result<CompatibilityReport> {
        let (a, b) = (parse_id(a)?, parse_id(b)?);
        let policy = self.active_policy()?;
        let report = self.checker().evaluate(&a, &b, &policy)?;

        info!(
            a = %a,
            b = %b,
            overall_compatible = report.overall_compatible,
            "Evaluated compatibility"
        );
        Ok(report)
    }

    /// Rank `candidates` as partners for `subject`
    pub fn find_partners(
        &self,
        subject: &str,
        candidates: &[AnimalId],
        on_progress: &(dyn Fn() + Sync),
    ) -> Result<Vec<CompatibilityReport>> {
        let subject = parse_id(subject)?;
        let policy = self.active_policy()?;
        self.checker()
            .rank_candidates(&subject, candidates, &policy, on_progress)
    }

    /// The active policy, materialising the default record if none exists
    pub fn active_policy(&self) -> Result<Arc<BreedingPolicy>> {
        Ok(self.policies.get_or_create_default()?)
    }

    /// Apply a partial or full update and store the result as one record
    pub fn replace_policy(&self, update: &PolicyUpdate) -> Result<Arc<BreedingPolicy>> {
        if update.is_empty() {
            return Err(PedigreeError::InvalidInput(
                "policy update contains no fields".to_string(),
            ));
        }
        let stored = self
            .policies
            .update_policy(&|current: &BreedingPolicy| current.apply(update))?;

        info!(
            inbreeding_limit = stored.inbreeding_limit,
            max_generations = stored.max_generations,
            "Replaced breeding policy"
        );
        Ok(stored)
    }

    fn checker(&self) -> CompatibilityChecker<'_> {
        let checker = CompatibilityChecker::new(self.repository.as_ref());
        match self.settings.traversal_deadline() {
            Some(deadline) => checker.with_deadline(deadline),
            None => checker,
        }
    }
}

fn parse_id(raw: &str) -> Result<AnimalId> {
    AnimalId::new(raw)
}
