use std::time::Duration;
use tracing::debug;

use crate::ancestry::{common_ancestors, AncestryTreeBuilder};
use crate::error::Result;
use crate::repository::PedigreeRepository;
use crate::types::{Animal, Relatedness, RelationshipBasis};

/// Coefficient-of-relationship calculator.
///
/// Known relationships short-circuit in this order: same animal (100%),
/// parent/child (50%), full siblings (50%), half siblings (25%). Anything else
/// falls back to Wright's sum `0.5^(n1 + n2)` over common ancestors, where each
/// ancestor contributes exactly one term at its minimal generation distance on
/// each side.
pub struct RelatednessCalculator<'a> {
    repository: &'a dyn PedigreeRepository,
    deadline: Option<Duration>,
}

impl<'a> RelatednessCalculator<'a> {
    pub fn new(repository: &'a dyn PedigreeRepository) -> Self {
        Self {
            repository,
            deadline: None,
        }
    }

    /// Bound each ancestry traversal by a wall-clock deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Relatedness percentage in [0, 100], unrounded
    pub fn relatedness(&self, a: &Animal, b: &Animal, max_generations: u32) -> Result<Relatedness> {
        if let Some(known) = known_relationship(a, b) {
            debug!(a = %a.id, b = %b.id, basis = %known.basis, "Known relationship");
            return Ok(known);
        }

        let mut builder = AncestryTreeBuilder::new(self.repository);
        if let Some(deadline) = self.deadline {
            builder = builder.with_deadline(deadline);
        }

        // The two trees are independent; each traversal stays sequential.
        let (ancestry_a, ancestry_b) = rayon::join(
            || builder.build_from(a, max_generations),
            || builder.build_from(b, max_generations),
        );
        let ancestry_a = ancestry_a?;
        let ancestry_b = ancestry_b?;

        let mut shared: Vec<_> = common_ancestors(&ancestry_a, &ancestry_b)
            .into_iter()
            .collect();
        if shared.is_empty() {
            return Ok(Relatedness {
                percentage: 0.0,
                basis: RelationshipBasis::Unrelated,
            });
        }

        // Fixed summation order keeps the result bit-identical across calls
        // and argument orders.
        shared.sort();
        let coefficient: f64 = shared
            .iter()
            .filter_map(|ancestor| {
                let n1 = ancestry_a.generation_of(ancestor)?;
                let n2 = ancestry_b.generation_of(ancestor)?;
                Some(0.5f64.powi((n1 + n2) as i32))
            })
            .sum();

        debug!(
            a = %a.id,
            b = %b.id,
            common_ancestors = shared.len(),
            coefficient,
            "Computed relatedness from common ancestors"
        );

        Ok(Relatedness {
            percentage: coefficient * 100.0,
            basis: RelationshipBasis::CommonAncestors {
                count: shared.len(),
            },
        })
    }
}

/// Relationships answered directly from the two records
fn known_relationship(a: &Animal, b: &Animal) -> Option<Relatedness> {
    let found = |percentage: f64, basis: RelationshipBasis| Some(Relatedness { percentage, basis });

    if a.id == b.id {
        return found(100.0, RelationshipBasis::Identical);
    }
    if a.is_parent_of(b) || b.is_parent_of(a) {
        return found(50.0, RelationshipBasis::ParentChild);
    }

    // Siblings need at least one known shared parent. A parent slot that is
    // unknown on both sides counts as identical for the full-sibling rule.
    let same_sire = a.sire.is_some() && a.sire == b.sire;
    let same_dam = a.dam.is_some() && a.dam == b.dam;
    if !(same_sire || same_dam) {
        return None;
    }
    if a.sire == b.sire && a.dam == b.dam {
        found(50.0, RelationshipBasis::FullSiblings)
    } else {
        found(25.0, RelationshipBasis::HalfSiblings)
    }
}
