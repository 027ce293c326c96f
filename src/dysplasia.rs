use tracing::trace;

use crate::types::{BreedingPolicy, DysplasiaGrade, DysplasiaMatrix};

/// Hip dysplasia pairing check against the policy matrix.
///
/// Reads `matrix[grade_a][grade_b]` only. Pairings that were never authored
/// are incompatible.
pub struct DysplasiaEvaluator<'a> {
    matrix: Option<&'a DysplasiaMatrix>,
}

impl<'a> DysplasiaEvaluator<'a> {
    pub fn new(policy: &'a BreedingPolicy) -> Self {
        Self {
            matrix: Some(&policy.dysplasia_matrix),
        }
    }

    pub fn from_matrix(matrix: Option<&'a DysplasiaMatrix>) -> Self {
        Self { matrix }
    }

    pub fn compatible(&self, grade_a: DysplasiaGrade, grade_b: DysplasiaGrade) -> bool {
        let allowed = self
            .matrix
            .map(|matrix| matrix.get(grade_a, grade_b))
            .unwrap_or(false);
        trace!(%grade_a, %grade_b, allowed, "Dysplasia matrix lookup");
        allowed
    }
}
