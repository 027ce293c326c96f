use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{PedigreeError, Result};

lazy_static! {
    static ref ANIMAL_ID_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,63}$").expect("valid animal id pattern");
}

/// Default inbreeding limit, in percent
pub const DEFAULT_INBREEDING_LIMIT: f64 = 12.5;

/// Default number of generations searched for common ancestors
pub const DEFAULT_MAX_GENERATIONS: u32 = 5;

/// Accepted range for `BreedingPolicy::max_generations`
pub const MAX_GENERATIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// Registry identifier of an animal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnimalId(String);

impl AnimalId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PedigreeError::InvalidInput(
                "animal identifier is empty".to_string(),
            ));
        }
        if !ANIMAL_ID_PATTERN.is_match(trimmed) {
            return Err(PedigreeError::InvalidInput(format!(
                "malformed animal identifier: {:?}",
                raw
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AnimalId {
    type Err = PedigreeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for AnimalId {
    type Error = PedigreeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AnimalId> for String {
    fn from(id: AnimalId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = PedigreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" => Ok(Gender::Male),
            "f" | "female" => Ok(Gender::Female),
            other => Err(PedigreeError::InvalidInput(format!(
                "unknown gender: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

/// Hip dysplasia grade, A (best) through E (worst)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    clap::ValueEnum,
)]
pub enum DysplasiaGrade {
    A, // normal
    B, // normal
    C, // mild
    D, // moderate
    E, // severe
}

impl DysplasiaGrade {
    pub const ALL: [DysplasiaGrade; 5] = [
        DysplasiaGrade::A,
        DysplasiaGrade::B,
        DysplasiaGrade::C,
        DysplasiaGrade::D,
        DysplasiaGrade::E,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_normal(self) -> bool {
        matches!(self, DysplasiaGrade::A | DysplasiaGrade::B)
    }

    pub fn description(self) -> &'static str {
        match self {
            DysplasiaGrade::A | DysplasiaGrade::B => "normal",
            DysplasiaGrade::C => "mild",
            DysplasiaGrade::D => "moderate",
            DysplasiaGrade::E => "severe",
        }
    }

    pub fn letter(self) -> char {
        match self {
            DysplasiaGrade::A => 'A',
            DysplasiaGrade::B => 'B',
            DysplasiaGrade::C => 'C',
            DysplasiaGrade::D => 'D',
            DysplasiaGrade::E => 'E',
        }
    }
}

impl FromStr for DysplasiaGrade {
    type Err = PedigreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(DysplasiaGrade::A),
            "B" => Ok(DysplasiaGrade::B),
            "C" => Ok(DysplasiaGrade::C),
            "D" => Ok(DysplasiaGrade::D),
            "E" => Ok(DysplasiaGrade::E),
            _ => Err(PedigreeError::InvalidInput(format!(
                "unknown dysplasia grade: {:?} (expected A-E)",
                s
            ))),
        }
    }
}

impl fmt::Display for DysplasiaGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

// Grades are persisted as bare letters, including as table keys.
impl Serialize for DysplasiaGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        serializer.serialize_str(self.letter().encode_utf8(&mut buf))
    }
}

impl<'de> Deserialize<'de> for DysplasiaGrade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A registered animal as returned by the pedigree repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub id: AnimalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub gender: Gender,
    #[serde(default)]
    pub sire: Option<AnimalId>,
    #[serde(default)]
    pub dam: Option<AnimalId>,
    pub dysplasia_grade: DysplasiaGrade,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Animal {
    pub fn new(id: AnimalId, gender: Gender, dysplasia_grade: DysplasiaGrade) -> Self {
        Self {
            id,
            name: None,
            gender,
            sire: None,
            dam: None,
            dysplasia_grade,
            active: true,
        }
    }

    pub fn with_sire(mut self, sire: AnimalId) -> Self {
        self.sire = Some(sire);
        self
    }

    pub fn with_dam(mut self, dam: AnimalId) -> Self {
        self.dam = Some(dam);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Known parent references, sire first
    pub fn parents(&self) -> impl Iterator<Item = &AnimalId> {
        self.sire.iter().chain(self.dam.iter())
    }

    pub fn is_parent_of(&self, other: &Animal) -> bool {
        other.sire.as_ref() == Some(&self.id) || other.dam.as_ref() == Some(&self.id)
    }
}

/// Fixed 5x5 table of allowed dysplasia pairings, indexed `[grade_a][grade_b]`.
///
/// Cells never authored are `false`. The table is read directionally; nothing
/// forces it to be symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GradeTable", into = "GradeTable")]
pub struct DysplasiaMatrix {
    cells: [[bool; 5]; 5],
}

/// Persisted layout of the matrix: rows keyed by grade letter
type GradeTable = BTreeMap<DysplasiaGrade, BTreeMap<DysplasiaGrade, bool>>;

impl DysplasiaMatrix {
    /// A matrix with every pairing forbidden
    pub fn deny_all() -> Self {
        Self {
            cells: [[false; 5]; 5],
        }
    }

    pub fn get(&self, a: DysplasiaGrade, b: DysplasiaGrade) -> bool {
        self.cells[a.index()][b.index()]
    }

    pub fn set(&mut self, a: DysplasiaGrade, b: DysplasiaGrade, allowed: bool) {
        self.cells[a.index()][b.index()] = allowed;
    }

    /// Set both `[a][b]` and `[b][a]`
    pub fn set_symmetric(&mut self, a: DysplasiaGrade, b: DysplasiaGrade, allowed: bool) {
        self.set(a, b, allowed);
        self.set(b, a, allowed);
    }

    pub fn is_symmetric(&self) -> bool {
        DysplasiaGrade::ALL.iter().all(|&a| {
            DysplasiaGrade::ALL
                .iter()
                .all(|&b| self.get(a, b) == self.get(b, a))
        })
    }

    /// Allowed pairings as `(row, column)` grade pairs, row-major
    pub fn allowed_pairs(&self) -> Vec<(DysplasiaGrade, DysplasiaGrade)> {
        DysplasiaGrade::ALL
            .iter()
            .flat_map(|&a| DysplasiaGrade::ALL.iter().map(move |&b| (a, b)))
            .filter(|&(a, b)| self.get(a, b))
            .collect()
    }
}

impl Default for DysplasiaMatrix {
    /// Only normal hips (A or B) on both sides are allowed
    fn default() -> Self {
        let mut matrix = Self::deny_all();
        for a in DysplasiaGrade::ALL {
            for b in DysplasiaGrade::ALL {
                matrix.set(a, b, a.is_normal() && b.is_normal());
            }
        }
        matrix
    }
}

impl From<GradeTable> for DysplasiaMatrix {
    fn from(table: GradeTable) -> Self {
        let mut matrix = Self::deny_all();
        for (a, row) in table {
            for (b, allowed) in row {
                matrix.set(a, b, allowed);
            }
        }
        matrix
    }
}

impl From<DysplasiaMatrix> for GradeTable {
    fn from(matrix: DysplasiaMatrix) -> Self {
        DysplasiaGrade::ALL
            .iter()
            .map(|&a| {
                let row = DysplasiaGrade::ALL
                    .iter()
                    .map(|&b| (b, matrix.get(a, b)))
                    .collect();
                (a, row)
            })
            .collect()
    }
}

/// The active breeding policy record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingPolicy {
    /// A stored record without a matrix forbids every pairing
    #[serde(default = "DysplasiaMatrix::deny_all")]
    pub dysplasia_matrix: DysplasiaMatrix,
    #[serde(default = "default_inbreeding_limit")]
    pub inbreeding_limit: f64,
    #[serde(default = "default_max_generations")]
    pub max_generations: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_inbreeding_limit() -> f64 {
    DEFAULT_INBREEDING_LIMIT
}

fn default_max_generations() -> u32 {
    DEFAULT_MAX_GENERATIONS
}

impl Default for BreedingPolicy {
    fn default() -> Self {
        Self {
            dysplasia_matrix: DysplasiaMatrix::default(),
            inbreeding_limit: DEFAULT_INBREEDING_LIMIT,
            max_generations: DEFAULT_MAX_GENERATIONS,
            active: true,
        }
    }
}

impl BreedingPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.inbreeding_limit.is_finite() || !(0.0..=100.0).contains(&self.inbreeding_limit)
        {
            return Err(PedigreeError::InvalidInput(format!(
                "inbreeding limit must be within [0, 100], got {}",
                self.inbreeding_limit
            )));
        }
        if !MAX_GENERATIONS_RANGE.contains(&self.max_generations) {
            return Err(PedigreeError::InvalidInput(format!(
                "max generations must be within [{}, {}], got {}",
                MAX_GENERATIONS_RANGE.start(),
                MAX_GENERATIONS_RANGE.end(),
                self.max_generations
            )));
        }
        Ok(())
    }

    /// Produce the record that results from applying `update` on top of this one
    pub fn apply(&self, update: &PolicyUpdate) -> Result<BreedingPolicy> {
        let next = BreedingPolicy {
            dysplasia_matrix: update.dysplasia_matrix.unwrap_or(self.dysplasia_matrix),
            inbreeding_limit: update.inbreeding_limit.unwrap_or(self.inbreeding_limit),
            max_generations: update.max_generations.unwrap_or(self.max_generations),
            active: true,
        };
        next.validate()?;
        Ok(next)
    }
}

/// Partial or full replacement of the active policy; absent fields are kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbreeding_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_generations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dysplasia_matrix: Option<DysplasiaMatrix>,
}

impl PolicyUpdate {
    pub fn is_empty(&self) -> bool {
        self.dysplasia_matrix.is_none()
            && self.inbreeding_limit.is_none()
            && self.max_generations.is_none()
    }
}

impl From<&BreedingPolicy> for PolicyUpdate {
    fn from(policy: &BreedingPolicy) -> Self {
        Self {
            inbreeding_limit: Some(policy.inbreeding_limit),
            max_generations: Some(policy.max_generations),
            dysplasia_matrix: Some(policy.dysplasia_matrix),
        }
    }
}

/// Which rule produced a relatedness value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipBasis {
    Identical,
    ParentChild,
    FullSiblings,
    HalfSiblings,
    CommonAncestors { count: usize },
    Unrelated,
}

impl fmt::Display for RelationshipBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipBasis::Identical => f.write_str("same animal"),
            RelationshipBasis::ParentChild => f.write_str("parent/child"),
            RelationshipBasis::FullSiblings => f.write_str("full siblings"),
            RelationshipBasis::HalfSiblings => f.write_str("half siblings"),
            RelationshipBasis::CommonAncestors { count } => {
                write!(f, "{} common ancestor(s)", count)
            }
            RelationshipBasis::Unrelated => f.write_str("no common ancestry"),
        }
    }
}

/// Unrounded relatedness percentage and the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relatedness {
    pub percentage: f64,
    pub basis: RelationshipBasis,
}

/// Relatedness between two animals as returned at the boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatednessReport {
    pub animal_a: AnimalId,
    pub animal_b: AnimalId,
    #[serde(serialize_with = "serialize_rounded")]
    pub relatedness: f64,
    pub basis: RelationshipBasis,
}

impl RelatednessReport {
    pub fn rounded(&self) -> f64 {
        round_percentage(self.relatedness)
    }
}

/// Aggregate compatibility verdict for a candidate pairing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityReport {
    pub animal_a: AnimalId,
    pub animal_b: AnimalId,
    pub gender_compatible: bool,
    #[serde(serialize_with = "serialize_rounded")]
    pub relatedness: f64,
    pub basis: RelationshipBasis,
    pub relatedness_compatible: bool,
    pub dysplasia_compatible: bool,
    pub overall_compatible: bool,
}

impl CompatibilityReport {
    pub fn rounded_relatedness(&self) -> f64 {
        round_percentage(self.relatedness)
    }

    /// Reasons the pairing was rejected, empty when compatible
    pub fn rejection_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if !self.gender_compatible {
            reasons.push("Both animals have the same gender".to_string());
        }
        if !self.relatedness_compatible {
            reasons.push(format!(
                "Relatedness {:.2}% exceeds the inbreeding limit",
                self.rounded_relatedness()
            ));
        }
        if !self.dysplasia_compatible {
            reasons.push("Dysplasia grades are not an allowed pairing".to_string());
        }
        reasons
    }
}

/// Round a percentage to two decimal places for presentation
pub fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_percentage(*value))
}
