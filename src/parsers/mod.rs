//! Pedigree record loading.
//!
//! Persistence proper is owned by the surrounding system; these parsers let
//! the CLI and tests populate an in-memory registry from exported files.

use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{PedigreeError, Result};
use crate::repository::InMemoryPedigree;
use crate::types::Animal;

mod csv_pedigree;
mod json_pedigree;

pub use csv_pedigree::CsvPedigreeParser;
pub use json_pedigree::JsonPedigreeParser;

/// Supported pedigree export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedigreeFormat {
    Csv,
    Tsv,
    Json,
}

impl PedigreeFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(PedigreeFormat::Csv),
            "tsv" | "txt" => Ok(PedigreeFormat::Tsv),
            "json" => Ok(PedigreeFormat::Json),
            _ => Err(PedigreeError::InvalidInput(format!(
                "unsupported pedigree file format: {}",
                path.display()
            ))),
        }
    }
}

/// A source of animal records
pub trait PedigreeParser {
    fn parse(&self, path: &Path) -> Result<Vec<Animal>>;
}

/// Picks a parser from the file extension
#[derive(Default)]
pub struct PedigreeFileParser;

impl PedigreeFileParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path) -> Result<Vec<Animal>> {
        let parser: Box<dyn PedigreeParser> = match PedigreeFormat::from_path(path)? {
            PedigreeFormat::Csv | PedigreeFormat::Tsv => Box::new(CsvPedigreeParser::new()),
            PedigreeFormat::Json => Box::new(JsonPedigreeParser::new()),
        };
        let animals = parser.parse(path)?;
        check_unique_ids(&animals)?;
        Ok(animals)
    }

    /// Parse `path` into a ready-to-query registry
    pub fn load(&self, path: &Path) -> Result<InMemoryPedigree> {
        let animals = self.parse(path)?;
        info!(
            path = %path.display(),
            animals = animals.len(),
            "Loaded pedigree records"
        );
        Ok(InMemoryPedigree::from_animals(animals))
    }
}

fn check_unique_ids(animals: &[Animal]) -> Result<()> {
    let mut seen = HashSet::with_capacity(animals.len());
    for animal in animals {
        if !seen.insert(&animal.id) {
            return Err(PedigreeError::InvalidInput(format!(
                "duplicate animal identifier: {}",
                animal.id
            )));
        }
    }
    Ok(())
}

/// Interpret an optional yes/no cell; empty means `default`
pub(crate) fn parse_flag(raw: &str, default: bool) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "y" | "active" => Ok(true),
        "0" | "false" | "no" | "n" | "inactive" => Ok(false),
        other => Err(PedigreeError::InvalidInput(format!(
            "invalid active flag: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            PedigreeFormat::from_path(Path::new("kennel.CSV")).unwrap(),
            PedigreeFormat::Csv
        );
        assert_eq!(
            PedigreeFormat::from_path(Path::new("kennel.json")).unwrap(),
            PedigreeFormat::Json
        );
        assert!(PedigreeFormat::from_path(Path::new("kennel.vcf")).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("dupes.csv");
        fs::write(
            &path,
            "id,gender,dysplasia_grade\nREX,male,A\nREX,male,B\n",
        )?;

        assert!(matches!(
            PedigreeFileParser::new().parse(&path),
            Err(PedigreeError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("", true).unwrap());
        assert!(!parse_flag("No", true).unwrap());
        assert!(parse_flag("maybe", true).is_err());
    }
}
