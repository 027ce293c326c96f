use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{PedigreeError, Result};
use crate::parsers::PedigreeParser;
use crate::types::Animal;

/// JSON pedigree export: an array of animal records
pub struct JsonPedigreeParser;

impl JsonPedigreeParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path) -> Result<Vec<Animal>> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| {
            PedigreeError::InvalidInput(format!("{}: {}", path.display(), e))
        })
    }
}

impl PedigreeParser for JsonPedigreeParser {
    fn parse(&self, path: &Path) -> Result<Vec<Animal>> {
        JsonPedigreeParser::parse(self, path)
    }
}
