use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{PedigreeError, Result};
use crate::parsers::{parse_flag, PedigreeParser};
use crate::types::{Animal, AnimalId};

/// Delimited pedigree export (comma, tab or semicolon separated)
pub struct CsvPedigreeParser;

impl CsvPedigreeParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, path: &Path) -> Result<Vec<Animal>> {
        let delimiter = self.detect_delimiter(path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .comment(Some(b'#'))
            .from_path(path)
            .map_err(|e| self.error(path, 0, e))?;

        let headers = reader.headers().map_err(|e| self.error(path, 1, e))?.clone();
        let columns = self.map_columns(&headers)?;

        let mut animals = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.error(path, i + 2, e))?;
            let line = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(i + 2);
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            let animal = self
                .parse_record(&record, &columns)
                .map_err(|e| self.error(path, line, e))?;
            animals.push(animal);
        }

        Ok(animals)
    }

    fn detect_delimiter(&self, path: &Path) -> Result<u8> {
        let file = File::open(path)?;
        let mut first_line = String::new();
        BufReader::new(file).read_line(&mut first_line)?;

        let delimiter = [b'\t', b';', b',']
            .into_iter()
            .max_by_key(|&d| first_line.bytes().filter(|&b| b == d).count())
            .unwrap_or(b',');
        Ok(delimiter)
    }

    fn map_columns(&self, headers: &StringRecord) -> Result<HashMap<&'static str, usize>> {
        let mut mapping = HashMap::new();

        for (i, header) in headers.iter().enumerate() {
            let column = match header.trim().to_lowercase().as_str() {
                "id" | "animal_id" | "registration" | "reg_no" => "id",
                "name" | "call_name" => "name",
                "gender" | "sex" => "gender",
                "sire" | "sire_id" | "father" => "sire",
                "dam" | "dam_id" | "mother" => "dam",
                "dysplasia_grade" | "dysplasia" | "hd" | "hd_grade" | "grade" => "grade",
                "active" | "is_active" => "active",
                _ => continue,
            };
            mapping.insert(column, i);
        }

        for required in ["id", "gender", "grade"] {
            if !mapping.contains_key(required) {
                return Err(PedigreeError::InvalidInput(format!(
                    "Required column '{}' not found",
                    required
                )));
            }
        }

        Ok(mapping)
    }

    fn parse_record(
        &self,
        record: &StringRecord,
        columns: &HashMap<&'static str, usize>,
    ) -> Result<Animal> {
        let mut animal = Animal::new(
            AnimalId::new(cell(record, columns, "id"))?,
            cell(record, columns, "gender").parse()?,
            cell(record, columns, "grade").parse()?,
        );
        animal.sire = parent_id(cell(record, columns, "sire"))?;
        animal.dam = parent_id(cell(record, columns, "dam"))?;
        animal.active = parse_flag(cell(record, columns, "active"), true)?;

        let name = cell(record, columns, "name");
        if !name.is_empty() {
            animal.name = Some(name.to_string());
        }

        Ok(animal)
    }

    fn error(&self, path: &Path, line: usize, err: impl std::fmt::Display) -> PedigreeError {
        PedigreeError::InvalidInput(format!("{}:{}: {}", path.display(), line, err))
    }
}

fn cell<'r>(record: &'r StringRecord, columns: &HashMap<&'static str, usize>, name: &str) -> &'r str {
    columns
        .get(name)
        .and_then(|&idx| record.get(idx))
        .unwrap_or("")
}

/// Empty cells and the usual placeholders mean an unknown parent
fn parent_id(raw: &str) -> Result<Option<AnimalId>> {
    match raw {
        "" | "-" | "0" | "unknown" => Ok(None),
        raw => AnimalId::new(raw).map(Some),
    }
}

impl PedigreeParser for CsvPedigreeParser {
    fn parse(&self, path: &Path) -> Result<Vec<Animal>> {
        CsvPedigreeParser::parse(self, path)
    }
}
