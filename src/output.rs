use anyhow::{Context, Result};
use chrono::Local;
use console::style;
use csv::WriterBuilder;
use serde_json::to_string_pretty;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::*;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Csv,
    Json,
    Tsv,
    All,
}

/// Writes compatibility reports to an output directory
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory {}", output_dir.display())
            })?;
        }

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Generate reports in the given format(s), returning the files written
    pub fn generate(
        &self,
        reports: &[CompatibilityReport],
        format: ReportFormat,
    ) -> Result<Vec<PathBuf>> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut written = Vec::new();

        match format {
            ReportFormat::Html => written.push(self.generate_html_report(reports, &timestamp)?),
            ReportFormat::Csv => written.push(self.generate_delimited_report(reports, &timestamp, b',')?),
            ReportFormat::Json => written.push(self.generate_json_report(reports, &timestamp)?),
            ReportFormat::Tsv => written.push(self.generate_delimited_report(reports, &timestamp, b'\t')?),
            ReportFormat::All => {
                written.push(self.generate_html_report(reports, &timestamp)?);
                written.push(self.generate_delimited_report(reports, &timestamp, b',')?);
                written.push(self.generate_json_report(reports, &timestamp)?);
                written.push(self.generate_delimited_report(reports, &timestamp, b'\t')?);
            }
        }

        Ok(written)
    }

    fn generate_json_report(&self, reports: &[CompatibilityReport], timestamp: &str) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("compatibility_{}.json", timestamp));
        let json = to_string_pretty(reports).context("Failed to serialize reports")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
        Ok(path)
    }

    fn generate_delimited_report(
        &self,
        reports: &[CompatibilityReport],
        timestamp: &str,
        delimiter: u8,
    ) -> Result<PathBuf> {
        let ext = if delimiter == b'\t' { "tsv" } else { "csv" };
        let path = self
            .output_dir
            .join(format!("compatibility_{}.{}", timestamp, ext));

        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        wtr.write_record([
            "animal_a",
            "animal_b",
            "gender_compatible",
            "relatedness",
            "basis",
            "relatedness_compatible",
            "dysplasia_compatible",
            "overall_compatible",
        ])?;

        for report in reports {
            wtr.write_record(&[
                report.animal_a.to_string(),
                report.animal_b.to_string(),
                report.gender_compatible.to_string(),
                format!("{:.2}", report.rounded_relatedness()),
                report.basis.to_string(),
                report.relatedness_compatible.to_string(),
                report.dysplasia_compatible.to_string(),
                report.overall_compatible.to_string(),
            ])?;
        }

        wtr.flush()?;
        Ok(path)
    }

    fn generate_html_report(&self, reports: &[CompatibilityReport], timestamp: &str) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("compatibility_{}.html", timestamp));
        fs::write(&path, self.create_html_content(reports))
            .with_context(|| format!("Failed to write HTML report to {}", path.display()))?;
        Ok(path)
    }

    fn create_html_content(&self, reports: &[CompatibilityReport]) -> String {
        let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let rows: String = reports
            .iter()
            .map(|r| {
                format!(
                    "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{:.2}%</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    if r.overall_compatible { "ok" } else { "rejected" },
                    escape_html(r.animal_a.as_str()),
                    escape_html(r.animal_b.as_str()),
                    yes_no(r.gender_compatible),
                    r.rounded_relatedness(),
                    escape_html(&r.basis.to_string()),
                    yes_no(r.dysplasia_compatible),
                    yes_no(r.overall_compatible),
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Breeding Compatibility Report</title>
    <style>
        body {{ font-family: sans-serif; margin: 2em; }}
        table {{ border-collapse: collapse; }}
        th, td {{ border: 1px solid #ccc; padding: 4px 8px; }}
        tr.ok {{ background: #e8f5e9; }}
        tr.rejected {{ background: #ffebee; }}
    </style>
</head>
<body>
    <h1>Breeding Compatibility Report</h1>
    <p>Generated {}</p>
    <table>
        <tr><th>Animal A</th><th>Animal B</th><th>Gender</th><th>Relatedness</th><th>Basis</th><th>Dysplasia</th><th>Compatible</th></tr>
{}    </table>
</body>
</html>
"#,
            generated, rows
        )
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn check_mark(value: bool) -> String {
    if value {
        style("✓").green().bold().to_string()
    } else {
        style("✗").red().bold().to_string()
    }
}

/// Console rendering of a single verdict
pub fn render_compatibility(report: &CompatibilityReport) -> String {
    let mut out = format!(
        "{} {} × {}\n",
        style("Compatibility:").bold().cyan(),
        style(&report.animal_a).yellow(),
        style(&report.animal_b).yellow()
    );
    out.push_str(&format!(
        "  {} Gender\n",
        check_mark(report.gender_compatible)
    ));
    out.push_str(&format!(
        "  {} Relatedness {:.2}% ({})\n",
        check_mark(report.relatedness_compatible),
        report.rounded_relatedness(),
        report.basis
    ));
    out.push_str(&format!(
        "  {} Dysplasia grades\n",
        check_mark(report.dysplasia_compatible)
    ));

    let verdict = if report.overall_compatible {
        style("COMPATIBLE").green().bold()
    } else {
        style("NOT COMPATIBLE").red().bold()
    };
    out.push_str(&format!("  => {}\n", verdict));
    for reason in report.rejection_reasons() {
        out.push_str(&format!("     - {}\n", style(reason).dim()));
    }
    out
}

pub fn render_relatedness(report: &RelatednessReport) -> String {
    format!(
        "{} {} × {}: {}% ({})\n",
        style("Relatedness:").bold().cyan(),
        style(&report.animal_a).yellow(),
        style(&report.animal_b).yellow(),
        style(format!("{:.2}", report.rounded())).bold(),
        report.basis
    )
}

pub fn render_policy(policy: &BreedingPolicy) -> String {
    let mut out = format!("{}\n", style("Active breeding policy").bold().cyan());
    out.push_str(&format!(
        "  Inbreeding limit:  {:.2}%\n",
        policy.inbreeding_limit
    ));
    out.push_str(&format!(
        "  Max generations:   {}\n",
        policy.max_generations
    ));
    out.push_str("  Dysplasia matrix (row × column):\n");
    out.push_str("       A B C D E\n");
    for a in DysplasiaGrade::ALL {
        let cells: Vec<String> = DysplasiaGrade::ALL
            .iter()
            .map(|&b| {
                if policy.dysplasia_matrix.get(a, b) {
                    style("✓").green().to_string()
                } else {
                    style("·").dim().to_string()
                }
            })
            .collect();
        out.push_str(&format!("    {}  {}\n", a, cells.join(" ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_report() -> CompatibilityReport {
        CompatibilityReport {
            animal_a: AnimalId::new("X").unwrap(),
            animal_b: AnimalId::new("Y").unwrap(),
            gender_compatible: true,
            relatedness: 1.5625,
            basis: RelationshipBasis::CommonAncestors { count: 1 },
            relatedness_compatible: true,
            dysplasia_compatible: false,
            overall_compatible: false,
        }
    }

    #[test]
    fn test_generate_all_formats() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let generator = ReportGenerator::new(&temp_dir.path().join("reports"))?;

        let written = generator.generate(&[sample_report()], ReportFormat::All)?;
        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|p| p.exists()));

        let csv = fs::read_to_string(&written[1])?;
        assert!(csv.lines().nth(1).unwrap().contains(",1.56,"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&written[2])?)?;
        assert_eq!(json[0]["relatedness"], 1.56);
        assert_eq!(json[0]["basis"]["kind"], "common_ancestors");

        let tsv = fs::read_to_string(&written[3])?;
        assert!(tsv.starts_with("animal_a\tanimal_b"));
        Ok(())
    }

    #[test]
    fn test_text_rendering_lists_reasons() {
        console::set_colors_enabled(false);
        let text = render_compatibility(&sample_report());
        assert!(text.contains("Relatedness 1.56%"));
        assert!(text.contains("NOT COMPATIBLE"));
        assert!(text.contains("Dysplasia grades are not an allowed pairing"));
    }

    #[test]
    fn test_policy_rendering() {
        console::set_colors_enabled(false);
        let text = render_policy(&BreedingPolicy::default());
        assert!(text.contains("12.50%"));
        assert!(text.contains("    A  ✓ ✓ · · ·"));
    }
}
