use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use pedigree_compatibility::output::{render_compatibility, render_policy, render_relatedness};
use pedigree_compatibility::{
    CompatibilityReport, DysplasiaGrade, DysplasiaMatrix, InMemoryPedigree, InMemoryPolicyStore,
    PedigreeConfig, PedigreeEngine, PedigreeFileParser, PolicyUpdate, ReportGenerator,
};

/// Pedigree relatedness and breeding compatibility checks
#[derive(Parser, Debug)]
#[command(
    name = "pedigree-compat",
    version,
    about = "Breeding compatibility checks from pedigree and hip dysplasia records",
    long_about = r#"
Decides whether two registered animals are safe to pair:
- Coefficient of relationship from shared ancestry (Wright's method)
- Inbreeding limit from the active breeding policy
- Hip dysplasia grade pairing rules (A-E matrix)

Pedigree records are read from CSV, TSV or JSON exports.
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Pedigree export to load animals from
    #[arg(short, long, value_name = "FILE", env = "PEDIGREE_FILE", value_hint = ValueHint::FilePath)]
    pedigree: Option<PathBuf>,

    /// TOML configuration file (engine settings and breeding policy)
    #[arg(short, long, value_name = "FILE", env = "PEDIGREE_CONFIG", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value = "0", help = "Number of threads (0 = auto)")]
    threads: usize,

    /// Per-lookup timeout in milliseconds, overrides the config file
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output directory for file reports
    #[arg(short, long, default_value = "./reports")]
    output: PathBuf,

    /// Interactive mode with prompts for all parameters
    #[arg(short, long, help = "Interactive mode with prompts")]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Relatedness percentage between two animals
    Relatedness { animal_a: String, animal_b: String },
    /// Whether two dysplasia grades may be paired
    Dysplasia { grade_a: String, grade_b: String },
    /// Full compatibility verdict for a pairing
    Evaluate { animal_a: String, animal_b: String },
    /// Rank every active animal in the pedigree as a partner
    Partners {
        animal: String,
        /// Show at most this many candidates
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show or change the active breeding policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(Subcommand, Debug)]
enum PolicyAction {
    /// Print the active policy
    Show,
    /// Replace policy fields; the result is written back to --config
    Set {
        #[arg(long)]
        inbreeding_limit: Option<f64>,
        #[arg(long)]
        max_generations: Option<u32>,
        /// Allow a grade pairing, e.g. A:C (both directions)
        #[arg(long, value_name = "GA:GB")]
        allow: Vec<String>,
        /// Forbid a grade pairing, e.g. B:D (both directions)
        #[arg(long, value_name = "GA:GB")]
        deny: Vec<String>,
        /// Only change the GA row, leaving GB:GA as it is
        #[arg(long)]
        one_way: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Html,
    Csv,
    Tsv,
    All,
}

impl OutputFormat {
    fn report_format(self) -> Option<pedigree_compatibility::ReportFormat> {
        use pedigree_compatibility::ReportFormat;
        match self {
            OutputFormat::Text | OutputFormat::Json => None,
            OutputFormat::Html => Some(ReportFormat::Html),
            OutputFormat::Csv => Some(ReportFormat::Csv),
            OutputFormat::Tsv => Some(ReportFormat::Tsv),
            OutputFormat::All => Some(ReportFormat::All),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    init_logging(cli.verbose);
    init_thread_pool(cli.threads)?;

    let mut config = PedigreeConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(timeout_ms) = cli.timeout_ms {
        config.engine.lookup_timeout_ms = timeout_ms;
    }

    let pedigree = Arc::new(load_pedigree(cli.pedigree.as_deref())?);
    let policies = Arc::new(InMemoryPolicyStore::with_policy(config.initial_policy()?));
    let engine = PedigreeEngine::with_lookup_timeout(
        Arc::clone(&pedigree),
        policies,
        config.engine.clone(),
    )?;

    info!("Using {} threads", rayon::current_num_threads());

    let command = if cli.interactive {
        run_interactive_mode()?
    } else {
        cli.command
            .ok_or_else(|| anyhow!("No command given, see --help"))?
    };

    match command {
        Commands::Relatedness { animal_a, animal_b } => {
            let report = engine.compute_relatedness(&animal_a, &animal_b)?;
            match cli.format {
                OutputFormat::Text => print!("{}", render_relatedness(&report)),
                _ => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Dysplasia { grade_a, grade_b } => {
            let compatible = engine.evaluate_dysplasia(&grade_a, &grade_b)?;
            match cli.format {
                OutputFormat::Text => println!(
                    "{} {} × {}: {}",
                    style("Dysplasia:").bold().cyan(),
                    grade_a.trim().to_uppercase(),
                    grade_b.trim().to_uppercase(),
                    if compatible {
                        style("allowed").green().bold()
                    } else {
                        style("not allowed").red().bold()
                    }
                ),
                _ => println!("{}", serde_json::json!({ "dysplasia_compatible": compatible })),
            }
        }
        Commands::Evaluate { animal_a, animal_b } => {
            let report = engine.evaluate_compatibility(&animal_a, &animal_b)?;
            emit_reports(&[report], cli.format, &cli.output)?;
        }
        Commands::Partners { animal, limit } => {
            let candidates = pedigree.active_ids();
            let pb = ProgressBar::new(candidates.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );
            pb.set_message("Evaluating candidates...");

            let mut reports = engine.find_partners(&animal, &candidates, &|| pb.inc(1))?;
            pb.finish_with_message("Done");

            reports.truncate(limit);
            emit_reports(&reports, cli.format, &cli.output)?;
        }
        Commands::Policy { action } => match action {
            PolicyAction::Show => {
                let policy = engine.active_policy()?;
                match cli.format {
                    OutputFormat::Text => print!("{}", render_policy(&policy)),
                    _ => println!("{}", serde_json::to_string_pretty(&*policy)?),
                }
            }
            PolicyAction::Set {
                inbreeding_limit,
                max_generations,
                allow,
                deny,
                one_way,
            } => {
                let current = engine.active_policy()?;
                let dysplasia_matrix = if allow.is_empty() && deny.is_empty() {
                    None
                } else {
                    let mut matrix = current.dysplasia_matrix;
                    apply_pairings(&mut matrix, &allow, true, one_way)?;
                    apply_pairings(&mut matrix, &deny, false, one_way)?;
                    Some(matrix)
                };

                let stored = engine.replace_policy(&PolicyUpdate {
                    inbreeding_limit,
                    max_generations,
                    dysplasia_matrix,
                })?;

                if let Some(path) = &cli.config {
                    config.policy = PolicyUpdate::from(&*stored);
                    config
                        .save(path)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Saved policy to {}", path.display());
                }
                print!("{}", render_policy(&stored));
            }
        },
        Commands::Completions { shell } => generate_completions(shell),
    }

    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("pedigree_compatibility={},pedigree_compat={}", level, level))
        .with_writer(io::stderr)
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn load_pedigree(path: Option<&Path>) -> Result<InMemoryPedigree> {
    match path {
        Some(path) => PedigreeFileParser::new()
            .load(path)
            .with_context(|| format!("Failed to load pedigree from {}", path.display())),
        None => Ok(InMemoryPedigree::new()),
    }
}

/// Parse `GA:GB` pairs and write them into the matrix
fn apply_pairings(
    matrix: &mut DysplasiaMatrix,
    pairs: &[String],
    allowed: bool,
    one_way: bool,
) -> Result<()> {
    for pair in pairs {
        let (a, b) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("Expected a grade pair like A:C, got {:?}", pair))?;
        let a: DysplasiaGrade = a.parse()?;
        let b: DysplasiaGrade = b.parse()?;
        if one_way {
            matrix.set(a, b, allowed);
        } else {
            matrix.set_symmetric(a, b, allowed);
        }
    }
    Ok(())
}

fn emit_reports(reports: &[CompatibilityReport], format: OutputFormat, output: &Path) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if reports.is_empty() {
                println!("{}", style("No candidates to evaluate").dim());
            }
            for report in reports {
                print!("{}", render_compatibility(report));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        _ => {
            let generator = ReportGenerator::new(output)?;
            let format = format
                .report_format()
                .ok_or_else(|| anyhow!("Unsupported report format"))?;
            for path in generator.generate(reports, format)? {
                println!(
                    "{} Report saved to: {}",
                    style("✓").green().bold(),
                    style(path.display()).cyan()
                );
            }
        }
    }
    Ok(())
}

fn run_interactive_mode() -> Result<Commands> {
    println!(
        "{}",
        style("╔══════════════════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║      Pedigree Compatibility - Interactive Mode               ║")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("╚══════════════════════════════════════════════════════════════╝").cyan()
    );
    println!();

    let theme = ColorfulTheme::default();

    let actions = vec![
        "Evaluate a pairing",
        "Relatedness between two animals",
        "Dysplasia grade pairing",
        "Find partners for an animal",
        "Show breeding policy",
    ];
    let action = Select::with_theme(&theme)
        .with_prompt("What would you like to do?")
        .default(0)
        .items(&actions)
        .interact()?;

    let prompt = |label: &str| -> Result<String> {
        Ok(Input::<String>::with_theme(&theme)
            .with_prompt(label)
            .interact_text()?)
    };

    let command = match action {
        0 => Commands::Evaluate {
            animal_a: prompt("First animal id")?,
            animal_b: prompt("Second animal id")?,
        },
        1 => Commands::Relatedness {
            animal_a: prompt("First animal id")?,
            animal_b: prompt("Second animal id")?,
        },
        2 => Commands::Dysplasia {
            grade_a: prompt("First grade (A-E)")?,
            grade_b: prompt("Second grade (A-E)")?,
        },
        3 => {
            let animal = prompt("Animal id")?;
            let limit: usize = Input::with_theme(&theme)
                .with_prompt("Maximum candidates to show")
                .default(20)
                .interact_text()?;
            Commands::Partners { animal, limit }
        }
        _ => Commands::Policy {
            action: PolicyAction::Show,
        },
    };

    Ok(command)
}
