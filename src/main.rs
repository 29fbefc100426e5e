use std::io::IsTerminal;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use difftron_analyzer::{AnalysisResult, AnalyzeOptions, FileTypeMetrics};
use difftron_core::{DifftronConfig, DifftronError, OutputFormat, PathMatching, Thresholds};
use difftron_coverage::paths::RepoRoot;
use difftron_coverage::{parse_coverage, CoverageFormat, CoverageReport, ParseOptions};
use difftron_difflens::filter::ChangeFilter;
use difftron_difflens::parser::{parse_unified_diff, ChangeSet};
use difftron_health::{HealthReport, InsightKind, SuiteReport};

const CONFIG_FILE: &str = ".difftron.toml";

#[derive(Parser)]
#[command(
    name = "difftron",
    version,
    about = "Coverage of the lines your diff touched",
    long_about = "difftron measures test coverage on the lines a change adds or modifies,\n\
                   not the whole project, and gates CI on it.\n\n\
                   Examples:\n  \
                     git diff main | difftron analyze --coverage lcov.info\n  \
                     difftron analyze --diff pr.patch --coverage cover.out --threshold 90\n  \
                     difftron health --suite unit=lcov.info --suite api=api.xml\n  \
                     difftron init                 Create a .difftron.toml config file"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .difftron.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable summary (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(clap::Args)]
struct GateArgs {
    /// Read the diff from a file instead of stdin
    #[arg(long)]
    diff: Option<PathBuf>,

    /// Minimum overall change coverage, 0-100
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum change coverage for files the diff creates
    #[arg(long)]
    threshold_new: Option<f64>,

    /// Minimum change coverage for files the diff modifies
    #[arg(long)]
    threshold_modified: Option<f64>,

    /// Force the coverage dialect instead of detecting it (lcov, cobertura, go)
    #[arg(long)]
    coverage_format: Option<CoverageFormat>,

    /// How diff paths are matched to coverage keys (strict, fuzzy)
    #[arg(long)]
    path_matching: Option<PathMatching>,

    /// Glob of changed files to leave out; repeatable
    #[arg(long)]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Measure change coverage against one coverage artifact
    #[command(long_about = "Measure change coverage against one coverage artifact.\n\n\
        Reads a unified diff from stdin or --diff, matches every added line to the\n\
        coverage report, and exits 1 when a threshold is not met.\n\n\
        Examples:\n  git diff origin/main | difftron analyze --coverage lcov.info\n  \
        difftron analyze --diff pr.patch --coverage coverage.xml --baseline main.xml")]
    Analyze {
        /// Current coverage artifact
        #[arg(long)]
        coverage: PathBuf,

        /// Baseline coverage artifact from the target branch
        #[arg(long)]
        baseline: Option<PathBuf>,

        #[command(flatten)]
        gate: GateArgs,
    },
    /// Combine several suites into a health report with insights
    #[command(long_about = "Combine several suites into a health report with insights.\n\n\
        Each --suite is NAME=FILE. The suite kind comes from the name when it is one\n\
        of unit, api, functional, integration, e2e, and is guessed from the name and\n\
        path otherwise.\n\n\
        Examples:\n  git diff | difftron health --suite unit=lcov.info --suite api=api.xml\n  \
        difftron health --diff pr.patch --suite unit=cover.out --baseline-suite unit=main.out")]
    Health {
        /// Suite coverage as NAME=FILE; repeatable
        #[arg(long = "suite", value_parser = parse_suite_arg, required = true)]
        suites: Vec<SuiteArg>,

        /// Baseline suite coverage as NAME=FILE; repeatable
        #[arg(long = "baseline-suite", value_parser = parse_suite_arg)]
        baseline_suites: Vec<SuiteArg>,

        #[command(flatten)]
        gate: GateArgs,
    },
    /// Create a default .difftron.toml configuration file
    #[command(long_about = "Create a default .difftron.toml configuration file.\n\n\
        Fails if .difftron.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Clone, Debug)]
struct SuiteArg {
    name: String,
    path: PathBuf,
}

fn parse_suite_arg(value: &str) -> std::result::Result<SuiteArg, String> {
    match value.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => Ok(SuiteArg {
            name: name.trim().to_string(),
            path: PathBuf::from(path.trim()),
        }),
        _ => Err(format!("expected NAME=FILE, got '{value}'")),
    }
}

const DEFAULT_CONFIG: &str = r#"# difftron configuration
# See: https://github.com/swantron/difftron

[thresholds]
# Minimum change coverage for the whole diff (0-100)
overall = 80.0
# Files the diff creates; defaults to overall
# new_files = 90.0
# Files the diff modifies; defaults to overall
# modified_files = 70.0

[analysis]
# "strict" matches exact and normalized paths only; "fuzzy" also tries
# suffix and basename matches
path_matching = "strict"
# Changed files to leave out of the analysis
exclude = []
# exclude = ["**/*.pb.go", "vendor/**", "**/*_generated.rs"]

[coverage]
# Module prefixes stripped from Go cover profile paths
module_prefixes = []
# module_prefixes = ["github.com/acme/widget/"]
"#;

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("DIFFTRON_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "off" })
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DifftronConfig> {
    match path {
        Some(path) => DifftronConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading {}", path.display())),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                DifftronConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err(format!("loading {CONFIG_FILE}"))
            } else {
                Ok(DifftronConfig::default())
            }
        }
    }
}

/// Fold command-line overrides into the loaded config.
fn apply_overrides(mut config: DifftronConfig, gate: &GateArgs) -> Result<DifftronConfig> {
    if let Some(t) = gate.threshold {
        config.thresholds.overall = t;
    }
    if let Some(t) = gate.threshold_new {
        config.thresholds.new_files = Some(t);
    }
    if let Some(t) = gate.threshold_modified {
        config.thresholds.modified_files = Some(t);
    }
    if let Some(mode) = gate.path_matching {
        config.analysis.path_matching = mode;
    }
    config.analysis.exclude.extend(gate.exclude.iter().cloned());
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn discover_repo_root() -> RepoRoot {
    RepoRoot::new(|| {
        let repo = git2::Repository::discover(".").ok()?;
        repo.workdir().map(Path::to_path_buf)
    })
}

fn read_diff_input(file: &Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            if std::io::stdin().is_terminal() {
                miette::bail!("no diff given: pass --diff <file> or pipe a diff on stdin");
            }
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

fn load_changes(gate: &GateArgs, config: &DifftronConfig) -> Result<ChangeSet> {
    let diff = read_diff_input(&gate.diff)?;
    let mut changes = parse_unified_diff(&diff)
        .into_diagnostic()
        .wrap_err("parsing diff")?;
    let excluded = ChangeFilter::from_config(&config.analysis).apply(&mut changes);
    if !excluded.is_empty() {
        tracing::debug!(count = excluded.len(), "excluded changed files");
    }
    Ok(changes)
}

fn load_coverage(
    path: &Path,
    format: Option<CoverageFormat>,
    options: &ParseOptions,
) -> Result<CoverageReport> {
    if !path.exists() {
        return Err(DifftronError::FileNotFound(path.to_path_buf())).into_diagnostic();
    }
    let content = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err(format!("reading {}", path.display()))?;
    let report = match format {
        Some(format) => format.parse(&content, options),
        None => parse_coverage(&content, Some(path), options),
    };
    report
        .into_diagnostic()
        .wrap_err(format!("parsing {}", path.display()))
}

fn load_suites(
    args: &[SuiteArg],
    format: Option<CoverageFormat>,
    options: &ParseOptions,
) -> Result<Vec<SuiteReport>> {
    args.iter()
        .map(|arg| {
            let report = load_coverage(&arg.path, format, options)?;
            Ok(SuiteReport::new(
                arg.name.clone(),
                report,
                arg.path.display().to_string(),
            ))
        })
        .collect()
}

struct Palette {
    color: bool,
}

impl Palette {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn verdict(&self, pass: bool) -> String {
        if pass {
            self.paint("32", "\u{2713} PASS")
        } else {
            self.paint("31", "\u{2717} FAIL")
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }
}

fn format_lines(lines: &[u32]) -> String {
    let mut ranges: Vec<String> = Vec::new();
    let mut iter = lines.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = end.checked_add(1) {
            if iter.peek() != Some(&next) {
                break;
            }
            end = next;
            iter.next();
        }
        if start == end {
            ranges.push(start.to_string());
        } else {
            ranges.push(format!("{start}-{end}"));
        }
    }
    ranges.join(", ")
}

fn print_subset(label: &str, metrics: &FileTypeMetrics, threshold: f64) {
    if metrics.file_count == 0 {
        return;
    }
    println!(
        "  {label:<15} {:>6.1}%  {}/{} lines in {} file(s), threshold {threshold:.1}%",
        metrics.coverage_percentage,
        metrics.covered_lines,
        metrics.total_changed_lines,
        metrics.file_count,
    );
}

fn print_analysis(result: &AnalysisResult, thresholds: &Thresholds, passed: bool, palette: &Palette) {
    println!(
        "{} change coverage {:.1}% ({}/{} lines), threshold {:.1}%",
        palette.verdict(passed),
        result.coverage_percentage,
        result.covered_lines,
        result.total_changed_lines,
        thresholds.overall,
    );
    if result.approximate {
        println!("  note: some coverage was function-level only; figures are approximate");
    }
    print_subset("new files", &result.new_files, thresholds.new_files);
    print_subset("modified files", &result.modified_files, thresholds.modified_files);

    if result.files.is_empty() {
        println!("\nNo changed lines to analyze.");
        return;
    }
    println!();
    for file in result.files.values() {
        let tag = if file.is_new_file { " (new)" } else { "" };
        println!(
            "{}{tag}  {:.1}% ({}/{})",
            palette.bold(&file.path),
            file.coverage_percentage,
            file.covered_lines,
            file.total_changed_lines,
        );
        if let Some(base) = file.baseline_coverage_percentage {
            println!("    baseline {base:.1}%");
        }
        if !file.uncovered_line_numbers.is_empty() {
            println!("    uncovered: {}", format_lines(&file.uncovered_line_numbers));
        }
    }
}

fn print_health(report: &HealthReport, passed: bool, palette: &Palette) {
    println!(
        "{} change coverage {:.1}% ({}/{} lines), threshold {:.1}%",
        palette.verdict(passed),
        report.changed_coverage,
        report.changed_covered_lines,
        report.changed_lines,
        report.thresholds.overall,
    );
    println!(
        "  project coverage {:.1}% ({}/{} lines in {} file(s))",
        report.overall_coverage, report.total_covered_lines, report.total_lines, report.total_files,
    );
    println!(
        "  {} healthy, {} at risk, {} regressing",
        report.healthy_files, report.at_risk_files, report.regressing_files,
    );
    if report.approximate {
        println!("  note: some coverage was function-level only; figures are approximate");
    }
    print_subset("new files", &report.new_files, report.thresholds.new_files);
    print_subset(
        "modified files",
        &report.modified_files,
        report.thresholds.modified_files,
    );

    println!("\n{}", palette.bold("Suites"));
    for suite in &report.suites {
        println!(
            "  {:<15} {:<12} project {:>5.1}%  change {:>5.1}%  ({})",
            suite.name,
            suite.kind.to_string(),
            suite.coverage_percentage,
            suite.changed_coverage_percentage,
            suite.source,
        );
    }

    if !report.files.is_empty() {
        println!("\n{}", palette.bold("Files"));
        for file in report.files.values() {
            let tag = if file.is_new_file { " (new)" } else { "" };
            let mark = if file.has_regression {
                palette.paint("31", "regression")
            } else if file.needs_attention {
                palette.paint("33", "at risk")
            } else {
                palette.paint("32", "ok")
            };
            println!(
                "  {}{tag}  {:.1}% ({}/{})  {mark}",
                file.path,
                file.changed_coverage_percentage,
                file.changed_covered_lines,
                file.changed_lines,
            );
            if let Some(delta) = file.coverage_delta {
                println!("    delta {delta:+.1}%");
            }
            if !file.uncovered_line_numbers.is_empty() {
                println!("    uncovered: {}", format_lines(&file.uncovered_line_numbers));
            }
        }
    }

    println!("\n{}", palette.bold("Insights"));
    for insight in &report.insights {
        let code = match insight.kind {
            InsightKind::Success => "32",
            InsightKind::Info => "36",
            InsightKind::Warning => "33",
            InsightKind::Error => "31",
        };
        println!(
            "  [{}] {}: {}",
            palette.paint(code, &insight.severity.to_string()),
            insight.title,
            insight.description,
        );
    }

    if !report.recommendations.is_empty() {
        println!("\n{}", palette.bold("Recommendations"));
        for rec in &report.recommendations {
            println!("  [{}] {}: {}", rec.priority, rec.title, rec.action);
            for file in &rec.files {
                println!("    - {file}");
            }
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };
    let palette = Palette { color: use_color };

    match cli.command {
        None => {
            Cli::command().print_help().into_diagnostic()?;
            println!();
        }
        Some(Command::Analyze {
            ref coverage,
            ref baseline,
            ref gate,
        }) => {
            let config = apply_overrides(config, gate)?;
            let thresholds = config.thresholds.resolve();
            let repo_root = Arc::new(discover_repo_root());
            let parse_options = ParseOptions::default()
                .with_repo_root(Arc::clone(&repo_root))
                .with_module_prefixes(config.coverage.module_prefixes.clone());

            let changes = load_changes(gate, &config)?;
            let current = load_coverage(coverage, gate.coverage_format, &parse_options)?;
            let baseline = baseline
                .as_deref()
                .map(|path| load_coverage(path, gate.coverage_format, &parse_options))
                .transpose()?;

            let options = AnalyzeOptions {
                repo_root,
                path_matching: config.analysis.path_matching,
            };
            let result = difftron_analyzer::analyze(
                Some(&changes),
                Some(&current),
                baseline.as_ref(),
                &options,
            )
            .into_diagnostic()?;
            let passed = result.meets_threshold(thresholds.overall)
                && result.meets_thresholds(&thresholds);

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
                }
                OutputFormat::Text => print_analysis(&result, &thresholds, passed, &palette),
            }

            if !passed {
                std::process::exit(1);
            }
        }
        Some(Command::Health {
            ref suites,
            ref baseline_suites,
            ref gate,
        }) => {
            let config = apply_overrides(config, gate)?;
            let thresholds = config.thresholds.resolve();
            let repo_root = Arc::new(discover_repo_root());
            let parse_options = ParseOptions::default()
                .with_repo_root(Arc::clone(&repo_root))
                .with_module_prefixes(config.coverage.module_prefixes.clone());

            let changes = load_changes(gate, &config)?;
            let current = load_suites(suites, gate.coverage_format, &parse_options)?;
            let baseline = load_suites(baseline_suites, gate.coverage_format, &parse_options)?;

            let options = AnalyzeOptions {
                repo_root,
                path_matching: config.analysis.path_matching,
            };
            let report = difftron_health::analyze_health(
                Some(&changes),
                &current,
                &baseline,
                &thresholds,
                &options,
            )
            .into_diagnostic()?;
            let passed = report.meets_threshold() && report.meets_thresholds();

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                OutputFormat::Text => print_health(&report, passed, &palette),
            }

            if !passed {
                std::process::exit(1);
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "difftron", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_arg_splits_on_first_equals() {
        let arg = parse_suite_arg("unit=cov/a=b.info").unwrap();
        assert_eq!(arg.name, "unit");
        assert_eq!(arg.path, PathBuf::from("cov/a=b.info"));
    }

    #[test]
    fn suite_arg_requires_both_halves() {
        assert!(parse_suite_arg("unit").is_err());
        assert!(parse_suite_arg("=lcov.info").is_err());
        assert!(parse_suite_arg("unit=").is_err());
    }

    #[test]
    fn line_ranges_are_collapsed() {
        assert_eq!(format_lines(&[1, 2, 3, 7, 9, 10]), "1-3, 7, 9-10");
        assert_eq!(format_lines(&[]), "");
    }

    #[test]
    fn line_ranges_reach_the_largest_line_number() {
        assert_eq!(format_lines(&[u32::MAX - 1, u32::MAX]), "4294967294-4294967295");
        assert_eq!(format_lines(&[u32::MAX]), "4294967295");
    }

    #[test]
    fn default_config_parses() {
        let config = DifftronConfig::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.thresholds.resolve(), Thresholds::uniform(80.0));
        assert_eq!(config.analysis.path_matching, PathMatching::Strict);
    }

    #[test]
    fn cli_flags_override_config() {
        let gate = GateArgs {
            diff: None,
            threshold: Some(70.0),
            threshold_new: Some(95.0),
            threshold_modified: None,
            coverage_format: None,
            path_matching: Some(PathMatching::Fuzzy),
            exclude: vec!["gen/**".into()],
        };
        let config = apply_overrides(DifftronConfig::default(), &gate).unwrap();
        let t = config.thresholds.resolve();
        assert_eq!(t.overall, 70.0);
        assert_eq!(t.new_files, 95.0);
        assert_eq!(t.modified_files, 70.0);
        assert_eq!(config.analysis.path_matching, PathMatching::Fuzzy);
        assert_eq!(config.analysis.exclude, vec!["gen/**"]);
    }

    #[test]
    fn out_of_range_flag_is_rejected() {
        let gate = GateArgs {
            diff: None,
            threshold: Some(150.0),
            threshold_new: None,
            threshold_modified: None,
            coverage_format: None,
            path_matching: None,
            exclude: Vec::new(),
        };
        assert!(apply_overrides(DifftronConfig::default(), &gate).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
