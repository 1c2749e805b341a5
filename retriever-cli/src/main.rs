use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use retriever::{
    config::{EncodingMode, FilterConfig, SearchConfig},
    errors::unify_path,
    progress::ProgressMonitor,
    replace::{diffs_to_json, FileSystemAccess, ReplaceFailure},
    results::{FileId, SearchResults},
    view::{Element, SortOrder, ViewModel},
    workspace::{detect_project_root, ProjectLayout},
    ReplaceOperation, ReplaceSession, ReplaceTarget, SearchQuery,
};
use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod diff_utils;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Flat,
    Hierarchical,
}

impl From<LayoutArg> for SortOrder {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Flat => SortOrder::Flat,
            LayoutArg::Hierarchical => SortOrder::Hierarchical,
        }
    }
}

/// Arguments shared by every command that runs a search
#[derive(Args)]
struct QueryArgs {
    /// Pattern to search for
    pattern: Option<String>,

    /// Treat the pattern as a regular expression
    #[arg(short = 'r', long = "regex")]
    is_regex: bool,

    /// Match case exactly
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Match whole words only
    #[arg(short = 'w', long = "word-boundary")]
    whole_word: bool,

    /// Roots to search in (default: current directory)
    #[arg(short = 'd', long = "root")]
    roots: Vec<PathBuf>,

    /// File name patterns to include (e.g. "*.rs")
    #[arg(short = 'g', long = "glob")]
    file_patterns: Vec<String>,

    /// Match file name patterns case-sensitively
    #[arg(long)]
    glob_case_sensitive: bool,

    /// Also search build output directories
    #[arg(long)]
    include_derived: bool,

    /// How results are grouped
    #[arg(long, value_enum)]
    layout: Option<LayoutArg>,

    /// Only show lines matching this regular expression
    #[arg(long)]
    filter: Option<String>,

    /// Hide lines matching --filter instead of showing only them
    #[arg(long, requires = "filter")]
    hide: bool,

    /// Only show matches in these locations (comment,string,import,preprocessor,function,other)
    #[arg(short = 'l', long, value_delimiter = ',')]
    locations: Vec<String>,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long, default_value = "failfast")]
    encoding: String,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stored query to run instead of the configuration files
    #[arg(short = 'q', long)]
    query: Option<PathBuf>,

    /// Store the effective query under this path
    #[arg(long)]
    save_query: Option<PathBuf>,
}

impl QueryArgs {
    fn to_config(&self, replacement: Option<String>) -> SearchConfig {
        let encoding_mode = match self.encoding.to_lowercase().as_str() {
            "lossy" => EncodingMode::Lossy,
            _ => EncodingMode::FailFast,
        };
        let defaults = SearchConfig::default();
        SearchConfig {
            pattern: self.pattern.clone().unwrap_or_default(),
            is_regex: self.is_regex,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
            roots: self.roots.clone(),
            file_patterns: self.file_patterns.clone(),
            file_patterns_case_sensitive: self.glob_case_sensitive,
            include_derived: self.include_derived,
            layout: self.layout.map(SortOrder::from).unwrap_or_default(),
            filter: FilterConfig {
                pattern: self.filter.clone(),
                hide_matching: self.hide,
                accepted_locations: self.locations.clone(),
            },
            replacement,
            thread_count: self.threads.unwrap_or(defaults.thread_count),
            encoding_mode,
            ..defaults
        }
    }

    /// Configuration files (or the stored query) overridden by the command line
    fn load(&self, replacement: Option<String>) -> Result<SearchConfig> {
        let base = match &self.query {
            Some(path) => SearchConfig::load_query(path)
                .with_context(|| format!("Failed to load query {}", path.display()))?,
            None => SearchConfig::load_from(self.config.as_deref())?,
        };
        let config = base.merge_with_cli(self.to_config(replacement));
        if config.pattern.is_empty() {
            bail!("No pattern given");
        }
        Ok(config)
    }
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Show only statistics, not matches
    #[arg(short, long)]
    stats: bool,
}

#[derive(Args)]
struct ReplaceArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Text to replace matches with; `$1` and `${name}` refer to groups in regex mode
    #[arg(short = 't', long = "with")]
    replacement: Option<String>,

    /// Only replace in these files
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Only replace on these lines, given as FILE:LINE
    #[arg(long = "line")]
    lines: Vec<String>,

    /// Show what would change without writing anything
    #[arg(short = 'n', long)]
    preview: bool,

    /// Print the preview as JSON
    #[arg(long, requires = "preview")]
    json: bool,

    /// Clear the read-only flag of target files
    #[arg(long)]
    make_writable: bool,

    /// Go on without asking when some files stay read-only
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a pattern and print the matches as a tree
    Search(Box<SearchArgs>),

    /// Replace matches of a pattern in place
    Replace(Box<ReplaceArgs>),
}

/// Progress bar on stderr, hidden when stderr is not a terminal
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressMonitor for BarProgress {
    fn begin(&self, task: &str, total: usize) {
        self.bar.set_message(task.to_string());
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn worked(&self, units: usize) {
        self.bar.inc(units as u64);
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second initialization only happens in tests and can be ignored
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            let config = args.query.load(None)?;
            init_tracing(&config.log_level);
            run_search(&config, args.query.save_query.as_deref(), args.stats)
        }
        Commands::Replace(args) => {
            let config = args.query.load(args.replacement.clone())?;
            init_tracing(&config.log_level);
            run_replace(&config, &args)
        }
    }
}

/// Builds and runs the query of `config`, with its filter in place before any match arrives
fn search(config: &SearchConfig) -> Result<SearchQuery> {
    let query = config.query()?;
    query.results().apply_filter(config.filter()?);

    let progress = BarProgress::new();
    let status = query.run(&progress)?;
    for (path, message) in &status.errors {
        warn!("Skipped {}: {}", path.display(), message);
    }
    if status.cancelled {
        bail!("Search cancelled");
    }
    debug!(
        "Scanned {} files, {} with matches",
        status.files_scanned, status.files_with_matches
    );
    Ok(query)
}

fn store_query(config: &SearchConfig, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        let written = config.store_query(path)?;
        println!("Stored query in {}", written.display());
    }
    Ok(())
}

fn run_search(config: &SearchConfig, save_query: Option<&Path>, stats_only: bool) -> Result<()> {
    let query = search(config)?;
    let results = query.results();
    let counts = results.counts();

    if !stats_only {
        let mut view = ViewModel::new(results.clone(), config.layout);
        if config.layout.is_hierarchical() {
            let root = config.roots.first().cloned().unwrap_or_else(|| PathBuf::from("."));
            view = view.with_layout(ProjectLayout::new(detect_project_root(&root)));
        }
        view.input_changed();
        print_tree(&view, None, 0);
    }

    println!(
        "\nFound {} matches in {} files",
        counts.visible,
        visible_files(results)
    );
    if counts.filtered() > 0 {
        println!(
            "{}",
            format!("{} of {} matches filtered", counts.filtered(), counts.total).yellow()
        );
    }

    store_query(config, save_query)
}

fn visible_files(results: &SearchResults) -> usize {
    results
        .files()
        .into_iter()
        .filter(|f| results.visible_count(&Element::File(*f)) > 0)
        .count()
}

fn print_tree(view: &ViewModel, parent: Option<&Element>, depth: usize) {
    for child in view.get_children(parent) {
        let label = view.label(&child);
        let indent = "  ".repeat(depth);
        match &child {
            Element::Folder(_) => println!("{}{}", indent, label.blue().bold()),
            Element::File(_) => println!("{}{}", indent, label.blue()),
            Element::Line { number, .. } => {
                let prefix = format!("{}:", number);
                let text = label.strip_prefix(&prefix).unwrap_or(&label);
                println!("{}{}{}", indent, prefix.green(), text);
            }
            Element::FilteredSummary => println!("{}{}", indent, label.yellow()),
        }
        if view.has_children(&child) {
            print_tree(view, Some(&child), depth + 1);
        }
    }
}

fn find_file(results: &SearchResults, wanted: &Path) -> Result<FileId> {
    let wanted = unify_path(wanted);
    results
        .files()
        .into_iter()
        .find(|f| results.path(*f).is_some_and(|p| unify_path(&p) == wanted))
        .ok_or_else(|| anyhow!("No matches in {}", wanted.display()))
}

fn replace_target(results: &SearchResults, options: &ReplaceArgs) -> Result<ReplaceTarget> {
    if !options.lines.is_empty() {
        let mut ids = Vec::new();
        for spec in &options.lines {
            let (path, number) = spec
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("Expected FILE:LINE, got '{}'", spec))?;
            let number: usize = number
                .parse()
                .with_context(|| format!("Invalid line number in '{}'", spec))?;
            let file = find_file(results, Path::new(path))?;
            let line = results
                .lines(file)
                .into_iter()
                .find(|l| l.number() == number)
                .ok_or_else(|| anyhow!("No matches on line {} of {}", number, path))?;
            ids.push(line.id());
        }
        return Ok(ReplaceTarget::Lines(ids));
    }
    if !options.files.is_empty() {
        let files = options
            .files
            .iter()
            .map(|p| find_file(results, p))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ReplaceTarget::Files(files));
    }
    Ok(ReplaceTarget::All)
}

fn confirm_on_stdin(read_only: &[PathBuf], writable: &[PathBuf]) -> bool {
    eprintln!("{}", "These files are read-only and will be skipped:".yellow());
    for path in read_only {
        eprintln!("  {}", path.display());
    }
    eprint!("Replace in the other {} files? [y/N] ", writable.len());
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_failures(failures: &[ReplaceFailure]) {
    eprintln!("{}", format!("{} matches could not be replaced:", failures.len()).red());
    for failure in failures {
        match failure.line {
            Some(line) => eprintln!(
                "  {}:{}: {}",
                failure.path.display(),
                line,
                failure.message
            ),
            None => eprintln!("  {}: {}", failure.path.display(), failure.message),
        }
    }
}

fn run_replace(config: &SearchConfig, options: &ReplaceArgs) -> Result<()> {
    let save_query = options.query.save_query.as_deref();
    let template = config
        .replacement
        .clone()
        .ok_or_else(|| anyhow!("Replacement text (--with) is required"))?;
    let query = search(config)?;
    let target = replace_target(query.results(), options)?;
    let operation = ReplaceOperation::replace(&query, target, template)?;
    let mut session =
        ReplaceSession::new().with_access(Box::new(FileSystemAccess::new(options.make_writable)));

    if options.preview {
        let diffs = operation.preview(&session)?;
        if options.json {
            println!("{}", diffs_to_json(&diffs)?);
        } else {
            println!("Dry run - no changes will be made");
            for diff in &diffs {
                diff_utils::print_file_diff(diff);
            }
            let total: usize = diffs.iter().map(|d| d.replacements).sum();
            println!("\n{} replacements in {} files", total, diffs.len());
        }
        return store_query(config, save_query);
    }

    let yes = options.yes;
    let confirm = move |read_only: &[PathBuf], writable: &[PathBuf]| {
        yes || confirm_on_stdin(read_only, writable)
    };
    let progress = BarProgress::new();
    let outcome = operation.run(&mut session, &confirm, &progress)?;

    for path in &outcome.refreshed {
        println!("{} {}", "Rescanned".yellow(), path.display());
    }
    if outcome.cancelled {
        println!("Replace cancelled, no files were changed");
        return Ok(());
    }
    for path in &outcome.committed {
        println!("{} {}", "Updated".green(), path.display());
    }
    for path in &outcome.excluded {
        println!("{} {}", "Skipped read-only".yellow(), path.display());
    }
    println!(
        "\nReplaced {} matches in {} files",
        outcome.replaced,
        outcome.committed.len()
    );

    store_query(config, save_query)?;
    if !outcome.failures.is_empty() {
        print_failures(&outcome.failures);
        bail!("{} matches could not be replaced", outcome.failures.len());
    }
    Ok(())
}
