//! Recommender binary entry point.
//!
//! This binary recommends achievement standards for a described classroom
//! activity. It supports both single-query and interactive REPL modes, with
//! flexible output formatting (table or JSON). The corpus JSON is re-read on
//! every search, so an updated corpus file takes effect immediately.
//!
//! # Examples
//!
//! Single query against an elementary corpus:
//! ```bash
//! recommend --corpus data/achievement_standards.json --level elementary \
//!     --grade 1~2학년 --subject 수학 --query "아이들이 블록으로 수를 세는 활동"
//! ```
//!
//! JSON output for a middle school subject:
//! ```bash
//! recommend --corpus data/middle_standards.json --level middle \
//!     --subject 과학 --query "현미경으로 세포를 관찰하는 실험" --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! recommend --corpus data/achievement_standards.json --level elementary --interactive
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use standards_search::{
    corpus::CorpusIndex,
    embedding::{fastembed::FastEmbedProvider, openai::OpenAIEmbedding, EmbeddingProvider},
    models::{GradeBand, Recommendation, RelevanceLevel, SchoolLevel},
    query::{CosineSearchEngine, RecommendQuery, SearchEngine},
};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> standards_search::embedding::EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
    ) -> standards_search::embedding::EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}

/// Output format for recommendations
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// OpenAI cloud-based embedding provider (requires OPENAI_API_KEY, default)
    OpenAI,
    /// FastEmbed local embedding provider (no API required)
    FastEmbed,
}

/// Recommender CLI for matching classroom activities to achievement standards
#[derive(Parser, Debug)]
#[command(
    name = "recommend",
    version,
    about = "Recommend achievement standards for a classroom activity",
    long_about = "Recommend the curriculum achievement standards most similar to a described \
                  classroom activity, for a selected school level, grade band, and subject. \
                  Supports single-query and interactive modes with flexible output formatting.

EXAMPLES:
  Single query:
    recommend --corpus data/achievement_standards.json --level elementary \\
        --grade 1~2학년 --subject 수학 --query \"아이들이 블록으로 수를 세는 활동\"

  JSON output:
    recommend --corpus data/middle_standards.json --level middle --subject 과학 \\
        --query \"현미경으로 세포를 관찰하는 실험\" --format json

  Interactive mode:
    recommend --corpus data/achievement_standards.json --level elementary --interactive"
)]
struct Args {
    /// Corpus JSON file path
    #[arg(long, value_name = "PATH")]
    corpus: PathBuf,

    /// School level of the corpus
    #[arg(long, value_name = "LEVEL")]
    level: SchoolLevel,

    /// Grade band selection (elementary only, e.g. "1~2학년")
    #[arg(long, value_name = "GRADE")]
    grade: Option<GradeBand>,

    /// Subject selection (e.g. "수학")
    #[arg(long, value_name = "SUBJECT")]
    subject: Option<String>,

    /// Activity description (required for single-query mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of recommendations to return
    #[arg(long, value_name = "N", default_value = "5")]
    top_k: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Embedding provider to use
    #[arg(long, value_enum, default_value = "open-ai")]
    provider: EmbeddingProviderType,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// FastEmbed model cache directory (only used with FastEmbed provider)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Instantiate the embedding provider selected on the command line
fn create_embedding_provider(args: &Args) -> Result<DynamicEmbeddingProvider> {
    match args.provider {
        EmbeddingProviderType::OpenAI => {
            info!("Initializing OpenAI embedding provider");
            let api_key = std::env::var("OPENAI_API_KEY").with_context(|| {
                "OPENAI_API_KEY environment variable required for OpenAI embeddings.\n\
                 Set it with: export OPENAI_API_KEY=your-api-key"
            })?;

            let provider = OpenAIEmbedding::new(api_key, args.embedding_model.clone());
            info!(
                "OpenAI provider initialized: model={}, dimension={}",
                provider.model_name(),
                provider.dimension()
            );
            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
        EmbeddingProviderType::FastEmbed => {
            info!("Initializing FastEmbed provider");
            let cache_dir = args
                .cache_dir
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .or_else(|| {
                    dirs::cache_dir().map(|p| p.join("fastembed").to_string_lossy().to_string())
                });

            let provider = FastEmbedProvider::new(None, cache_dir)
                .with_context(|| "Failed to create FastEmbed provider")?;
            info!(
                "FastEmbed provider initialized: model={}, dimension={}",
                provider.model_name(),
                provider.dimension()
            );
            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
    }
}

/// Validate a subject against the level's enumerated subject list.
fn validate_subject(level: SchoolLevel, subject: &str) -> Result<()> {
    if !level.subjects().contains(&subject) {
        anyhow::bail!(
            "Unknown subject '{}' for {} school. Available subjects: {}",
            subject,
            level,
            level.subjects().join(", ")
        );
    }
    Ok(())
}

/// One grade/subject selection paired with activity text.
#[derive(Debug, Clone)]
struct Selection {
    grade: Option<GradeBand>,
    subject: String,
}

/// Outcome of a single search request, including the advisory cases.
enum SearchOutcome {
    /// Ranked recommendations
    Results(Vec<Recommendation>),
    /// The grade/subject selection has no standards in the corpus
    EmptySelection,
}

/// Execute one search: reload the corpus, filter, and rank.
///
/// The corpus file is intentionally re-read per request rather than cached.
async fn execute_search<E: EmbeddingProvider>(
    engine: &CosineSearchEngine<E>,
    corpus_path: &PathBuf,
    selection: &Selection,
    query_text: &str,
    top_k: usize,
) -> Result<SearchOutcome> {
    debug!(query = %query_text, "executing search");

    let corpus = CorpusIndex::load(corpus_path)
        .with_context(|| format!("Failed to load corpus from {}", corpus_path.display()))?;

    let documents = corpus.filter(selection.grade, &selection.subject);
    if documents.is_empty() {
        return Ok(SearchOutcome::EmptySelection);
    }

    let query = RecommendQuery::new(
        query_text.to_string(),
        selection.grade,
        selection.subject.clone(),
        Some(top_k),
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .expect("Invalid spinner template"),
    );
    spinner.set_message("Matching achievement standards...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = engine
        .recommend(&documents, &query)
        .await
        .with_context(|| format!("Failed to rank standards for query: '{}'", query_text));

    spinner.finish_and_clear();
    Ok(SearchOutcome::Results(result?))
}

/// Truncate a string to at most `max` characters, appending an ellipsis.
///
/// Character-based so multi-byte Korean text is never split mid-character.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Format recommendations as a pretty table
fn format_results_table(results: &[Recommendation]) -> String {
    if results.is_empty() {
        return "No matching achievement standards found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Achievement Standard").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let (relevance_str, color) = match result.relevance {
            RelevanceLevel::Identical => ("IDENTICAL", Color::Green),
            RelevanceLevel::HighlySimilar => ("HIGHLY_SIMILAR", Color::Cyan),
            RelevanceLevel::Similar => ("SIMILAR", Color::Yellow),
            RelevanceLevel::Relevant => ("RELEVANT", Color::White),
        };

        table.add_row(vec![
            Cell::new(format!("{}", idx + 1)),
            Cell::new(truncate_chars(&result.content, 70)),
            Cell::new(relevance_str).fg(color),
            Cell::new(format!("{:.3}", result.score)),
        ]);
    }

    table.to_string()
}

/// Format recommendations as JSON
fn format_results_json(results: &[Recommendation]) -> Result<String> {
    serde_json::to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")
}

/// Display detailed view of a single recommendation
fn display_result_detail(result: &Recommendation, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Relevance: {:?}", result.relevance);
    println!("Score: {:.3}", result.score);
    println!("\nStandard:\n{}", result.content);
    println!("{}", "═".repeat(80));
}

/// Print a completed search outcome in the selected format
fn print_outcome(
    outcome: &SearchOutcome,
    selection: &Selection,
    format: &OutputFormat,
    elapsed_secs: f64,
) -> Vec<Recommendation> {
    match outcome {
        SearchOutcome::EmptySelection => {
            let grade = selection
                .grade
                .map(|g| format!("{} ", g))
                .unwrap_or_default();
            println!(
                "No standards found for {}{} - check the grade/subject selection against the corpus.",
                grade, selection.subject
            );
            Vec::new()
        }
        SearchOutcome::Results(results) => {
            match format {
                OutputFormat::Table => {
                    println!("{}", format_results_table(results));
                    println!(
                        "\nFound {} recommendations in {:.2}s",
                        results.len(),
                        elapsed_secs
                    );
                }
                OutputFormat::Json => match format_results_json(results) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Error formatting JSON: {}", e),
                },
            }
            results.clone()
        }
    }
}

fn print_repl_help(has_grade_axis: bool) {
    println!("Commands:");
    println!("  <activity text>   - Recommend standards for the activity");
    if has_grade_axis {
        println!("  /grade BAND       - Select grade band (1~2학년, 3~4학년, 5~6학년)");
    }
    println!("  /subject NAME     - Select subject");
    println!("  /top N            - Set number of results to N");
    println!("  /format table     - Use table output format");
    println!("  /format json      - Use JSON output format");
    println!("  /detail N         - Show full details for result rank N");
    println!("  /help             - Show this help");
    println!("  Ctrl+D or Ctrl+C  - Exit");
}

/// Run interactive REPL mode
async fn run_interactive<E: EmbeddingProvider>(
    engine: CosineSearchEngine<E>,
    corpus_path: PathBuf,
    level: SchoolLevel,
    mut selection: Selection,
    mut top_k: usize,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Achievement Standard Recommender");
    print_repl_help(level.has_grade_axis());
    println!();
    match selection.grade {
        Some(grade) => println!("Selection: {} / {}", grade, selection.subject),
        None => println!("Selection: {}", selection.subject),
    }
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    let mut last_results: Vec<Recommendation> = Vec::new();

    loop {
        let readline = rl.readline("Activity> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    println!("Please describe the classroom activity.");
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_repl_help(level.has_grade_axis()),
                        "/grade" => {
                            if !level.has_grade_axis() {
                                eprintln!("{} school corpora have no grade axis", level);
                                continue;
                            }
                            if parts.len() != 2 {
                                eprintln!("Usage: /grade BAND");
                                continue;
                            }
                            match parts[1].parse::<GradeBand>() {
                                Ok(grade) => {
                                    selection.grade = Some(grade);
                                    println!("Set grade band to {}", grade);
                                }
                                Err(e) => eprintln!("{}", e),
                            }
                        }
                        "/subject" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /subject NAME");
                                continue;
                            }
                            match validate_subject(level, parts[1]) {
                                Ok(()) => {
                                    selection.subject = parts[1].to_string();
                                    println!("Set subject to {}", selection.subject);
                                }
                                Err(e) => eprintln!("{}", e),
                            }
                        }
                        "/top" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /top N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(n) if n > 0 => {
                                    top_k = n;
                                    println!("Set top-k to {}", top_k);
                                }
                                _ => eprintln!("Invalid number: must be a positive integer"),
                            }
                        }
                        "/format" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /format [table|json]");
                                continue;
                            }
                            match parts[1] {
                                "table" => {
                                    format = OutputFormat::Table;
                                    println!("Set output format to table");
                                }
                                "json" => {
                                    format = OutputFormat::Json;
                                    println!("Set output format to JSON");
                                }
                                _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                            }
                        }
                        "/detail" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /detail N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(rank) if rank > 0 && rank <= last_results.len() => {
                                    display_result_detail(&last_results[rank - 1], rank);
                                }
                                Ok(rank) if rank > last_results.len() => {
                                    eprintln!(
                                        "Rank {} out of range (last search had {} results)",
                                        rank,
                                        last_results.len()
                                    );
                                }
                                _ => eprintln!("Invalid rank: must be a positive integer"),
                            }
                        }
                        _ => eprintln!(
                            "Unknown command: {}. Type /help for available commands.",
                            parts[0]
                        ),
                    }
                } else {
                    let start = Instant::now();
                    match execute_search(&engine, &corpus_path, &selection, line, top_k).await {
                        Ok(outcome) => {
                            let elapsed = start.elapsed().as_secs_f64();
                            last_results = print_outcome(&outcome, &selection, &format, elapsed);
                        }
                        Err(e) => {
                            eprintln!("Search failed: {:#}", e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query<E: EmbeddingProvider>(
    engine: CosineSearchEngine<E>,
    corpus_path: PathBuf,
    selection: Selection,
    query: &str,
    top_k: usize,
    format: OutputFormat,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("Please describe the classroom activity.");
        return Ok(());
    }

    let start = Instant::now();
    let outcome = execute_search(&engine, &corpus_path, &selection, query, top_k).await?;
    let elapsed = start.elapsed().as_secs_f64();
    print_outcome(&outcome, &selection, &format, elapsed);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);

    // Validate arguments
    if !args.interactive && args.query.is_none() {
        anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    if args.grade.is_some() && !args.level.has_grade_axis() {
        anyhow::bail!(
            "--grade only applies to elementary corpora ({} school has no grade axis)",
            args.level
        );
    }
    if args.level.has_grade_axis() && args.grade.is_none() {
        anyhow::bail!("--grade is required for elementary corpora (e.g. --grade 1~2학년)");
    }

    let subject = match &args.subject {
        Some(subject) => {
            validate_subject(args.level, subject)?;
            subject.clone()
        }
        None => anyhow::bail!(
            "--subject is required. Available subjects for {} school: {}",
            args.level,
            args.level.subjects().join(", ")
        ),
    };

    if !args.corpus.exists() {
        anyhow::bail!(
            "Corpus file not found: {}\n\
             Please run the build_corpus binary first to create the corpus.",
            args.corpus.display()
        );
    }

    // Probe the corpus once for an early, friendly failure; searches re-read it
    let corpus = CorpusIndex::load(&args.corpus)
        .with_context(|| format!("Failed to load corpus from {}", args.corpus.display()))?;
    if corpus.is_empty() {
        anyhow::bail!(
            "Corpus is empty (0 standards found).\n\
             Please run the build_corpus binary with a non-empty input."
        );
    }
    info!("Corpus contains {} standards", corpus.len());

    let embedding_provider = create_embedding_provider(&args)?;
    info!("Embedding provider initialized successfully");

    let engine = CosineSearchEngine::new(embedding_provider);
    let selection = Selection {
        grade: args.grade,
        subject,
    };

    if args.interactive {
        run_interactive(
            engine,
            args.corpus,
            args.level,
            selection,
            args.top_k,
            args.format,
        )
        .await?;
    } else {
        let query = args.query.unwrap_or_default();
        run_single_query(engine, args.corpus, selection, &query, args.top_k, args.format).await?;
    }

    Ok(())
}
