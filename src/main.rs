//! Rowgen CLI - Generate CSV columns with a local LLM
//!
//! # Main Commands
//!
//! ```bash
//! rowgen run data.csv -t "Capital of @[country]?" -c capital   # Run a batch job
//! rowgen preview data.csv -t "Capital of @[country]?" -r 2     # Resolve without calling the backend
//! rowgen models                                                # List models on the Ollama server
//! rowgen inspect data.csv                                      # Show headers and row count
//! ```
//!
//! Prompt templates reference columns with `@[column]`, optionally suffixed
//! with `.at(pos)`, `.range(start, end)`, or `.exclusive_range(start, end)`
//! where positions are 1-based numbers or `THIS`, `THIS±n`, `END`.

use clap::{Parser, Subcommand};
use rowgen::{
    parse_csv_file_auto, run_job, write_csv_file, JobSpec, OllamaClient, SamplingOptions,
    DEFAULT_BASE_URL,
};
use std::env;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "rowgen")]
#[command(about = "Generate CSV columns from prompt templates with a local LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch generation job over a CSV file
    Run {
        /// Input CSV file
        input: PathBuf,

        /// Prompt template, e.g. "Summarize @[title]: @[body]"
        #[arg(short, long)]
        template: String,

        /// Output column name (added if it does not exist)
        #[arg(short, long)]
        column: String,

        /// Rows to process: "all", "2, 5", "2 to 6"
        #[arg(short, long, default_value = "all")]
        rows: String,

        /// Output CSV file (default: overwrite input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model name (default: $OLLAMA_MODEL)
        #[arg(short, long)]
        model: Option<String>,

        /// Ollama server URL (default: $OLLAMA_URL or http://localhost:11434)
        #[arg(long)]
        url: Option<String>,

        /// System prompt sent with every request
        #[arg(long)]
        system: Option<String>,

        /// Sampling temperature
        #[arg(long, default_value = "0.7")]
        temperature: f64,

        /// Nucleus sampling probability
        #[arg(long, default_value = "0.9")]
        top_p: f64,

        /// Fixed sampling seed for reproducible runs
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Use non-deterministic sampling (ignores --seed)
        #[arg(long)]
        random_seed: bool,

        /// Context window size
        #[arg(long, default_value = "8192")]
        num_ctx: u32,
    },

    /// Resolve a template for one row without calling the backend
    Preview {
        /// Input CSV file
        input: PathBuf,

        /// Prompt template
        #[arg(short, long)]
        template: String,

        /// 1-based row to resolve against
        #[arg(short, long, default_value = "1")]
        row: usize,
    },

    /// List models available on the Ollama server
    Models {
        /// Ollama server URL (default: $OLLAMA_URL or http://localhost:11434)
        #[arg(long)]
        url: Option<String>,
    },

    /// Show headers and row count of a CSV file
    Inspect {
        /// Input CSV file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            template,
            column,
            rows,
            output,
            model,
            url,
            system,
            temperature,
            top_p,
            seed,
            random_seed,
            num_ctx,
        } => {
            let options = SamplingOptions {
                temperature,
                top_p,
                seed: if random_seed { None } else { Some(seed) },
                num_ctx,
            };
            cmd_run(
                &input,
                template,
                column,
                rows,
                output.as_deref(),
                model,
                url,
                system,
                options,
            )
            .await
        }

        Commands::Preview {
            input,
            template,
            row,
        } => cmd_preview(&input, &template, row),

        Commands::Models { url } => cmd_models(url).await,

        Commands::Inspect { input } => cmd_inspect(&input),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Server URL from flag, environment, or default.
fn resolve_url(url: Option<String>) -> String {
    url.or_else(|| env::var("OLLAMA_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Model from flag or environment.
fn resolve_model(model: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    model
        .or_else(|| env::var("OLLAMA_MODEL").ok())
        .ok_or_else(|| "no model given (use --model or set OLLAMA_MODEL)".into())
}

async fn cmd_run(
    input: &Path,
    template: String,
    column: String,
    rows: String,
    output: Option<&Path>,
    model: Option<String>,
    url: Option<String>,
    system: Option<String>,
    options: SamplingOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let parsed = parse_csv_file_auto(input)?;
    let mut dataset = parsed.dataset;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Rows: {}", dataset.len());
    eprintln!("   Columns: {}", dataset.columns.join(", "));

    let model = resolve_model(model)?;
    let mut client = OllamaClient::new(resolve_url(url), &model).with_options(options);
    if let Some(system) = system {
        client = client.with_system_prompt(system);
    }
    eprintln!("   Model: {} @ {}", model, client.base_url());

    // Ctrl-C requests a cooperative stop; the in-flight call is torn down.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Stop requested, finishing up...");
            ctrl_c_cancel.cancel();
        }
    });

    let spec = JobSpec::new(template, column, rows);
    let out_path = output.unwrap_or(input);

    let report = match run_job(&mut dataset, &spec, &client, cancel, None).await {
        Ok(report) => report,
        Err(err) => {
            // Rows committed before an abort are kept.
            write_csv_file(&dataset, out_path, parsed.delimiter)?;
            eprintln!("💾 Partial results saved to: {}", out_path.display());
            return Err(err.into());
        }
    };

    write_csv_file(&dataset, out_path, parsed.delimiter)?;
    eprintln!("💾 Saved to: {}", out_path.display());

    eprintln!("\n{}", "=".repeat(70));
    eprintln!("📊 SUMMARY");
    eprintln!("{}", "=".repeat(70));
    eprintln!("   Committed:  {}/{}", report.processed, report.total);
    eprintln!("   Failures:   {}", report.failures.len());
    for failure in &report.failures {
        eprintln!("     Row {}: {}", failure.row, failure.message);
    }
    eprintln!("   {}", report.summary());
    eprintln!("{}", "=".repeat(70));

    if !report.is_success() && !report.cancelled {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_preview(
    input: &Path,
    template: &str,
    row: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_csv_file_auto(input)?;
    if row == 0 || row > parsed.dataset.len() {
        return Err(format!(
            "row {} out of range (1 to {})",
            row,
            parsed.dataset.len()
        )
        .into());
    }

    let prompt = rowgen::interpolate(template, &parsed.dataset, row - 1);
    println!("{}", prompt);
    Ok(())
}

async fn cmd_models(url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let url = resolve_url(url);
    let client = OllamaClient::new(&url, "");
    let models = client.list_models().await?;

    if models.is_empty() {
        eprintln!("No models found on {}", url);
    } else {
        for model in models {
            println!("{}", model);
        }
    }
    Ok(())
}

fn cmd_inspect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_csv_file_auto(input)?;

    eprintln!("📄 {}", input.display());
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!(
        "   Delimiter: '{}'",
        match parsed.delimiter {
            '\t' => "\\t".to_string(),
            c => c.to_string(),
        }
    );
    eprintln!("   Rows: {}", parsed.dataset.len());
    eprintln!("   Columns:");
    for (i, col) in parsed.dataset.columns.iter().enumerate() {
        eprintln!("     [{:2}] {}", i + 1, col);
    }
    Ok(())
}
