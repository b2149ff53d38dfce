use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use procure_tools::agent::gemini::GeminiClient;
use procure_tools::agent::{DocumentKind, SourceDocument};
use procure_tools::config::{
    ApiKey, DEFAULT_ENDPOINT, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_TIMEOUT_SECS, GeminiModel,
    ModelConfig, SessionConfig,
};
use procure_tools::io::excel_read::{self, LoadReport, MasterSource};
use procure_tools::model::LookupQuery;
use procure_tools::schema::SchemaVariant;
use procure_tools::{Result, ToolError, lookup, session};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.debug) {
        eprintln!("error: {error}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Process(args) => execute_process(args, cli.debug),
        Command::Inspect(args) => execute_inspect(args),
        Command::Lookup(args) => execute_lookup(args),
    }
}

fn execute_process(args: ProcessArgs, debug: bool) -> Result<ExitCode> {
    let documents = args.documents()?;
    let sources = read_sources(&args.master.master_data)?;

    let mut model_config = ModelConfig::new(ApiKey::new(args.api_key)?, args.model.into());
    model_config.endpoint = args.endpoint;
    model_config.timeout = Duration::from_secs(args.timeout_secs);
    model_config.max_tool_rounds = args.max_tool_rounds;
    let client = GeminiClient::new(&model_config)?;

    let session_config = SessionConfig {
        schema: args.schema.into(),
        strict_schema: args.strict_schema,
    };
    let outcome = session::run_session(&session_config, documents, &sources, &client)?;

    for failure in &outcome.load_failures {
        eprintln!("warning: skipped master data '{}': {}", failure.source, failure.reason);
    }
    if let Some(text) = &outcome.response_text {
        println!("{text}");
    }
    if let Some(failure) = &outcome.model_failure {
        eprintln!("warning: model failed after the record was generated: {failure}");
    }
    if debug {
        for call in &outcome.tool_calls {
            println!("[{}] {} -> {}", call.tool, call.args, call.result);
        }
    }

    match outcome.write_outputs(&args.out_dir, args.output_name.as_deref())? {
        Some((csv_path, json_path)) => {
            println!("CSV written to {}", csv_path.display());
            println!("JSON written to {}", json_path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("warning: the model finished without generating a record");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn execute_inspect(args: MasterArgs) -> Result<ExitCode> {
    let report = load_report(&args.master_data)?;
    for summary in report.tables.summaries() {
        println!(
            "{} ({} rows, {} columns)",
            summary.key,
            summary.row_count,
            summary.columns.len()
        );
        println!("  columns: {}", summary.columns.join(", "));
        for row in &summary.preview {
            println!("  | {}", row.join(" | "));
        }
    }
    Ok(if report.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn execute_lookup(args: LookupArgs) -> Result<ExitCode> {
    let report = load_report(&args.master.master_data)?;
    if report.is_empty() {
        return Err(ToolError::NoMasterData);
    }
    let query = LookupQuery::new(args.table, args.lookup_column, args.value, args.return_column);
    let outcome = lookup::lookup(&report.tables, &query);
    println!("{outcome}");
    Ok(if outcome.is_found() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn read_sources(paths: &[PathBuf]) -> Result<Vec<MasterSource>> {
    paths
        .iter()
        .map(|path| MasterSource::from_path(path))
        .collect()
}

fn load_report(paths: &[PathBuf]) -> Result<LoadReport> {
    let report = excel_read::load_master_data(&read_sources(paths)?);
    for failure in &report.failures {
        eprintln!("warning: skipped master data '{}': {}", failure.source, failure.reason);
    }
    Ok(report)
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Extract procurement records from PDFs with Gemini and master data lookups."
)]
struct Cli {
    /// Verbose logging and tool-call transcript.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a document set into a CSV and JSON record.
    Process(ProcessArgs),
    /// Show the tables, columns and first rows of master data files.
    Inspect(MasterArgs),
    /// Run a single master data lookup.
    Lookup(LookupArgs),
}

#[derive(clap::Args)]
struct MasterArgs {
    /// Master data spreadsheet (xlsx, xlsb, xls, ods). Repeatable.
    #[arg(long = "master-data", required = true)]
    master_data: Vec<PathBuf>,
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Model used for extraction.
    #[arg(long, value_enum, default_value_t = ModelArg::Gemini25Pro)]
    model: ModelArg,

    /// Purchase order PDF.
    #[arg(long)]
    purchase_order: Option<PathBuf>,

    /// Tax invoice PDF.
    #[arg(long)]
    invoice: Option<PathBuf>,

    /// Contract PDF.
    #[arg(long)]
    contract: Option<PathBuf>,

    /// Ticket PDF carrying requestor and approver details.
    #[arg(long)]
    ticket: Option<PathBuf>,

    #[command(flatten)]
    master: MasterArgs,

    /// Output record layout.
    #[arg(long, value_enum, default_value_t = SchemaArg::Base)]
    schema: SchemaArg,

    /// Reject records that miss any schema field.
    #[arg(long)]
    strict_schema: bool,

    /// Directory receiving the CSV and JSON files.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Custom output file name; `.csv` is appended when missing.
    #[arg(long)]
    output_name: Option<String>,

    /// Base URL of the Gemini API.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Maximum model turns that may request tool calls.
    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    max_tool_rounds: usize,

    /// HTTP timeout per request, in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl ProcessArgs {
    fn documents(&self) -> Result<Vec<SourceDocument>> {
        [
            (DocumentKind::PurchaseOrder, &self.purchase_order),
            (DocumentKind::Invoice, &self.invoice),
            (DocumentKind::Contract, &self.contract),
            (DocumentKind::Ticket, &self.ticket),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.as_ref().map(|path| (kind, path)))
        .map(|(kind, path)| SourceDocument::from_path(kind, path))
        .collect()
    }
}

#[derive(clap::Args)]
struct LookupArgs {
    #[command(flatten)]
    master: MasterArgs,

    /// Table key: file name, or `file_sheet` for multi-sheet files.
    #[arg(long)]
    table: String,

    /// Column searched for the value.
    #[arg(long)]
    lookup_column: String,

    /// Case-insensitive text to search for.
    #[arg(long)]
    value: String,

    /// Column whose value is returned.
    #[arg(long)]
    return_column: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelArg {
    #[value(name = "gemini-2.5-pro")]
    Gemini25Pro,
    #[value(name = "gemini-2.5-flash")]
    Gemini25Flash,
    #[value(name = "gemini-1.5-pro")]
    Gemini15Pro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Gemini25Pro => GeminiModel::Pro25,
            ModelArg::Gemini25Flash => GeminiModel::Flash25,
            ModelArg::Gemini15Pro => GeminiModel::Pro15,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaArg {
    Base,
    Extended,
}

impl From<SchemaArg> for SchemaVariant {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Base => SchemaVariant::Base,
            SchemaArg::Extended => SchemaVariant::Extended,
        }
    }
}
