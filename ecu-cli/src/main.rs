use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ecu_defs::{
    ConversionTable, DefinitionRegistry, LoadPolicy, LoadReport, ParameterDefinition, PvField,
    UnitSystem,
};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "ecu-defs-cli", about = "Inspect ECU parameter tables and decode raw PID data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command that loads a PID table.
#[derive(Args)]
struct TableArgs {
    /// Tab-separated PID table
    pids: PathBuf,

    /// YAML conversion table; without it every item decodes as text
    #[arg(short, long)]
    conversions: Option<PathBuf>,

    /// Unit system (metric, imperial)
    #[arg(short, long, default_value = "metric")]
    units: String,

    /// Abort on the first malformed row instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging with timing info
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Summarise a PID table
    Info {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Report malformed rows and unknown conversions
    Validate {
        #[command(flatten)]
        table: TableArgs,

        /// Print summary count only
        #[arg(short, long)]
        summary: bool,
    },

    /// List all definitions of a service
    List {
        #[command(flatten)]
        table: TableArgs,

        /// Service id (decimal, or hex with 0x or # prefix)
        #[arg(short, long)]
        service: String,
    },

    /// Decode a raw data buffer for one service/PID
    Decode {
        #[command(flatten)]
        table: TableArgs,

        /// Service id (decimal, or hex with 0x or # prefix)
        #[arg(short, long)]
        service: String,

        /// PID (decimal, or hex with 0x or # prefix)
        #[arg(short, long)]
        pid: String,

        /// Data bytes as hex, e.g. "1A0A" or "1A 0A"
        #[arg(short, long)]
        data: String,

        /// Print process variables as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn parse_units(s: &str) -> Result<UnitSystem> {
    match UnitSystem::from_name(s) {
        Some(units) => Ok(units),
        None => bail!("Unknown unit system: {s}. Use metric or imperial"),
    }
}

fn parse_id(s: &str) -> Result<u32> {
    ecu_defs::parse_numeric_id(s).with_context(|| format!("invalid id '{s}'"))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        bail!("hex data contains non-ASCII characters: {s}");
    }
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        bail!("hex data has an odd number of digits: {s}");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn load_registry(args: &TableArgs) -> Result<(DefinitionRegistry, LoadReport)> {
    init_logging(args.verbose);
    let start = Instant::now();

    let conversions = match &args.conversions {
        Some(path) => ecu_defs::read_conversions_file(path)
            .with_context(|| format!("reading conversions from {}", path.display()))?,
        None => ConversionTable::new(),
    };
    let policy = if args.strict {
        LoadPolicy::Strict
    } else {
        LoadPolicy::Lenient
    };

    let mut registry = DefinitionRegistry::new(parse_units(&args.units)?);
    let report = registry
        .load_from_path(&args.pids, &conversions, policy)
        .with_context(|| format!("loading PID table {}", args.pids.display()))?;
    log::info!(
        "Loaded {}: {} definitions across {} services",
        args.pids.display(),
        registry.len(),
        registry.services().len()
    );

    if args.verbose {
        eprintln!("Load time: {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    }

    Ok((registry, report))
}

fn run_info(args: &TableArgs) -> Result<()> {
    let (registry, report) = load_registry(args)?;

    println!("File:        {}", args.pids.display());
    println!("Units:       {}", registry.unit_system());
    println!("Definitions: {}", registry.len());
    let services: Vec<String> = registry
        .services()
        .iter()
        .map(|svc| format!("0x{svc:02X} ({} PIDs)", registry.pids(*svc).len()))
        .collect();
    println!("Services:    {} ({})", services.len(), services.join(", "));
    let text_items = registry.iter().filter(|d| d.conversions().is_none()).count();
    if text_items > 0 {
        println!("Text items:  {}", text_items);
    }
    if !report.missing_conversions.is_empty() {
        println!("Missing conversions: {}", report.missing_conversions.len());
    }
    if !report.skipped.is_empty() {
        println!("Skipped rows: {}", report.skipped.len());
    }

    Ok(())
}

fn run_validate(args: &TableArgs, summary: bool) -> Result<()> {
    let (_registry, report) = load_registry(args)?;
    let pids = args.pids.display();

    let mut issues: Vec<String> = report
        .skipped
        .iter()
        .map(|s| format!("line {}: {}", s.line, s.error))
        .collect();
    issues.extend(
        report
            .missing_conversions
            .iter()
            .map(|m| format!("line {}: conversion not found: '{}'", m.line, m.name)),
    );

    if issues.is_empty() {
        println!("{pids}: valid ({} definitions)", report.definitions);
        return Ok(());
    }

    for skipped in &report.skipped {
        log::warn!("Skipped row: line {}: {}", skipped.line, skipped.error);
    }
    if !summary {
        for issue in &issues {
            eprintln!("{pids}: {issue}");
        }
    }
    println!(
        "{pids}: {} issue{}",
        issues.len(),
        if issues.len() == 1 { "" } else { "s" }
    );

    if !report.skipped.is_empty() {
        bail!(
            "{} malformed row{} in {pids}",
            report.skipped.len(),
            if report.skipped.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

fn print_definition(def: &ParameterDefinition) {
    let pv = def.process_var();
    println!(
        "0x{:02X}  ofs={:<3} len={:<2} {:<32} {:>16} {:<8} [{}..{}]{}",
        def.pid(),
        def.offset(),
        def.length(),
        def.label(),
        pv.get(PvField::Value),
        pv.units,
        pv.get(PvField::Min),
        pv.get(PvField::Max),
        if def.is_enabled() { "" } else { " (disabled)" }
    );
}

fn run_list(args: &TableArgs, service: &str) -> Result<()> {
    let service = parse_id(service)?;
    let (registry, _report) = load_registry(args)?;

    let defs = registry.get_by_service(service);
    if defs.is_empty() {
        bail!("no definitions for service 0x{service:02X}");
    }
    for def in defs {
        print_definition(def);
    }
    Ok(())
}

fn run_decode(args: &TableArgs, service: &str, pid: &str, data: &str, json: bool) -> Result<()> {
    let service = parse_id(service)?;
    let pid = parse_id(pid)?;
    let buffer = parse_hex(data)?;
    let (mut registry, _report) = load_registry(args)?;

    registry.update_from_buffer(service, pid, &buffer);
    let Some(defs) = registry.get_by_service_and_pid(service, pid) else {
        bail!("no definitions for service 0x{service:02X} PID 0x{pid:02X}");
    };

    if json {
        let pvs: Vec<_> = defs.iter().map(|d| d.process_var()).collect();
        println!("{}", serde_json::to_string_pretty(&pvs).context("serializing JSON")?);
    } else {
        for def in defs {
            print_definition(def);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Info { table } => run_info(&table),
        Command::Validate { table, summary } => run_validate(&table, summary),
        Command::List { table, service } => run_list(&table, &service),
        Command::Decode {
            table,
            service,
            pid,
            data,
            json,
        } => run_decode(&table, &service, &pid, &data, json),
    }
}
