mod logging;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sqldrill_error::ConfigError;
use sqldrill_harness::config::DEFAULT_CONFIG_FILE;
use sqldrill_harness::report::ReportContext;
use sqldrill_harness::{
    CaseRegistry, DrillConfig, FixtureDocument, FixtureLoader, Runner, SqliteConnector,
    check_determinism, dognition_registry, render_json, render_text,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    command: Option<Command>,
    config_path: Option<PathBuf>,
    fixture_path: Option<PathBuf>,
    case_files: Vec<PathBuf>,
    no_catalog: bool,
    database: Option<String>,
    timeout_ms: Option<u64>,
    parallelism: Option<usize>,
    filter: Option<String>,
    json: bool,
    determinism: bool,
    verbose: bool,
    show_help: bool,
}

fn main() {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let exit_code = run(std::env::args_os(), &mut stdout, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Exit codes: 0 when every case passed, 1 on any FAIL/ERROR or determinism
/// divergence, 2 on usage errors and fatal setup errors.
fn run<I, W, E>(args: I, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = write_usage(err);
            return 2;
        }
    };

    if options.show_help {
        return i32::from(write_usage(out).is_err());
    }
    let Some(command) = options.command else {
        let _ = writeln!(err, "error: missing command");
        let _ = write_usage(err);
        return 2;
    };

    logging::init(options.verbose);

    let result = match command {
        Command::Run => run_cases(&options, out),
        Command::List => list_cases(&options, out),
    };
    match result {
        Ok(code) => code,
        Err(error) => {
            let _ = writeln!(err, "error: {error}");
            if let Some(hint) = error.suggestion() {
                let _ = writeln!(err, "hint: {hint}");
            }
            error.exit_code()
        }
    }
}

#[allow(clippy::too_many_lines)]
fn parse_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();

    let mut options = CliOptions {
        command: None,
        config_path: None,
        fixture_path: None,
        case_files: Vec::new(),
        no_catalog: false,
        database: None,
        timeout_ms: None,
        parallelism: None,
        filter: None,
        json: false,
        determinism: false,
        verbose: false,
        show_help: false,
    };

    while let Some(argument) = iter.next() {
        let arg = argument.to_string_lossy().into_owned();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_owned(), Some(value.to_owned())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => iter
                    .next()
                    .map(|v| v.to_string_lossy().into_owned())
                    .ok_or_else(|| format!("missing value for `{name}`")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => options.show_help = true,
            "-v" | "--verbose" => options.verbose = true,
            "--json" => options.json = true,
            "--determinism" => options.determinism = true,
            "--no-catalog" => options.no_catalog = true,
            "--config" => options.config_path = Some(PathBuf::from(value("--config")?)),
            "--fixture" => options.fixture_path = Some(PathBuf::from(value("--fixture")?)),
            "--cases" => options.case_files.push(PathBuf::from(value("--cases")?)),
            "--database" => options.database = Some(value("--database")?),
            "--filter" => options.filter = Some(value("--filter")?),
            "--timeout-ms" => {
                options.timeout_ms = Some(parse_number(&value("--timeout-ms")?, "--timeout-ms")?);
            }
            "--parallel" => {
                options.parallelism = Some(parse_number(&value("--parallel")?, "--parallel")?);
            }
            other if other.starts_with('-') => return Err(format!("unknown option `{other}`")),
            other => {
                if options.command.is_some() {
                    return Err(format!("unexpected argument `{other}`"));
                }
                options.command = Some(match other {
                    "run" => Command::Run,
                    "list" => Command::List,
                    _ => return Err(format!("unknown command `{other}`")),
                });
            }
        }
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid integer for `{flag}`: `{value}`"))
}

/// Config file (explicit, or `sqldrill.toml` in the working directory if
/// present) with command-line overrides applied.
fn resolve_config(options: &CliOptions) -> Result<DrillConfig, ConfigError> {
    let mut config = match &options.config_path {
        Some(path) => DrillConfig::from_path(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            DrillConfig::from_path(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => DrillConfig::default(),
    };

    if let Some(database) = &options.database {
        config.database.clone_from(database);
    }
    if let Some(ms) = options.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(parallelism) = options.parallelism {
        config.parallelism = parallelism;
    }
    if let Some(fixture) = &options.fixture_path {
        config.fixture_path = Some(fixture.clone());
    }
    if options.no_catalog {
        config.catalog = false;
    }
    config.case_files.extend(options.case_files.iter().cloned());
    if options.filter.is_some() {
        config.filter.clone_from(&options.filter);
    }
    config.validate()?;
    Ok(config)
}

fn build_registry(config: &DrillConfig) -> sqldrill_error::Result<CaseRegistry> {
    let mut registry = if config.catalog {
        dognition_registry()?
    } else {
        CaseRegistry::new()
    };
    for path in &config.case_files {
        registry.extend_from(&CaseRegistry::from_case_file(path)?)?;
    }
    if let Some(pattern) = &config.filter {
        registry = registry.filtered(pattern);
    }
    Ok(registry)
}

fn list_cases<W: Write>(options: &CliOptions, out: &mut W) -> sqldrill_error::Result<i32> {
    let config = resolve_config(options)?;
    let registry = build_registry(&config)?;
    let width = registry.iter().map(|c| c.id.len()).max().unwrap_or(0);
    for case in &registry {
        let mode = if case.is_informational() {
            "informational"
        } else {
            "strict"
        };
        writeln!(out, "{:<width$}  {mode:<13}  {}", case.id, case.title)?;
    }
    writeln!(out, "{} cases", registry.len())?;
    Ok(0)
}

fn run_cases<W: Write>(options: &CliOptions, out: &mut W) -> sqldrill_error::Result<i32> {
    let config = resolve_config(options)?;
    let registry = build_registry(&config)?;
    let Some(fixture_path) = config.fixture_path.as_deref() else {
        return Err(ConfigError::Invalid {
            field: "fixture.path",
            detail: "no fixture given; pass --fixture or set [fixture] path".to_owned(),
        }
        .into());
    };
    let document = FixtureDocument::from_path(fixture_path)?;
    let loader = FixtureLoader::new(SqliteConnector::new(config.sqlite_config()));
    let run_options = config.run_options();

    let (context, outcome) = {
        let handle = loader.load(&document)?;
        let outcome = Runner::new(run_options).run(&registry, &handle);
        let context = ReportContext {
            fixture: handle.name().to_owned(),
            fingerprint: handle.fingerprint().to_owned(),
            engine: handle.engine_name().to_owned(),
        };
        (context, outcome)
    };

    if options.json {
        let rendered = render_json(&context, &outcome.results).map_err(io::Error::other)?;
        writeln!(out, "{rendered}")?;
    } else {
        write!(out, "{}", render_text(&context, &outcome.results))?;
    }

    let mut code = i32::from(!outcome.summary().is_success());
    if options.determinism {
        let report = check_determinism(&loader, &document, &registry, &run_options)?;
        writeln!(
            out,
            "determinism: {} compared, {} informational skipped, {} divergent",
            report.compared,
            report.skipped_informational,
            report.divergent.len()
        )?;
        for divergence in &report.divergent {
            writeln!(
                out,
                "  {}: {} then {}",
                divergence.case_id, divergence.first, divergence.second
            )?;
        }
        if !report.is_deterministic() {
            code = 1;
        }
    }
    info!(exit_code = code, "sqldrill finished");
    Ok(code)
}

fn write_usage<W>(out: &mut W) -> io::Result<()>
where
    W: Write,
{
    writeln!(
        out,
        "Usage: sqldrill <run|list> [OPTIONS]\n\
         \n\
         Options:\n\
         \x20 --config FILE       Config file (default: ./{DEFAULT_CONFIG_FILE} if present)\n\
         \x20 --fixture FILE      Fixture JSON to load\n\
         \x20 --cases FILE        Extra case file (repeatable)\n\
         \x20 --no-catalog        Leave out the built-in exercise catalog\n\
         \x20 --database DB       :memory: or a SQLite file path\n\
         \x20 --timeout-ms N      Per-query timeout\n\
         \x20 --parallel N        Worker threads\n\
         \x20 --filter TEXT       Only cases whose id contains TEXT\n\
         \x20 --json              JSON report instead of text\n\
         \x20 --determinism       Reload and run twice, compare statuses\n\
         \x20 -v, --verbose       Debug logging on stderr\n\
         \x20 -h, --help          Show this help\n\
         \n\
         Examples:\n\
         \n\
         sqldrill list --filter ex08\n\
         sqldrill run --fixture dognition.json\n\
         sqldrill run --fixture sample.json --no-catalog --cases sample_cases.json --json\n",
    )
}
