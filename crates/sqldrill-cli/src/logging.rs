//! stderr logging for the `sqldrill` binary.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "debug";

/// Filter directives: `--verbose` wins, then `RUST_LOG`, then `warn`.
pub fn filter_directives(verbose: bool, rust_log: Option<&str>) -> String {
    if verbose {
        return VERBOSE_DIRECTIVE.to_owned();
    }
    match rust_log.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives.to_owned(),
        _ => DEFAULT_DIRECTIVE.to_owned(),
    }
}

/// Install the global fmt subscriber. A second call is a no-op.
pub fn init(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("warning: ignoring invalid log filter '{directives}': {e}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
