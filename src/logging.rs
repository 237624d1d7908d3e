use std::env;
use std::path::Path;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter, e.g. `refile=debug`.
pub const LOG_ENV: &str = "REFILE_LOG";

const HOME_PLACEHOLDER: &str = "<USER_HOME>";

/// Installs the global subscriber. Logs go to stderr so they never mix with
/// command output. `REFILE_LOG` wins over `verbose`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "refile=debug" } else { "warn" };
    let filter = env::var(LOG_ENV).unwrap_or_else(|_| default.to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter_layer)
        .try_init();
}

/// Replaces the user's home directory with `<USER_HOME>` for log output.
///
/// ```
/// use refile::logging::sanitize_path;
/// use std::path::Path;
/// // Paths outside the home directory pass through unchanged.
/// assert_eq!(sanitize_path(Path::new("/srv/data")), "/srv/data");
/// ```
pub fn sanitize_path(path: &Path) -> String {
    let shown = path.display().to_string();
    match env::var("HOME") {
        Ok(home) if !home.is_empty() && home != "/" => redact_home(&shown, &home),
        _ => shown,
    }
}

/// Redacts every occurrence of the home directory inside free text, such as
/// an error message that embeds paths.
pub fn sanitize_message(message: &str) -> String {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() && home != "/" => redact_home_in(message, &home),
        _ => message.to_string(),
    }
}

fn redact_home_in(text: &str, home: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(home) {
        let after = &rest[idx + home.len()..];
        let at_boundary = after
            .chars()
            .next()
            .is_none_or(|c| c == std::path::MAIN_SEPARATOR || !(c.is_alphanumeric() || "._-".contains(c)));
        out.push_str(&rest[..idx]);
        out.push_str(if at_boundary { HOME_PLACEHOLDER } else { home });
        rest = after;
    }
    out.push_str(rest);
    out
}

fn redact_home(path: &str, home: &str) -> String {
    match path.strip_prefix(home) {
        Some(rest) if rest.is_empty() || rest.starts_with(std::path::MAIN_SEPARATOR) => {
            format!("{}{}", HOME_PLACEHOLDER, rest)
        }
        _ => path.to_string(),
    }
}
