use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::{ArgGroup, Parser, ValueEnum};
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use termcolor::{ColorChoice, StandardStream};

use geolocate::config::{ConfigStore, Configuration};
use geolocate::input::InputSource;
use geolocate::{logging, LineRewriter, LocationFormatter, LocatorRegistry, LocatorTag, Verbosity};

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::BrokenPipe {
                return true;
            }
        }
    }
    false
}

/// Find IPv4 addresses in text and append their geolocation.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("input").args(["text", "stream", "file"])))]
struct Args {
    /// Text to analyze. Enclose it in quotes if it has spaces
    #[clap(value_name = "TEXT")]
    text: Option<String>,

    /// Read lines from standard input, e.g. from a shell pipe
    #[clap(short, long)]
    stream: bool,

    /// Read lines from a file, "-" for standard input
    #[clap(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    file: Option<Utf8PathBuf>,

    /// 0: continent, 1: + country, 2: + city, 3: + latitude and longitude
    #[clap(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    /// Show enabled locators, most preferred first
    #[clap(short = 'l', long)]
    show_enabled: bool,

    /// Show disabled locators
    #[clap(short = 'd', long)]
    show_disabled: bool,

    /// Set enabled locators in order of preference
    #[clap(short = 'p', long, value_name = "LOCATOR", num_args = 1..)]
    set_preference: Option<Vec<String>>,

    /// Restore the default locators preference
    #[clap(short, long)]
    reset: bool,

    /// Set the webservice user id
    #[clap(short = 'u', long, value_name = "USER_ID")]
    set_user: Option<String>,

    /// Set the webservice license key
    #[clap(short = 'w', long, value_name = "LICENSE_KEY")]
    set_password: Option<String>,

    /// Show the webservice user id
    #[clap(short = 'i', long)]
    show_user: bool,

    /// Show the webservice license key
    #[clap(short = 'k', long)]
    show_password: bool,

    /// Highlight annotations
    #[clap(short = 'C', long, value_enum, default_value_t = ArgsColorChoice::Auto)]
    color: ArgsColorChoice,

    /// Directory holding configuration and the local database
    #[clap(long, value_name = "DIR", value_hint = clap::ValueHint::DirPath, env = "GEOLOCATE_HOME")]
    config_dir: Option<Utf8PathBuf>,

    /// Log what the locators are doing to stderr
    #[clap(long)]
    debug: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
enum ArgsColorChoice {
    Always,
    Never,
    Auto,
}

/// Configuration changes and queries requested on the command line.
#[derive(Debug, PartialEq)]
enum ConfigAction {
    SetUser(String),
    SetPassword(String),
    SetPreference(Vec<String>),
    ResetPreference,
    ShowEnabled,
    ShowDisabled,
    ShowUser,
    ShowPassword,
}

impl ConfigAction {
    /// Actions in the order they run: changes first, then queries.
    fn from_args(args: &Args) -> Vec<ConfigAction> {
        let mut actions = Vec::new();
        if let Some(user) = &args.set_user {
            actions.push(ConfigAction::SetUser(user.clone()));
        }
        if let Some(key) = &args.set_password {
            actions.push(ConfigAction::SetPassword(key.clone()));
        }
        if let Some(locators) = &args.set_preference {
            actions.push(ConfigAction::SetPreference(locators.clone()));
        }
        if args.reset {
            actions.push(ConfigAction::ResetPreference);
        }
        if args.show_enabled {
            actions.push(ConfigAction::ShowEnabled);
        }
        if args.show_disabled {
            actions.push(ConfigAction::ShowDisabled);
        }
        if args.show_user {
            actions.push(ConfigAction::ShowUser);
        }
        if args.show_password {
            actions.push(ConfigAction::ShowPassword);
        }
        actions
    }

    fn run(&self, store: &ConfigStore, out: &mut dyn Write) -> Result<()> {
        match self {
            ConfigAction::SetUser(user) => store.update(|cfg| cfg.set_user_id(user))?,
            ConfigAction::SetPassword(key) => store.update(|cfg| cfg.set_license_key(key))?,
            ConfigAction::SetPreference(locators) => {
                store.update(|cfg| cfg.set_locators_preference(locators))?
            }
            ConfigAction::ResetPreference => store.update(|cfg| {
                cfg.reset_locators_preference();
                Ok(())
            })?,
            ConfigAction::ShowEnabled => {
                let config = store.load()?;
                print_locators(out, "Enabled locators:", config.locators_preference())?;
            }
            ConfigAction::ShowDisabled => {
                let config = store.load()?;
                print_locators(out, "Disabled locators:", &config.disabled_locators())?;
            }
            ConfigAction::ShowUser => {
                writeln!(out, "User:\n{}", store.load()?.user_id())?;
            }
            ConfigAction::ShowPassword => {
                writeln!(out, "Password:\n{}", store.load()?.license_key())?;
            }
        }
        Ok(())
    }
}

fn print_locators(out: &mut dyn Write, header: &str, locators: &[LocatorTag]) -> io::Result<()> {
    writeln!(out, "{}", header)?;
    for locator in locators {
        writeln!(out, "{}", locator)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    // Print detailed error information based on environment variables
    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(&mut io::stderr(), "{:?}", err);
    } else {
        let _ = writeln!(&mut io::stderr(), "{:#}", err);
    }

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init_logging(args.debug);

    let store = ConfigStore::new(config_root(args.config_dir.clone())?);

    let actions = ConfigAction::from_args(&args);
    if !actions.is_empty() {
        let mut stdout = io::stdout().lock();
        for action in &actions {
            action.run(&store, &mut stdout)?;
        }
        stdout.flush()?;
    }

    let config = store
        .load()
        .with_context(|| format!("failed to load configuration from {}", store.root()))?;

    let source = match (&args.text, args.stream, &args.file) {
        (Some(text), _, _) => InputSource::Text(text.clone()),
        (None, true, _) => InputSource::Stdin,
        (None, false, Some(path)) => InputSource::from_path(path.clone()),
        (None, false, None) => return Ok(ExitCode::SUCCESS),
    };

    // determine appropriate colormode. auto simply
    // tests if stdout is a tty (if so, then yes color)
    let colormode = match args.color {
        ArgsColorChoice::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Always
            } else {
                ColorChoice::Never
            }
        }
        ArgsColorChoice::Always => ColorChoice::Always,
        ArgsColorChoice::Never => ColorChoice::Never,
    };

    let verbosity = Verbosity::try_from(args.verbosity)?;
    run(&config, source, verbosity, colormode)?;

    Ok(ExitCode::SUCCESS)
}

fn config_root(dir: Option<Utf8PathBuf>) -> Result<Utf8PathBuf> {
    let Some(dir) = dir else {
        return Ok(geolocate::config::default_config_root());
    };
    if dir.is_absolute() {
        return Ok(dir);
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Utf8PathBuf::try_from(cwd.join(&dir))
        .with_context(|| format!("configuration directory {} is not valid UTF-8", dir))
}

fn run(
    config: &Configuration,
    source: InputSource,
    verbosity: Verbosity,
    colormode: ColorChoice,
) -> Result<()> {
    let registry = LocatorRegistry::build(config).context("failed to set up locators")?;

    let display = source.to_string();
    let lines = source
        .lines()
        .with_context(|| format!("failed to read {}", display))?;
    let rewriter = LineRewriter::new(lines, &registry, LocationFormatter::new(verbosity))
        .highlight(colormode == ColorChoice::Always);

    let mut out = io::BufWriter::with_capacity(65536, StandardStream::stdout(colormode));
    let mut ends_with_newline = true;
    for line in rewriter {
        let line = line.with_context(|| format!("failed to read {}", display))?;
        out.write_all(&line)?;
        ends_with_newline = line.ends_with(b"\n");
    }
    if !ends_with_newline {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_run_changes_before_queries() {
        let args = Args::parse_from([
            "geolocate",
            "-i",
            "-u",
            "dante",
            "-l",
            "-p",
            "geoip2_local",
            "geoip2_webservice",
        ]);
        assert_eq!(
            ConfigAction::from_args(&args),
            vec![
                ConfigAction::SetUser("dante".to_string()),
                ConfigAction::SetPreference(vec![
                    "geoip2_local".to_string(),
                    "geoip2_webservice".to_string()
                ]),
                ConfigAction::ShowEnabled,
                ConfigAction::ShowUser,
            ]
        );
    }

    #[test]
    fn text_and_stream_conflict() {
        assert!(Args::try_parse_from(["geolocate", "-s", "8.8.8.8"]).is_err());
    }

    #[test]
    fn verbosity_is_bounded() {
        assert!(Args::try_parse_from(["geolocate", "-v", "4", "8.8.8.8"]).is_err());
        let args = Args::parse_from(["geolocate", "-v", "3", "8.8.8.8"]);
        assert_eq!(args.verbosity, 3);
    }

    #[test]
    fn clap_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
