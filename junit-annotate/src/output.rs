// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Style, style};
use std::{
    fmt,
    io::{self, BufWriter, Stdout, Write},
    marker::PhantomData,
};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log target for events that should be printed without a level prefix.
pub(crate) const NO_HEADING: &str = "junit_annotate::no_heading";

/// Environment variable for a `tracing-subscriber` target filter.
pub(crate) const LOG_ENV: &str = "JUNIT_ANNOTATE_LOG";

/// Set to `1` by GitHub Actions when debug logging is enabled for a workflow run.
pub(crate) const RUNNER_DEBUG_ENV: &str = "RUNNER_DEBUG";

pub(crate) mod clap_styles {
    use clap::builder::{
        Styles,
        styling::{AnsiColor, Effects, Style},
    };

    const HEADER: Style = AnsiColor::Green.on_default().effects(Effects::BOLD);
    const LITERAL: Style = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    const PLACEHOLDER: Style = AnsiColor::Cyan.on_default();
    const ERROR: Style = AnsiColor::Red.on_default().effects(Effects::BOLD);
    const VALID: Style = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    const INVALID: Style = AnsiColor::Yellow.on_default().effects(Effects::BOLD);

    pub(crate) const fn style() -> Styles {
        Styles::styled()
            .header(HEADER)
            .usage(HEADER)
            .literal(LITERAL)
            .placeholder(PLACEHOLDER)
            .error(ERROR)
            .valid(VALID)
            .invalid(INVALID)
    }
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, env = "JUNIT_ANNOTATE_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        value_name = "WHEN",
        env = "JUNIT_ANNOTATE_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Sets up logging to stderr. Debug events are shown with `--verbose` or when the runner has
    /// debug logging enabled.
    pub(crate) fn init(self) {
        let OutputOpts { verbose, color } = self;
        let runner_debug = std::env::var(RUNNER_DEBUG_ENV).is_ok_and(|value| value == "1");

        color.init(verbose || runner_debug);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub(crate) enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

impl Color {
    pub(crate) fn init(self, debug: bool) {
        let mut log_styles = LogStyles::default();
        if self.should_colorize(supports_color::Stream::Stderr) {
            log_styles.colorize();
        }

        INIT_LOGGER.call_once(|| {
            let default_level = if debug {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            };
            let (targets, invalid) = parse_targets(std::env::var(LOG_ENV).ok(), default_level);

            let layer = tracing_subscriber::fmt::layer()
                .event_format(SimpleFormatter { styles: log_styles })
                .with_writer(std::io::stderr)
                .with_filter(targets);

            tracing_subscriber::registry().with(layer).init();

            if let Some(invalid) = invalid {
                warn!("ignoring invalid {LOG_ENV} value `{invalid}`");
            }
        });
    }

    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Builds the log filter from the value of [`LOG_ENV`].
///
/// An unset or empty value uses `default_level` for everything. An invalid value also does, and
/// is returned so it can be reported once logging is up.
fn parse_targets(value: Option<String>, default_level: LevelFilter) -> (Targets, Option<String>) {
    let default = || Targets::new().with_default(default_level);
    match value {
        None => (default(), None),
        Some(value) if value.trim().is_empty() => (default(), None),
        Some(value) => match value.parse::<Targets>() {
            Ok(targets) => (targets, None),
            Err(_) => (default(), Some(value)),
        },
    }
}

struct SimpleFormatter {
    styles: LogStyles,
}

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if metadata.target() != NO_HEADING {
            match *metadata.level() {
                Level::ERROR => {
                    write!(writer, "{}: ", "error".style(self.styles.error))?;
                }
                Level::WARN => {
                    write!(writer, "{}: ", "warning".style(self.styles.warning))?;
                }
                Level::INFO => {
                    write!(writer, "{}: ", "info".style(self.styles.info))?;
                }
                Level::DEBUG | Level::TRACE => {
                    write!(writer, "{}: ", "debug".style(self.styles.debug))?;
                }
            }
        }

        let mut visitor = MessageVisitor {
            writer: &mut writer,
            error: None,
        };

        event.record(&mut visitor);

        if let Some(error) = visitor.error {
            return Err(error);
        }

        writeln!(writer)
    }
}

static MESSAGE_FIELD: &str = "message";

struct MessageVisitor<'writer, 'a> {
    writer: &'a mut format::Writer<'writer>,
    error: Option<fmt::Error>,
}

impl Visit for MessageVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD
            && let Err(error) = write!(self.writer, "{value:?}")
        {
            self.error = Some(error);
        }
    }
}

#[derive(Debug, Default)]
struct LogStyles {
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
}

impl LogStyles {
    fn colorize(&mut self) {
        self.error = style().red().bold();
        self.warning = style().yellow().bold();
        self.info = style().bold();
        self.debug = style().bold();
    }
}

/// Formats `message` as a GitHub Actions `::error::` workflow command.
///
/// The runner reads workflow commands from stdout, one per line, so `%`, CR and LF in the message
/// are percent-encoded.
pub fn error_command(message: &str) -> String {
    let mut command = String::with_capacity(message.len() + 9);
    command.push_str("::error::");
    for c in message.chars() {
        match c {
            '%' => command.push_str("%25"),
            '\r' => command.push_str("%0D"),
            '\n' => command.push_str("%0A"),
            c => command.push(c),
        }
    }
    command
}

/// A helper for capturing stdout in tests.
#[derive(Default)]
pub enum OutputWriter {
    /// No capture
    #[default]
    Normal,
    /// Output captured
    #[cfg(test)]
    Test {
        /// stdout capture
        stdout: Vec<u8>,
    },
}

impl OutputWriter {
    pub(crate) fn stdout_writer(&mut self) -> StdoutWriter<'_> {
        match self {
            Self::Normal => StdoutWriter::Normal {
                buf: BufWriter::new(std::io::stdout()),
                _lifetime: PhantomData,
            },
            #[cfg(test)]
            Self::Test { stdout } => StdoutWriter::Test { buf: stdout },
        }
    }

    #[cfg(test)]
    pub(crate) fn captured_stdout(&self) -> &str {
        match self {
            Self::Normal => "",
            Self::Test { stdout } => std::str::from_utf8(stdout).unwrap_or("<invalid UTF-8>"),
        }
    }
}

pub(crate) enum StdoutWriter<'a> {
    Normal {
        buf: BufWriter<Stdout>,
        _lifetime: PhantomData<&'a ()>,
    },
    #[cfg(test)]
    Test { buf: &'a mut Vec<u8> },
}

impl Write for StdoutWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Self::Normal { buf, .. } => buf.write(data),
            #[cfg(test)]
            Self::Test { buf } => buf.write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Normal { buf, .. } => buf.flush(),
            #[cfg(test)]
            Self::Test { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("plain message", "::error::plain message"; "plain")]
    #[test_case("100% failed", "::error::100%25 failed"; "percent")]
    #[test_case(
        "first\nCaused by:\r\n  second",
        "::error::first%0ACaused by:%0D%0A  second";
        "newlines"
    )]
    #[test_case("", "::error::"; "empty")]
    fn escapes_error_command(message: &str, expected: &str) {
        assert_eq!(error_command(message), expected);
    }

    #[test]
    fn parse_log_targets() {
        let (_, invalid) = parse_targets(None, LevelFilter::INFO);
        assert_eq!(invalid, None);

        let (_, invalid) = parse_targets(Some("  ".to_owned()), LevelFilter::INFO);
        assert_eq!(invalid, None);

        let (targets, invalid) =
            parse_targets(Some("junit_annotate=trace".to_owned()), LevelFilter::INFO);
        assert_eq!(invalid, None);
        assert!(targets.would_enable("junit_annotate::checks", &Level::TRACE));

        let (targets, invalid) =
            parse_targets(Some("junit_annotate=loud".to_owned()), LevelFilter::DEBUG);
        assert_eq!(invalid.as_deref(), Some("junit_annotate=loud"));
        assert!(targets.would_enable("junit_annotate", &Level::DEBUG));
        assert!(!targets.would_enable("junit_annotate", &Level::TRACE));
    }

    #[test]
    fn captures_stdout() {
        let mut writer = OutputWriter::Test { stdout: Vec::new() };
        writeln!(writer.stdout_writer(), "hello").expect("write succeeds");
        assert_eq!(writer.captured_stdout(), "hello\n");
    }
}
