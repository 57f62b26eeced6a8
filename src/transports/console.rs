use serde::Deserialize;
use slog_term::{CompactFormat, TermDecorator};

use crate::config::Level;

/// Options for the console transport. All fields are optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ConsoleOptions {
    pub level: Level,
    /// Drop every record without writing anything.
    pub silent: bool,
    pub colorize: bool,
    pub timestamp: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            level: Level::default(),
            silent: false,
            colorize: true,
            timestamp: true,
        }
    }
}

fn no_timestamp(_: &mut dyn std::io::Write) -> std::io::Result<()> {
    Ok(())
}

pub(crate) fn drain(options: &ConsoleOptions) -> CompactFormat<TermDecorator> {
    let decorator = if options.colorize {
        TermDecorator::new().force_color()
    } else {
        TermDecorator::new().force_plain()
    };
    let format = CompactFormat::new(decorator.build());
    let format = if options.timestamp {
        format
    } else {
        format.use_custom_timestamp(no_timestamp)
    };
    format.build()
}
