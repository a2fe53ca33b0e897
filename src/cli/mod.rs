pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::detect::Format;

#[derive(Parser)]
#[command(name = "trailport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Import course documents into trails, modules and quizzes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long, default_value = "false")]
        force: bool,
    },

    /// Import documents and print the parsed trails
    #[command(long_about = "Import documents and print the parsed trails.\n\n\
        Supported inputs: txt, md, json, xml, html, docx, doc, odt, rtf, pdf,\n\
        yml, csv, rst, tex, org and adoc. Directories are searched recursively.\n\n\
        By default the rule-based parser is used for well-structured documents and\n\
        the AI parser (when enabled) for the rest. With --hybrid both are run on\n\
        low-confidence documents and the richer result is kept.")]
    Import {
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Run rule-based and AI parsing together and keep the richer result
        #[arg(long, default_value = "false")]
        hybrid: bool,

        /// Never call the AI parser
        #[arg(long, default_value = "false")]
        no_ai: bool,

        /// Print the result as JSON
        #[arg(long, default_value = "false")]
        json: bool,

        /// Write the JSON result to a file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the detected format of a file
    Detect {
        /// File to inspect
        path: PathBuf,
    },

    /// Show the structure confidence breakdown of a file
    Analyze {
        /// File to inspect
        path: PathBuf,

        /// Print the analysis as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print a sample document for a format
    Sample {
        /// Format name (txt, md, json, xml, html, yml, csv, rtf, rst, tex, org, adoc, docx, doc, odt, pdf)
        #[arg(value_parser = parse_format)]
        format: Format,
    },

    /// Check configuration and AI service availability
    Doctor,
}

fn parse_format(raw: &str) -> Result<Format, String> {
    Format::from_extension(raw.trim_start_matches('.'))
        .ok_or_else(|| format!("unknown format '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("md"), Ok(Format::Md));
        assert_eq!(parse_format(".yaml"), Ok(Format::Yml));
        assert!(parse_format("exe").is_err());
    }
}
