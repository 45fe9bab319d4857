use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sprk",
    about = "SPRK object-graph files: inspect, verify, transcode",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show header, shared table, and root type
    Inspect(InspectArgs),
    /// Check that files hold exactly one well-formed graph
    Verify(VerifyArgs),
    /// Rewrite graphs with different compression settings
    Transcode(TranscodeArgs),
    /// Print the effective engine configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct InspectArgs {
    pub path: PathBuf,
    /// Inspect every graph in the file, not just the first
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct TranscodeArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Compress the output payload
    #[arg(long, conflicts_with = "no_compress")]
    pub compress: bool,
    /// Write the output payload uncompressed
    #[arg(long)]
    pub no_compress: bool,
    /// zstd level; implies --compress unless --no-compress is given
    #[arg(long)]
    pub level: Option<i32>,
    /// TOML file with a [writer] table
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inspect() {
        let cli = Cli::try_parse_from(["sprk", "inspect", "scene.sprk"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("scene.sprk"));
            assert!(!args.all);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_inspect_all() {
        let cli = Cli::try_parse_from(["sprk", "inspect", "--all", "stream.sprk"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert!(args.all);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verify_many() {
        let cli = Cli::try_parse_from(["sprk", "verify", "a.sprk", "b.sprk"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.paths.len(), 2);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn verify_needs_a_path() {
        assert!(Cli::try_parse_from(["sprk", "verify"]).is_err());
    }

    #[test]
    fn parse_transcode() {
        let cli = Cli::try_parse_from([
            "sprk", "transcode", "in.sprk", "out.sprk", "--compress", "--level", "9",
        ])
        .unwrap();
        if let Command::Transcode(args) = cli.command {
            assert!(args.compress);
            assert!(!args.no_compress);
            assert_eq!(args.level, Some(9));
            assert_eq!(args.output, PathBuf::from("out.sprk"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn compress_flags_conflict() {
        let result = Cli::try_parse_from([
            "sprk", "transcode", "a", "b", "--compress", "--no-compress",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_transcode_config() {
        let cli =
            Cli::try_parse_from(["sprk", "transcode", "a", "b", "--config", "sprk.toml"]).unwrap();
        if let Command::Transcode(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("sprk.toml")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["sprk", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["sprk", "--format", "json", "inspect", "x"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
