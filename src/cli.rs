use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one cutscene script
    Compile {
        /// Script source
        input: PathBuf,
        /// Output CTSN file; the scene layout goes to <output>.json
        output: PathBuf,
        /// Shared global layout descriptor written by `globals`
        #[arg(long)]
        globals: Option<PathBuf>,
        /// C header with enum constants and integer typedefs
        #[arg(long)]
        definitions: Option<PathBuf>,
    },
    /// Build the shared global layout from several scripts
    Globals {
        /// Output prefix; writes <output>.dat and <output>.json
        output: PathBuf,
        /// Script sources
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        definitions: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from([
            "cutscenec",
            "-vv",
            "compile",
            "intro.cut",
            "intro.bin",
            "--globals",
            "globals.json",
        ])
        .expect("valid arguments");

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Compile {
                input,
                output,
                globals,
                definitions,
            } => {
                assert_eq!(input, PathBuf::from("intro.cut"));
                assert_eq!(output, PathBuf::from("intro.bin"));
                assert_eq!(globals, Some(PathBuf::from("globals.json")));
                assert_eq!(definitions, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["cutscenec", "globals", "out"]).is_err());
    }
}
