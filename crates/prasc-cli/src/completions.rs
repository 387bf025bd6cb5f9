//! Shell completion generation for the prasc CLI.

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use std::io::{self, Write};

/// Arguments for the completions subcommand.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Override the binary name used in the completion script
    #[arg(long, default_value = "prasc")]
    pub name: String,
}

pub fn write_completions(args: &CompletionsArgs, out: &mut dyn Write) {
    let mut cmd = crate::Cli::command();
    generate(args.shell, &mut cmd, args.name.clone(), out);
}

pub fn generate_completions(args: &CompletionsArgs) {
    write_completions(args, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut out = Vec::new();
        write_completions(
            &CompletionsArgs {
                shell,
                name: "prasc".to_string(),
            },
            &mut out,
        );
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn bash_script_lists_subcommands_and_flags() {
        let script = script(Shell::Bash);
        assert!(script.contains("prasc"));
        assert!(script.contains("check"));
        assert!(script.contains("--reeverything"));
    }

    #[test]
    fn zsh_script_is_generated() {
        assert!(script(Shell::Zsh).contains("#compdef prasc"));
    }
}
