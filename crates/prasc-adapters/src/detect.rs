//! Lookup of engine programs on `PATH`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("'{program}' was not found; {hint}")]
pub struct ProgramNotFound {
    pub program: String,
    pub hint: &'static str,
}

/// Resolves `program` to an executable path.
///
/// Names containing a path separator are checked as given.
pub fn find_program(program: &str) -> Result<PathBuf, ProgramNotFound> {
    let candidate = Path::new(program);
    let found = if candidate.components().count() > 1 {
        candidate.is_file().then(|| candidate.to_path_buf())
    } else {
        which::which(program).ok()
    };
    found.ok_or_else(|| ProgramNotFound {
        program: program.to_string(),
        hint: install_hint(program),
    })
}

pub fn is_program_available(program: &str) -> bool {
    find_program(program).is_ok()
}

fn install_hint(program: &str) -> &'static str {
    let name = Path::new(program)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(program);
    match name {
        "Rscript" => "install R and make sure Rscript is on PATH, or set engines.rscript",
        "python" | "python3" => {
            "install Python 3 with the sideeye package, or set engines.sideeye"
        }
        _ => "make sure it is installed and on PATH",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_program_carries_hint() {
        let err = find_program("prasc-no-such-program").unwrap_err();
        assert_eq!(err.program, "prasc-no-such-program");
        assert!(err.to_string().contains("on PATH"));
        assert!(!is_program_available("prasc-no-such-program"));
    }

    #[test]
    fn hints_name_the_setting() {
        assert!(install_hint("Rscript").contains("engines.rscript"));
        assert!(install_hint("/usr/bin/python3").contains("engines.sideeye"));
    }

    #[test]
    fn explicit_paths_are_checked_directly() {
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("Rscript");
        std::fs::write(&exe, "").unwrap();
        assert_eq!(find_program(exe.to_str().unwrap()).unwrap(), exe);
        assert!(find_program(dir.path().join("missing").to_str().unwrap()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn finds_shell_on_path() {
        assert!(is_program_available("sh"));
    }
}
