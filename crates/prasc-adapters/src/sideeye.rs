//! SideEye reading-measure extraction.
//!
//! SideEye is a Python package. By default it is driven through a short
//! `python3 -c` program; any other command line can be configured, in which
//! case the positional arguments are appended to the configured ones.

use async_trait::async_trait;
use prasc_core::CommandConfig;
use prasc_proto::{EngineError, MeasureExtractor, MeasureRequest};
use std::ffi::OsString;
use tokio::process::Command;
use tracing::{debug, info};

/// Program run by the default command. Arguments: column configuration,
/// region file, output file, recordings.
pub const SIDEEYE_SHIM: &str = "import sys, sideeye; \
config = sideeye.config.Configuration(sys.argv[1]); \
exp = sideeye.parser.experiment.parse_files(sys.argv[4:], sys.argv[2], config); \
sideeye.calculate_all_measures(exp, sys.argv[3], config)";

/// Runs SideEye as a child process.
#[derive(Debug, Clone)]
pub struct SideEyeExtractor {
    command: CommandConfig,
}

impl Default for SideEyeExtractor {
    fn default() -> Self {
        Self::new(default_command())
    }
}

impl SideEyeExtractor {
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }

    /// Uses `command` when configured, the bundled Python program otherwise.
    pub fn from_config(command: Option<&CommandConfig>) -> Self {
        command.cloned().map_or_else(Self::default, Self::new)
    }

    pub fn program(&self) -> &str {
        &self.command.program
    }

    /// Full argument list for a request.
    pub fn args(&self, request: &MeasureRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.command.args.iter().map(OsString::from).collect();
        args.push(request.config.clone().into_os_string());
        args.push(request.regions.clone().into_os_string());
        args.push(request.output.clone().into_os_string());
        args.extend(request.recordings.iter().map(|p| p.clone().into_os_string()));
        args
    }
}

pub fn default_command() -> CommandConfig {
    CommandConfig {
        program: "python3".to_string(),
        args: vec!["-c".to_string(), SIDEEYE_SHIM.to_string()],
    }
}

#[async_trait]
impl MeasureExtractor for SideEyeExtractor {
    fn name(&self) -> &str {
        "sideeye"
    }

    async fn extract(&self, request: &MeasureRequest) -> Result<(), EngineError> {
        info!(
            recordings = request.recordings.len(),
            output = %request.output.display(),
            "Calculating reading measures with SideEye"
        );
        let args = self.args(request);
        debug!(program = %self.command.program, args = args.len(), "Starting measure extractor");

        let status = Command::new(&self.command.program)
            .args(&args)
            .status()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(EngineError::Failed {
                program: self.command.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
