use crate::inspect::JvmProcess;
use regex::Regex;
use thiserror::Error;

/// The monitored process could not be determined unambiguously.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("couldn't find a keycloak process matching {pattern}")]
    NotFound { pattern: String },

    #[error("multiple keycloak instances are running: {pids:?}")]
    Ambiguous { pids: Vec<u32> },
}

/// Regex matching any of `signatures` in a `jcmd` listing line.
pub fn signature_pattern<S: AsRef<str>>(signatures: &[S]) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = signatures
        .iter()
        .map(|s| regex::escape(s.as_ref()))
        .collect();
    Regex::new(&format!("({})", alternatives.join("|")))
}

/// The pid of the only process whose description matches `signature`.
pub fn select_target(processes: &[JvmProcess], signature: &Regex) -> Result<u32, TargetError> {
    let pids: Vec<u32> = processes
        .iter()
        .filter(|p| signature.is_match(&p.description))
        .map(|p| p.pid)
        .collect();

    match pids.as_slice() {
        [pid] => Ok(*pid),
        [] => Err(TargetError::NotFound {
            pattern: signature.as_str().to_string(),
        }),
        _ => Err(TargetError::Ambiguous { pids }),
    }
}
