//! Free Bytes Script Module
//!
//! Some pools report free space through an operator-supplied script rather
//! than the inventory. The script is run with the pool name as its only
//! argument and must print a single unsigned integer on stdout.

use crate::{Result, TapeGcError};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on the stdout read back from the script
const MAX_OUTPUT_BYTES: u64 = 4096;

const WAIT_STEP: Duration = Duration::from_millis(10);

/// Run `script` for `pool` and parse the free bytes it prints.
///
/// The script is killed if it has not exited within `timeout`. A non-zero
/// exit status or output that is not a number is a `ScriptError`.
pub fn run_free_bytes_script(script: &str, pool: &str, timeout: Duration) -> Result<u64> {
    let mut child = Command::new(script)
        .arg(pool)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| TapeGcError::ScriptError(format!("failed to spawn {}: {}", script, e)))?;

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                if let Err(e) = child.kill() {
                    debug!(script, "Failed to kill free bytes script: {}", e);
                }
                if let Err(e) = child.wait() {
                    debug!(script, "Failed to reap free bytes script: {}", e);
                }
                return Err(TapeGcError::ScriptError(format!(
                    "{} timed out after {}ms",
                    script,
                    timeout.as_millis()
                )));
            }
            Ok(None) => thread::sleep(WAIT_STEP),
            Err(e) => {
                return Err(TapeGcError::ScriptError(format!(
                    "failed to wait for {}: {}",
                    script, e
                )))
            }
        }
    };

    if !status.success() {
        return Err(TapeGcError::ScriptError(format!(
            "{} exited with {}",
            script, status
        )));
    }

    let mut output = String::new();
    if let Some(stdout) = child.stdout.take() {
        stdout
            .take(MAX_OUTPUT_BYTES)
            .read_to_string(&mut output)
            .map_err(|e| {
                TapeGcError::ScriptError(format!("failed to read output of {}: {}", script, e))
            })?;
    }

    let trimmed = output.trim();
    trimmed.parse::<u64>().map_err(|e| {
        TapeGcError::ScriptError(format!(
            "{} printed '{}' instead of a byte count: {}",
            script, trimmed, e
        ))
    })
}
