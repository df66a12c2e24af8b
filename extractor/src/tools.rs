use tokio::process::Command;
use tracing::{debug, warn};

/// Check whether an external tool is runnable. Logs a warning if not.
pub async fn check_tool_available(program: &str, version_flag: &str, purpose: &str) -> bool {
    match Command::new(program).arg(version_flag).output().await {
        Ok(out) if out.status.success() => {
            debug!(program, "tool is available");
            true
        }
        Ok(_) => {
            warn!(program, "{program} returned non-zero for {version_flag}; {purpose} may fail");
            false
        }
        Err(e) => {
            warn!(
                program,
                error = %e,
                "{program} not found on PATH; {purpose} will fail"
            );
            false
        }
    }
}
