/// Privilege escalation wrappers.
///
/// Elevation is an opaque capability: an elevated invocation is rewritten
/// into whatever launcher the host uses, and a refusal to escalate is
/// reported as [`RunError::ElevationDenied`] rather than a plain non-zero
/// exit.
///
/// | Host    | Launcher                                                     |
/// |---------|--------------------------------------------------------------|
/// | macOS   | `osascript -e 'do shell script "…" with administrator privileges'` |
/// | Windows | none; the process itself must already hold an elevated token  |
/// | other   | `sudo -n …`                                                  |
use super::Invocation;
use crate::error::RunError;

/// AppleScript error number for "User canceled." in the authorization prompt.
const OSASCRIPT_USER_CANCELED: &str = "-128";

/// Rewrite `invocation` so it runs with administrator rights.
///
/// Non-elevated invocations are returned unchanged.
pub fn wrap(invocation: &Invocation) -> Result<Invocation, RunError> {
    if !invocation.elevated {
        return Ok(invocation.clone());
    }
    wrap_for(std::env::consts::OS, invocation)
}

pub(crate) fn wrap_for(os: &str, invocation: &Invocation) -> Result<Invocation, RunError> {
    let mut launch = match os {
        "macos" => {
            let script = format!(
                "do shell script \"{}\" with administrator privileges",
                applescript_escape(&shell_command(invocation))
            );
            Invocation::new("osascript", ["-e".to_string(), script])
        }
        "windows" => {
            if !crate::platform::is_elevated() {
                return Err(RunError::ElevationDenied(invocation.program.clone()));
            }
            invocation.clone()
        }
        _ => {
            let mut args = vec!["-n".to_string(), invocation.program.clone()];
            args.extend(invocation.args.iter().cloned());
            Invocation::new("sudo", args)
        }
    };
    launch.elevated = true;
    launch.timeout = invocation.timeout;
    Ok(launch)
}

/// Decide whether a failed elevated launch failed at the escalation step.
pub fn was_denied(launch: &Invocation, stderr: &str) -> bool {
    match launch.program.as_str() {
        "osascript" => {
            stderr.contains(OSASCRIPT_USER_CANCELED) || stderr.contains("User canceled")
        }
        "sudo" => {
            stderr.contains("a password is required")
                || stderr.contains("is not in the sudoers file")
                || stderr.contains("not allowed to execute")
        }
        _ => false,
    }
}

/// Single-quote every word so `do shell script` passes them through verbatim.
fn shell_command(invocation: &Invocation) -> String {
    std::iter::once(&invocation.program)
        .chain(invocation.args.iter())
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn applescript_escape(text: &str) -> String {
    text.replace('\\', r"\\").replace('"', "\\\"")
}
