/// Command runner — launches one external utility per call and returns its
/// raw stdout.
///
/// Every invocation is synchronous from the caller's point of view but is
/// bounded by a timeout and a shared cancel flag. Stdout and stderr are
/// drained on helper threads so a child that fills a pipe cannot stall the
/// wait loop.
///
/// The [`CommandRunner`] trait is the seam the parsers and the mount
/// controller are written against; tests substitute canned output.
pub mod elevation;

use crate::error::RunError;
use crossbeam_channel::{bounded, Receiver};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the wait loop polls the child and the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for pipe readers after the child has exited.
///
/// A grandchild that inherited the pipe can keep it open; we do not wait on
/// it forever.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A single utility call: program, arguments, and whether it needs
/// administrator rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub elevated: bool,
    /// Overrides the runner's default timeout when set.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            elevated: false,
            timeout: None,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Feed `commands` to `diskpart` through a `cmd.exe` pipeline.
    ///
    /// diskpart only reads its script from interactive stdin (or a script
    /// file), so each command is echoed into it:
    /// `cmd.exe /C "(echo list disk & echo exit) | diskpart"`.
    pub fn diskpart_script(commands: &[&str]) -> Self {
        let echoed: Vec<String> = commands.iter().map(|c| format!("echo {c}")).collect();
        let pipeline = format!("({}) | diskpart", echoed.join(" & "));
        Self::new("cmd.exe", ["/C".to_string(), pipeline])
    }

    /// Run a PowerShell command line without loading the user profile.
    pub fn powershell(command: &str) -> Self {
        Self::new("powershell.exe", ["-NoProfile", "-NonInteractive", "-Command", command])
    }

    /// `program arg1 arg2 …` for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes invocations. Implemented by [`SystemRunner`] for real processes.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError>;

    /// Convenience wrapper that decodes stdout as (lossy) UTF-8.
    fn run_text(&self, invocation: &Invocation) -> Result<String, RunError> {
        self.run(invocation)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        (**self).run(invocation)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        (**self).run(invocation)
    }
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
    cancel_flag: Arc<AtomicBool>,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag; storing `true` aborts the running and all later calls.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Request cancellation. Non-blocking.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        if self.is_cancelled() {
            return Err(RunError::Cancelled(invocation.program.clone()));
        }

        which::which(&invocation.program)
            .map_err(|_| RunError::ExecutableNotFound(invocation.program.clone()))?;

        let launch = elevation::wrap(invocation)?;
        if launch.program != invocation.program {
            which::which(&launch.program)
                .map_err(|_| RunError::ExecutableNotFound(launch.program.clone()))?;
        }

        let timeout = invocation.timeout.unwrap_or(self.timeout);
        debug!("Running `{}` (timeout {:?})", launch.command_line(), timeout);

        let mut child = Command::new(&launch.program)
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunError::ProcessLaunchFailed {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout_rx = child.stdout.take().map(drain_pipe);
        let stderr_rx = child.stderr.take().map(drain_pipe);

        let started = Instant::now();
        let status: ExitStatus = loop {
            if self.is_cancelled() {
                kill_tree(&mut child);
                debug!("Cancelled `{}`", invocation.program);
                return Err(RunError::Cancelled(invocation.program.clone()));
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= timeout => {
                    kill_tree(&mut child);
                    warn!("`{}` timed out after {:?}", invocation.program, timeout);
                    return Err(RunError::TimedOut {
                        program: invocation.program.clone(),
                        timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(RunError::ProcessLaunchFailed {
                        program: invocation.program.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        let stdout = collect(stdout_rx);
        let stderr = String::from_utf8_lossy(&collect(stderr_rx)).trim().to_string();

        if status.success() {
            debug!(
                "`{}` finished in {:?} ({} bytes)",
                invocation.program,
                started.elapsed(),
                stdout.len()
            );
            return Ok(stdout);
        }

        if invocation.elevated && elevation::was_denied(&launch, &stderr) {
            return Err(RunError::ElevationDenied(invocation.program.clone()));
        }
        Err(RunError::NonZeroExit {
            program: invocation.program.clone(),
            code: status.code(),
            stderr,
        })
    }
}

/// Kill `child` and everything it started, then reap it.
///
/// On Windows the diskpart and PowerShell invocations run under `cmd.exe`
/// or `powershell.exe`; killing only the direct child leaves the utility
/// running, so the whole tree goes through `taskkill /T` first.
fn kill_tree(child: &mut Child) {
    #[cfg(windows)]
    {
        let taskkill = tree_kill_invocation(child.id());
        let killed = Command::new(&taskkill.program)
            .args(&taskkill.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = killed {
            warn!("taskkill for pid {} failed: {e}", child.id());
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// `taskkill /T /F /PID <pid>`: force-kill a process and its descendants.
#[cfg_attr(not(windows), allow(dead_code))]
fn tree_kill_invocation(pid: u32) -> Invocation {
    Invocation::new("taskkill", ["/T", "/F", "/PID", pid.to_string().as_str()])
}

/// Read a pipe to EOF on a helper thread and hand the bytes back once.
fn drain_pipe<P: Read + Send + 'static>(mut pipe: P) -> Receiver<Vec<u8>> {
    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("qartion-pipe".to_owned())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    if let Err(e) = spawned {
        warn!("Could not spawn pipe reader: {e}");
    }
    rx
}

fn collect(rx: Option<Receiver<Vec<u8>>>) -> Vec<u8> {
    rx.and_then(|rx| rx.recv_timeout(PIPE_DRAIN_GRACE).ok())
        .unwrap_or_default()
}
