/// Elevation check for the current process.
///
/// On Windows, `diskpart` and `mountvol` refuse to work without an elevated
/// token, and a process cannot elevate itself mid-run, so the runner asks
/// this check before launching an elevated invocation. Other platforms wrap
/// the child in `sudo`/`osascript` instead and never call this.

/// Whether the current process token carries administrator elevation.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    /// Closes the token handle on every exit path.
    struct TokenGuard(HANDLE);

    impl Drop for TokenGuard {
        fn drop(&mut self) {
            // SAFETY: the handle was returned by OpenProcessToken and is closed once.
            let _ = unsafe { CloseHandle(self.0) };
        }
    }

    let mut raw = HANDLE::default();
    // SAFETY: GetCurrentProcess returns a pseudo-handle; `raw` is a valid out-pointer.
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut raw) }.is_err() {
        tracing::debug!("OpenProcessToken failed; treating process as not elevated");
        return false;
    }
    let token = TokenGuard(raw);

    let mut elevation = TOKEN_ELEVATION::default();
    let mut written = 0u32;
    // SAFETY: the buffer is a TOKEN_ELEVATION and its exact size is passed.
    let queried = unsafe {
        GetTokenInformation(
            token.0,
            TokenElevation,
            Some(&mut elevation as *mut TOKEN_ELEVATION as *mut _),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut written,
        )
    };

    queried.is_ok() && elevation.TokenIsElevated != 0
}

/// Non-Windows hosts elevate per child process, so the parent is never
/// reported as elevated.
#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    false
}
