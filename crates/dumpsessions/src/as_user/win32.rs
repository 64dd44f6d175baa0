//! `CreateProcessAsUserW` launcher for interactive sessions.

use std::{ffi::c_void, mem, ptr, result::Result as StdResult, slice};

use tracing::{debug, info, warn};
use windows::{
    Win32::{
        Foundation::{CloseHandle, FALSE, HANDLE, TRUE},
        Security::{DuplicateTokenEx, SecurityImpersonation, TOKEN_ACCESS_MASK, TokenPrimary},
        System::{
            Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock},
            RemoteDesktop::{
                WTS_CURRENT_SERVER_HANDLE, WTS_SESSION_INFOW, WTSActive, WTSEnumerateSessionsW,
                WTSFreeMemory, WTSGetActiveConsoleSessionId, WTSQueryUserToken,
            },
            Threading::{
                CREATE_NEW_CONSOLE, CREATE_UNICODE_ENVIRONMENT, CreateProcessAsUserW,
                PROCESS_INFORMATION, STARTF_USESHOWWINDOW, STARTUPINFOW,
            },
        },
        UI::WindowsAndMessaging::SW_SHOW,
    },
    core::{PCWSTR, PWSTR},
};

use super::{command_line, environment_block, merge_environment, parse_environment_block};
use crate::{Error, Result};

/// Desktop the launched process is attached to.
const DESKTOP: &str = "winsta0\\default";

/// Returned by `WTSGetActiveConsoleSessionId` when nobody is attached.
const NO_CONSOLE_SESSION: u32 = 0xFFFF_FFFF;

/// A kernel handle closed on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            debug!(error = %e, "close_handle_failed");
        }
    }
}

/// NUL-terminated UTF-16 copy of `value`.
fn widestring(value: &str) -> Vec<u16> {
    value.encode_utf16().chain([0]).collect()
}

/// Ids of sessions with a user actively attached, falling back to the
/// console session.
fn active_sessions() -> Vec<u32> {
    let mut info: *mut WTS_SESSION_INFOW = ptr::null_mut();
    let mut count = 0u32;
    let mut ids = Vec::new();
    match unsafe { WTSEnumerateSessionsW(WTS_CURRENT_SERVER_HANDLE, 0, 1, &mut info, &mut count) } {
        Ok(()) if !info.is_null() => {
            let sessions = unsafe { slice::from_raw_parts(info, count as usize) };
            ids.extend(
                sessions
                    .iter()
                    .filter(|s| s.State == WTSActive)
                    .map(|s| s.SessionId),
            );
            unsafe { WTSFreeMemory(info.cast()) };
        }
        Ok(()) => {}
        Err(e) => warn!(error = %e, "enumerate_sessions_failed"),
    }
    if ids.is_empty() {
        let console = unsafe { WTSGetActiveConsoleSessionId() };
        if console != NO_CONSOLE_SESSION {
            ids.push(console);
        }
    }
    ids
}

/// Primary token of the user logged on to `session`.
fn user_token(session: u32) -> StdResult<OwnedHandle, String> {
    let mut impersonation = HANDLE::default();
    unsafe { WTSQueryUserToken(session, &mut impersonation) }
        .map_err(|e| format!("WTSQueryUserToken: {e}"))?;
    let impersonation = OwnedHandle(impersonation);
    let mut primary = HANDLE::default();
    unsafe {
        DuplicateTokenEx(
            impersonation.0,
            TOKEN_ACCESS_MASK(0),
            None,
            SecurityImpersonation,
            TokenPrimary,
            &mut primary,
        )
    }
    .map_err(|e| format!("DuplicateTokenEx: {e}"))?;
    Ok(OwnedHandle(primary))
}

/// The user's environment for `token`, as `NAME=value` entries.
fn user_environment(token: &OwnedHandle) -> StdResult<Vec<String>, String> {
    let mut block: *mut c_void = ptr::null_mut();
    unsafe { CreateEnvironmentBlock(&mut block, token.0, TRUE) }
        .map_err(|e| format!("CreateEnvironmentBlock: {e}"))?;
    let base = block.cast::<u16>();
    let mut len = 0;
    // The block ends with an empty entry, i.e. two consecutive NULs.
    while unsafe { *base.add(len) != 0 || *base.add(len + 1) != 0 } {
        len += 1;
    }
    let vars = parse_environment_block(unsafe { slice::from_raw_parts(base, len + 2) });
    if let Err(e) = unsafe { DestroyEnvironmentBlock(block) } {
        debug!(error = %e, "destroy_environment_block_failed");
    }
    Ok(vars)
}

/// Start `program` in `session`; returns the new process id.
fn spawn_in_session(
    session: u32,
    program: &str,
    args: &[String],
    env: &[(&str, String)],
) -> StdResult<u32, String> {
    let token = user_token(session)?;
    let vars = merge_environment(user_environment(&token)?, env);
    let block = environment_block(&vars);
    let mut cmdline = widestring(&command_line(program, args));
    let mut desktop = widestring(DESKTOP);
    let startup = STARTUPINFOW {
        cb: mem::size_of::<STARTUPINFOW>() as u32,
        lpDesktop: PWSTR(desktop.as_mut_ptr()),
        dwFlags: STARTF_USESHOWWINDOW,
        wShowWindow: SW_SHOW.0 as u16,
        ..Default::default()
    };
    let mut info = PROCESS_INFORMATION::default();
    unsafe {
        CreateProcessAsUserW(
            token.0,
            PCWSTR::null(),
            PWSTR(cmdline.as_mut_ptr()),
            None,
            None,
            FALSE,
            CREATE_UNICODE_ENVIRONMENT | CREATE_NEW_CONSOLE,
            Some(block.as_ptr().cast()),
            PCWSTR::null(),
            &startup,
            &mut info,
        )
    }
    .map_err(|e| format!("CreateProcessAsUserW: {e}"))?;
    drop(OwnedHandle(info.hThread));
    drop(OwnedHandle(info.hProcess));
    Ok(info.dwProcessId)
}

/// Start `program` as the user of `session`, or of every active session
/// when `session` is `None`. Returns the ids of the processes started.
///
/// Sessions that fail are logged and skipped; an error is returned only
/// when nothing could be started.
pub fn spawn_in_sessions(
    program: &str,
    args: &[String],
    env: &[(&str, String)],
    session: Option<u32>,
) -> Result<Vec<u32>> {
    let sessions = match session {
        Some(id) => vec![id],
        None => active_sessions(),
    };
    let mut pids = Vec::new();
    let mut last_err = String::from("no active user session");
    for id in sessions {
        match spawn_in_session(id, program, args, env) {
            Ok(pid) => {
                info!(program, session = id, pid, "hook_spawned_as_user");
                pids.push(pid);
            }
            Err(e) => {
                warn!(program, session = id, error = %e, "hook_spawn_as_user_failed");
                last_err = e;
            }
        }
    }
    if pids.is_empty() {
        return Err(Error::Launch {
            program: program.to_string(),
            message: last_err,
        });
    }
    Ok(pids)
}
