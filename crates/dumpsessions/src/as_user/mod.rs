//! Launch hook commands inside interactive user sessions.
//!
//! When `dumpsessions` runs as a service it lives in session 0, so a plain
//! child process is invisible to the user who just logged on or unlocked.
//! Hooks marked `as_user` are instead started with the session user's token
//! on the `winsta0\default` desktop, with the user's own environment plus the
//! `SESSION_WATCH_*` variables. This needs the privileges of a `SYSTEM`
//! service and is only available on Windows.
//!
//! The command-line quoting and environment-block handling here are plain
//! data transformations and are shared with the Win32 launcher.
#![cfg_attr(not(windows), allow(dead_code))]

use std::iter;

#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use win32::spawn_in_sessions;

/// Quote one argument so `CommandLineToArgvW` reads it back unchanged.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(iter_backslashes(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(iter_backslashes(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.extend(iter_backslashes(backslashes * 2));
    out.push('"');
    out
}

/// `n` backslashes.
fn iter_backslashes(n: usize) -> impl Iterator<Item = char> {
    iter::repeat_n('\\', n)
}

/// Build a Windows command line for `program` and `args`.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(quote_arg(program));
    parts.extend(args.iter().map(|a| quote_arg(a)));
    parts.join(" ")
}

/// Name part of a `NAME=value` entry. Hidden per-drive entries such as
/// `=C:=C:\dir` keep their leading `=`.
fn var_name(entry: &str) -> &str {
    let start = usize::from(entry.starts_with('='));
    match entry[start..].find('=') {
        Some(i) => &entry[..start + i],
        None => entry,
    }
}

/// Overlay `extra` on `base`, replacing same-named variables regardless of
/// case, and sort the result the way `CreateProcess` expects.
pub fn merge_environment(base: Vec<String>, extra: &[(&str, String)]) -> Vec<String> {
    let mut vars: Vec<String> = base
        .into_iter()
        .filter(|entry| {
            !extra
                .iter()
                .any(|(k, _)| var_name(entry).eq_ignore_ascii_case(k))
        })
        .collect();
    vars.extend(extra.iter().map(|(k, v)| format!("{k}={v}")));
    vars.sort_by_key(|entry| var_name(entry).to_ascii_uppercase());
    vars
}

/// Encode variables as a `CREATE_UNICODE_ENVIRONMENT` block.
pub fn environment_block(vars: &[String]) -> Vec<u16> {
    let mut block: Vec<u16> = vars
        .iter()
        .flat_map(|v| v.encode_utf16().chain([0]))
        .collect();
    if block.is_empty() {
        block.push(0);
    }
    block.push(0);
    block
}

/// Decode a double-NUL terminated UTF-16 environment block.
pub fn parse_environment_block(block: &[u16]) -> Vec<String> {
    block
        .split(|&c| c == 0)
        .take_while(|entry| !entry.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}
