//! Win32 listener: a message-only window subscribed to WTS session
//! notifications for every session on the machine.
//!
//! Acquisition order is class, window, subscription; [`Registration`]
//! releases them in the opposite order when the loop ends. The window
//! procedure reaches the event sink through a thread-local, so each listener
//! thread only ever sees its own watcher's sink.

use std::{cell::RefCell, ffi::OsStr, iter, os::windows::ffi::OsStrExt};

use tracing::{debug, trace, warn};
use windows::{
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM},
        System::{
            LibraryLoader::GetModuleHandleW,
            RemoteDesktop::{
                NOTIFY_FOR_ALL_SESSIONS, WTSRegisterSessionNotification,
                WTSUnRegisterSessionNotification,
            },
            Threading::GetCurrentThreadId,
        },
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
            HWND_MESSAGE, MSG, PostThreadMessageW, RegisterClassW, TranslateMessage,
            UnregisterClassW, WINDOW_EX_STYLE, WINDOW_STYLE, WM_QUIT, WNDCLASSW,
        },
    },
    core::{Error as WinError, PCWSTR},
};

use super::{Backend, ListenerCtx};
use crate::{
    Error,
    event::SessionEvent,
    relay::EventSink,
    route::{Reply, route},
};

thread_local! {
    /// Sink for the window procedure running on this listener thread.
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

/// Clears the thread-local sink when dropped.
struct SinkGuard;

impl SinkGuard {
    /// Make `sink` visible to this thread's window procedure.
    fn install(sink: EventSink) -> Self {
        SINK.with(|s| *s.borrow_mut() = Some(sink));
        Self
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        SINK.with(|s| s.borrow_mut().take());
    }
}

/// NUL-terminated UTF-16 copy of `value`.
fn widestring(value: &str) -> Vec<u16> {
    OsStr::new(value).encode_wide().chain(iter::once(0)).collect()
}

/// Window procedure for the hidden window.
unsafe extern "system" fn session_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let event = SessionEvent::new(msg, wparam.0, lparam.0);
    let reply = SINK.with(|s| match s.borrow().as_ref() {
        Some(sink) => route(event, |ev| sink.push(ev)),
        None => Reply::Default,
    });
    match reply {
        Reply::Handled => {
            trace!(msg, wparam = wparam.0, lparam = lparam.0, "session_message");
            LRESULT(0)
        }
        Reply::Default => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

/// Native resources held by the listener, released in reverse order.
struct Registration {
    /// NUL-terminated class name; must outlive the class registration.
    class: Vec<u16>,
    /// Module that owns the class.
    hinstance: HINSTANCE,
    /// The message-only window, once created.
    hwnd: Option<HWND>,
    /// Whether the window is subscribed to session notifications.
    subscribed: bool,
}

impl Registration {
    /// Register the window class; first acquisition step.
    fn register_class(class_name: &str) -> Result<Self, Error> {
        let class = widestring(class_name);
        let hinstance: HINSTANCE = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|e| Error::ClassRegistration(e.to_string()))?
            .into();
        let wc = WNDCLASSW {
            hInstance: hinstance,
            lpszClassName: PCWSTR(class.as_ptr()),
            lpfnWndProc: Some(session_wndproc),
            ..Default::default()
        };
        if unsafe { RegisterClassW(&wc) } == 0 {
            return Err(Error::ClassRegistration(WinError::from_win32().to_string()));
        }
        debug!(class = class_name, "window_class_registered");
        Ok(Self {
            class,
            hinstance,
            hwnd: None,
            subscribed: false,
        })
    }

    /// Create the message-only window.
    fn create_window(&mut self) -> Result<HWND, Error> {
        let name = PCWSTR(self.class.as_ptr());
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                name,
                name,
                WINDOW_STYLE::default(),
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                None,
                self.hinstance,
                None,
            )
        }
        .map_err(|e| Error::WindowCreation(e.to_string()))?;
        self.hwnd = Some(hwnd);
        Ok(hwnd)
    }

    /// Subscribe `hwnd` to notifications for all sessions.
    fn subscribe(&mut self, hwnd: HWND) -> Result<(), Error> {
        unsafe { WTSRegisterSessionNotification(hwnd, NOTIFY_FOR_ALL_SESSIONS) }
            .map_err(|e| Error::Subscription(e.to_string()))?;
        self.subscribed = true;
        Ok(())
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        unsafe {
            if let Some(hwnd) = self.hwnd.take() {
                if self.subscribed
                    && let Err(e) = WTSUnRegisterSessionNotification(hwnd)
                {
                    warn!(error = %e, "session_unsubscribe_failed");
                }
                if let Err(e) = DestroyWindow(hwnd) {
                    warn!(error = %e, "destroy_window_failed");
                }
            }
            if let Err(e) = UnregisterClassW(PCWSTR(self.class.as_ptr()), self.hinstance) {
                warn!(error = %e, "unregister_class_failed");
            }
        }
        debug!("listener_resources_released");
    }
}

/// Pump messages until `WM_QUIT` or a retrieval error.
fn pump() {
    let mut msg = MSG::default();
    loop {
        let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match r.0 {
            0 => break,
            -1 => {
                warn!(error = %WinError::from_win32(), "get_message_failed");
                break;
            }
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }
}

/// The real Win32 message source.
pub(crate) struct Win32Backend;

impl Backend for Win32Backend {
    fn run(self, ctx: ListenerCtx<'_>) {
        let _sink = SinkGuard::install(ctx.sink.clone());
        let mut reg = match Registration::register_class(ctx.class_name) {
            Ok(r) => r,
            Err(e) => return ctx.fail(e),
        };
        let hwnd = match reg.create_window() {
            Ok(h) => h,
            Err(e) => return ctx.fail(e),
        };
        if let Err(e) = reg.subscribe(hwnd) {
            return ctx.fail(e);
        }

        // The message queue exists once the window does, so a posted quit
        // cannot be lost from here on.
        let thread_id = unsafe { GetCurrentThreadId() };
        ctx.ctrl.set_quit(Box::new(move || {
            unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
                .map_err(|e| Error::PostQuit(e.to_string()))
        }));
        ctx.ready();

        if !ctx.ctrl.stop_requested() {
            debug!(thread_id, "dispatch_loop_started");
            pump();
        }
        debug!(thread_id, "dispatch_loop_exited");
        drop(reg);
    }
}
