#[cfg(test)]
mod tests {
    use std::{
        fs, future,
        path::Path,
        sync::mpsc as std_mpsc,
        thread,
        time::{Duration, Instant},
    };

    use dumpsessions::{
        Error,
        hooks::{Hook, Trigger, fire_matching, fire_start},
        output::Format,
        pump,
        settings::Settings,
    };
    use session_watch::{SessionChange, SessionEvent, SessionWatcher, WatcherConfig, sim::Simulator};
    use tokio::sync::mpsc;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn simulated_events_are_printed_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (seen_tx, seen_rx) = std_mpsc::channel();
        let sim = Simulator::new();
        let injector = sim.injector();
        let watcher = SessionWatcher::start_simulated(
            WatcherConfig::default().with_class_prefix("DumpTest"),
            move |ev: SessionEvent| {
                let _ = tx.send(ev);
                let _ = seen_tx.send(());
            },
            sim,
        )
        .unwrap();

        let events = [
            SessionEvent::session_change(SessionChange::Lock, 1),
            SessionEvent::session_change(SessionChange::Unlock, 1),
            SessionEvent::query_end_session(0),
        ];
        for ev in events {
            assert!(injector.post(ev));
        }
        for _ in 0..events.len() {
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(watcher.stop().is_clean());

        let mut out = Vec::new();
        let n = runtime()
            .block_on(pump(rx, &[], Format::Text, &mut out, future::pending()))
            .unwrap();
        assert_eq!(n, 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "session 1 lock");
        assert_eq!(lines[1], "session 1 unlock");
        assert!(lines[2].starts_with("query-end-session"), "{}", lines[2]);
    }

    #[test]
    fn json_output_is_one_object_per_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionEvent::session_change(SessionChange::Logon, 7))
            .unwrap();
        tx.send(SessionEvent::session_change(SessionChange::Logoff, 7))
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let n = runtime()
            .block_on(pump(rx, &[], Format::Json, &mut out, future::pending()))
            .unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(out).unwrap();
        let changes: Vec<String> = text
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                assert_eq!(v["session"], 7);
                v["change"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(changes, ["logon", "logoff"]);
    }

    #[test]
    fn shutdown_stops_an_idle_pump() {
        let (_tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
        let n = runtime()
            .block_on(pump(rx, &[], Format::Text, Vec::new(), async {}))
            .unwrap();
        assert_eq!(n, 0);
    }

    /// Hook that writes `$SESSION_WATCH_TRIGGER $SESSION_WATCH_SESSION` to
    /// `marker`, renaming into place so readers never see a partial file.
    #[cfg(unix)]
    fn marker_hook(on: Vec<Trigger>, marker: &Path) -> Hook {
        let script = r#"printf '%s %s' "$SESSION_WATCH_TRIGGER" "$SESSION_WATCH_SESSION" > "$0.tmp" && mv "$0.tmp" "$0""#;
        Hook::new(
            on,
            vec![
                "sh".into(),
                "-c".into(),
                script.into(),
                marker.display().to_string(),
            ],
            false,
        )
        .unwrap()
    }

    #[cfg(unix)]
    fn read_marker(marker: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(text) = fs::read_to_string(marker) {
                return text;
            }
            assert!(Instant::now() < deadline, "hook never wrote {}", marker.display());
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[cfg(unix)]
    #[test]
    fn matching_hook_runs_with_event_environment() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("unlock");
        let hooks = vec![marker_hook(
            vec![Trigger::Change(SessionChange::Unlock)],
            &marker,
        )];
        let fired = runtime().block_on(async {
            let lock = SessionEvent::session_change(SessionChange::Lock, 4);
            assert_eq!(fire_matching(&hooks, &lock), 0);
            fire_matching(&hooks, &SessionEvent::session_change(SessionChange::Unlock, 4))
        });
        assert_eq!(fired, 1);
        assert_eq!(read_marker(&marker), "unlock 4");
    }

    #[cfg(unix)]
    #[test]
    fn pumped_events_fire_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("logon");
        let hooks = vec![marker_hook(
            vec![Trigger::Change(SessionChange::Logon)],
            &marker,
        )];
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionEvent::session_change(SessionChange::Lock, 2))
            .unwrap();
        tx.send(SessionEvent::session_change(SessionChange::Logon, 2))
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let n = runtime()
            .block_on(pump(rx, &hooks, Format::Text, &mut out, future::pending()))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(read_marker(&marker), "logon 2");
    }

    #[cfg(unix)]
    #[test]
    fn start_hooks_fire_once_without_an_event() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("start");
        let hooks = vec![
            marker_hook(vec![Trigger::Start], &marker),
            marker_hook(
                vec![Trigger::QueryEndSession],
                &dir.path().join("never"),
            ),
        ];
        let fired = runtime().block_on(async { fire_start(&hooks) });
        assert_eq!(fired, 1);
        assert_eq!(read_marker(&marker), "start ");
        assert!(!dir.path().join("never").exists());
    }

    #[test]
    fn example_settings_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("dumpsessions.example.toml");
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.watcher.class_prefix, "DumpSessions");
        assert_eq!(settings.watcher.stop_timeout, Duration::from_secs(2));
        let hooks = settings.compile_hooks().unwrap();
        assert_eq!(hooks.len(), 2);
        assert!(hooks[0].matches(&SessionEvent::session_change(SessionChange::Unlock, 1)));
        assert!(hooks[1].matches(&SessionEvent::query_end_session(0)));
    }

    #[test]
    fn missing_settings_file_reports_path() {
        let err = Settings::load(Path::new("/nonexistent/dumpsessions.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.to_string().contains("dumpsessions.toml"));
    }
}
