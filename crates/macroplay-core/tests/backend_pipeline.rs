//! End-to-end pipeline tests: script text in, backend primitives out.

mod common;

use std::sync::Arc;

use common::{fast_config, run_file, MockBackend, MockBehavior, ScriptDir};
use macroplay_core::backend::Rgb;
use macroplay_core::command::CommandResult;
use macroplay_core::runner::RunOutcome;
use macroplay_core::session::LogLevel;

fn run_with(source: &str, backend: MockBackend) -> (Arc<MockBackend>, Arc<macroplay_core::session::RunSession>) {
    let dir = ScriptDir::new();
    let entry = dir.write("main.macro", source);
    let backend = Arc::new(backend);
    let (outcome, session) = run_file(&entry, fast_config(), backend.clone());
    assert!(matches!(outcome, RunOutcome::Completed), "{:?}", outcome);
    (backend, session)
}

#[test]
fn click_moves_presses_and_releases_in_order() {
    let (backend, _) = run_with("MOUSE_RIGHT_CLICK 100 200\nMOUSE_LEFT_CLICK", MockBackend::new());
    assert_eq!(
        backend.calls(),
        vec![
            "mouse_move 100 200",
            "mouse_down RIGHT",
            "mouse_up RIGHT",
            "mouse_down LEFT",
            "mouse_up LEFT",
        ]
    );
}

#[test]
fn key_combo_releases_in_reverse() {
    let (backend, _) = run_with("KEYS ctrl+shift+s", MockBackend::new());
    assert_eq!(
        backend.calls(),
        vec![
            "key_down ctrl",
            "key_down shift",
            "key_down s",
            "key_up s",
            "key_up shift",
            "key_up ctrl",
        ]
    );
}

#[test]
fn typed_text_keeps_spacing_inside_quotes() {
    let (backend, _) = run_with("$who = team\nTYPE \"hello  $who\"", MockBackend::new());
    assert_eq!(backend.calls(), vec!["type_text hello  team"]);
}

#[test]
fn window_exists_drives_branching() {
    let src = "\
IF WINDOW_EXISTS Notepad
    WINDOW_FOCUS Notepad
    WINDOW_MOVE Notepad 0 0
ELSE
    PRINT missing
ENDIF";
    let (backend, session) = run_with(src, MockBackend::new().with_window("Notepad"));
    assert!(session.messages(LogLevel::Info).is_empty());
    assert_eq!(
        backend.calls(),
        vec![
            "window_exists Notepad",
            "window_focus Notepad",
            "window_move Notepad 0 0",
        ]
    );

    let (_, session) = run_with(src, MockBackend::new());
    assert_eq!(session.messages(LogLevel::Info), vec!["missing"]);
}

#[test]
fn pixel_checks_honor_tolerance() {
    let src = "\
IF PIXEL_COLOR 5 5 250 0 0
    PRINT default
ENDIF
IF PIXEL_COLOR 5 5 240 0 0 5
    PRINT tight
ENDIF
$c = GET_PIXEL_COLOR 5 5
PRINT $c";
    let backend = MockBackend::new().with_pixel(5, 5, Rgb::new(255, 0, 0));
    let (_, session) = run_with(src, backend);
    assert_eq!(session.messages(LogLevel::Info), vec!["default", "255 0 0"]);
}

#[test]
fn image_match_resolves_templates_next_to_the_script() {
    let dir = ScriptDir::new();
    let entry = dir.write(
        "main.macro",
        "IF IMAGE_MATCH ok.png\n    PRINT found\nENDIF\nIF IMAGE_MATCH ok.png threshold 0.95\n    PRINT strict\nENDIF\n",
    );
    let backend = Arc::new(MockBackend::new().with_match_score(dir.path.join("ok.png"), 0.9));
    let (_, session) = run_file(&entry, fast_config(), backend.clone());
    assert_eq!(session.messages(LogLevel::Info), vec!["found"]);
    assert_eq!(backend.calls_matching("image_match").len(), 2);
}

#[test]
fn backend_failure_is_logged_and_run_continues() {
    let backend = MockBackend::new().with_behavior("type_text", MockBehavior::Fail("input blocked".into()));
    let (backend, session) = run_with("TYPE abc\nMOUSE_POS 1 2", backend);
    let errors = session.messages(LogLevel::Error);
    assert_eq!(errors, vec!["TYPE: input blocked"]);
    assert_eq!(backend.calls(), vec!["type_text abc", "mouse_move 1 2"]);

    let commands = session.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0].result,
        CommandResult::Failure("TYPE: input blocked".into())
    );
    assert_eq!(commands[1].result, CommandResult::Success);
}

#[test]
fn release_happens_even_when_press_fails_later() {
    let backend = MockBackend::new().with_behavior("mouse_up", MockBehavior::Unsupported);
    let src = "\
TRY
    MOUSE_LEFT_CLICK 3 4
CATCH
    PRINT \"click failed\"
ENDTRY";
    let (backend, session) = run_with(src, backend);
    assert_eq!(session.messages(LogLevel::Info), vec!["click failed"]);
    assert_eq!(
        backend.calls(),
        vec!["mouse_move 3 4", "mouse_down LEFT", "mouse_up LEFT"]
    );
}

#[test]
fn builtin_backend_failure_is_an_expression_error() {
    let backend = MockBackend::new().with_behavior(
        "window_exists",
        MockBehavior::NotFound("window manager".into()),
    );
    let src = "\
TRY
    IF WINDOW_EXISTS Editor
        PRINT yes
    ENDIF
CATCH
    PRINT \"lookup failed\"
ENDTRY";
    let (_, session) = run_with(src, backend);
    assert_eq!(session.messages(LogLevel::Info), vec!["lookup failed"]);
    assert!(session.messages(LogLevel::Warning)[0].contains("window manager not found"));
}

#[test]
fn mouse_get_pos_reads_the_backend_cursor() {
    let (_, session) = run_with(
        "MOUSE_POS 40 50\nMOUSE_GET_POS $x $y\nPRINT \"$x,$y\"",
        MockBackend::new(),
    );
    assert_eq!(session.messages(LogLevel::Info), vec!["40,50"]);
}

#[test]
fn clipboard_round_trips_through_builtin() {
    let (_, session) = run_with(
        "CLIPBOARD_SET \"copied text\"\n$clip = CLIPBOARD_GET\nPRINT $clip",
        MockBackend::new(),
    );
    assert_eq!(session.messages(LogLevel::Info), vec!["copied text"]);
}

#[test]
fn variables_watch_tracks_every_assignment() {
    let (_, session) = run_with("$a = 1\n$b = $a + 1.5\n$s = \"x y\"", MockBackend::new());
    let vars = session.variables();
    assert_eq!(vars.get("$a").map(|v| v.to_string()).as_deref(), Some("1"));
    assert_eq!(vars.get("$b").map(|v| v.to_string()).as_deref(), Some("2.5"));
    assert_eq!(vars.get("$s").map(|v| v.to_string()).as_deref(), Some("x y"));
}
