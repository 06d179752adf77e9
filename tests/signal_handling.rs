use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_yash"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn yash");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
    }

    child.wait_with_output().expect("wait output")
}

/// The shell has no quoting, so multi-word scripts go through a file.
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

#[test]
fn interrupt_ends_foreground_job_but_not_shell() {
    let dir = tempfile::tempdir().unwrap();
    let path = script(dir.path(), "int.sh", "kill -INT $$\necho NOT_REACHED\n");

    let line = format!("sh {}", path.display());
    let output = run_shell(&[line.as_str(), "echo ALIVE", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!stdout.contains("NOT_REACHED"), "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
    // The interrupted job is finished and gone.
    assert!(!stdout.contains("[1]"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn pipeline_sigpipe_does_not_abort_shell() {
    // yes writes forever; head exits after one line and yes dies of SIGPIPE.
    let output = run_shell(&["yes | head -n 1", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "y\nALIVE\n");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn child_stop_key_is_not_inherited_as_ignored() {
    // The shell ignores SIGTSTP; a child that kept that disposition would
    // never stop and would print RESUMED before `jobs` runs.
    let dir = tempfile::tempdir().unwrap();
    let path = script(dir.path(), "tstp.sh", "kill -TSTP $$\necho RESUMED\n");

    let line = format!("sh {}", path.display());
    let output = run_shell(&[line.as_str(), "jobs", "fg"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let stopped = stdout.find("Stopped").expect("job reported as stopped");
    let resumed = stdout.find("RESUMED").expect("job resumed by fg");
    assert!(stopped < resumed, "stdout was: {stdout}");
}

#[test]
fn shell_ignores_stop_signals_at_prompt() {
    // SIGTSTP aimed at the shell itself (found through the parent pid of a child).
    let dir = tempfile::tempdir().unwrap();
    let path = script(dir.path(), "parent.sh", "kill -TSTP $PPID\n");

    let line = format!("sh {}", path.display());
    let output = run_shell(&[line.as_str(), "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

/// Run the shell on a pseudo-terminal through util-linux `script`, typing
/// each chunk after a pause. `None` when `script` is not available.
fn run_on_pty(typed: &[&[u8]]) -> Option<String> {
    let available = Command::new("script")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success());
    if !available {
        return None;
    }

    let mut child = Command::new("script")
        .args(["-qfec", env!("CARGO_BIN_EXE_yash"), "/dev/null"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn script");

    let mut stdin = child.stdin.take().expect("stdin");
    for chunk in typed {
        sleep(Duration::from_millis(300));
        let _ = stdin.write_all(chunk);
        let _ = stdin.flush();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while child.try_wait().expect("try_wait").is_none() {
        if Instant::now() > deadline {
            let _ = child.kill();
            break;
        }
        sleep(Duration::from_millis(50));
    }
    drop(stdin);

    let output = child.wait_with_output().expect("wait output");
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[test]
fn foreground_pipeline_reads_from_the_terminal() {
    // `cat` must own the terminal from the start; otherwise it is stopped
    // by SIGTTIN and the line typed afterwards never reaches it.
    let Some(screen) = run_on_pty(&[
        b"cat | wc -l\n",
        b"hello\n",
        b"\x04",
        b"echo AFTER\n",
        b"\x04",
    ]) else {
        return;
    };

    let lines: Vec<&str> = screen.lines().map(str::trim).collect();
    assert!(!screen.contains("Stopped"), "screen was: {screen:?}");
    assert!(lines.contains(&"1"), "screen was: {screen:?}");
    assert!(lines.contains(&"AFTER"), "screen was: {screen:?}");
}
