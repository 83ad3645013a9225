#![cfg(unix)]

use assert_cmd::prelude::*;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use reqwest::blocking::Client;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::{TempDir, tempdir};
use wait_timeout::ChildExt;

const CONFIG: &str = r#"[http]
bind = "127.0.0.1:0"

[source]
url = "http://127.0.0.1:1/api/beacons"

[poll]
interval_ms = 60000

[health]
shutdown_grace_ms = 1500

[log]
format = "json"
"#;

/// A running relay binary with its log output collected on a side thread.
struct RunningRelay {
    child: Child,
    addr: String,
    logs: JoinHandle<String>,
    _dir: TempDir,
}

fn start_relay() -> RunningRelay {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("relay.toml"), CONFIG).unwrap();

    let mut child = Command::cargo_bin("beacon-relay")
        .unwrap()
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn beacon-relay");

    // Drain stderr so the child never blocks on a full pipe.
    let mut stderr = child.stderr.take().expect("stderr not piped");
    let logs = std::thread::spawn(move || {
        let mut out = String::new();
        let _ = stderr.read_to_string(&mut out);
        out
    });

    let stdout = child.stdout.take().expect("stdout not piped");
    let addr = bound_addr(BufReader::new(stdout));
    RunningRelay {
        child,
        addr,
        logs,
        _dir: dir,
    }
}

/// Reads stdout until the `listening on <addr>` line shows up.
fn bound_addr(mut reader: impl BufRead) -> String {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut line = String::new();
    while Instant::now() < deadline {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        if let Some(addr) = line.trim().strip_prefix("listening on ") {
            return addr.to_string();
        }
    }
    panic!("relay never reported its listen address");
}

fn wait_for_status(url: &str, want: u16, within: Duration) -> bool {
    let client = Client::new();
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if client
            .get(url)
            .send()
            .is_ok_and(|resp| resp.status().as_u16() == want)
        {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn sigterm_drains_readyz_and_stops_the_poll_loop() {
    let mut relay = start_relay();
    let readyz = format!("http://{}/readyz", relay.addr);

    assert!(
        wait_for_status(&readyz, 200, Duration::from_secs(5)),
        "/readyz never answered 200"
    );

    kill(Pid::from_raw(relay.child.id() as i32), Signal::SIGTERM).expect("kill(SIGTERM)");

    // The grace period keeps the listener up while /readyz reports draining.
    assert!(
        wait_for_status(&readyz, 503, Duration::from_secs(5)),
        "/readyz kept answering 200 after SIGTERM"
    );

    let Some(status) = relay
        .child
        .wait_timeout(Duration::from_secs(5))
        .expect("wait_timeout failed")
    else {
        let _ = relay.child.kill();
        panic!("relay still running 5s after SIGTERM");
    };
    assert!(
        status.success() || status.signal().is_some(),
        "unexpected exit status: {status:?}"
    );

    let logs = relay.logs.join().expect("log reader panicked");
    assert!(
        logs.contains("poll loop stopped"),
        "poll loop did not report stopping; logs:\n{logs}"
    );
}
