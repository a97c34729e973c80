//! End-to-end runs of the `drain` binary: HTTP writes, SIGHUP rotation,
//! control-socket quit, and termination signals.

use std::fs;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(10);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("ephemeral addr")
        .port()
}

struct DaemonProcess {
    child: Child,
    port: u16,
}

impl DaemonProcess {
    fn start(output: &Path, extra: &[&str]) -> Self {
        let port = free_port();
        let child = Command::new(assert_cmd::cargo::cargo_bin("drain"))
            .arg(output)
            .args(["--address", "127.0.0.1", "--port", &port.to_string()])
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn drain");

        let daemon = Self { child, port };
        daemon.wait_until_listening();
        daemon
    }

    fn wait_until_listening(&self) {
        let deadline = Instant::now() + DEADLINE;
        while TcpStream::connect(("127.0.0.1", self.port)).is_err() {
            assert!(Instant::now() < deadline, "drain never started listening");
            sleep(Duration::from_millis(25));
        }
    }

    fn post(&self, body: &str) -> u16 {
        post(self.port, body)
    }

    fn signal(&self, name: &str) {
        let status = Command::new("kill")
            .args([format!("-{name}"), self.child.id().to_string()])
            .status()
            .expect("run kill");
        assert!(status.success(), "kill -{name} failed");
    }

    fn wait_exit(&mut self) -> ExitStatus {
        let deadline = Instant::now() + DEADLINE;
        loop {
            if let Some(status) = self.child.try_wait().expect("try_wait") {
                return status;
            }
            assert!(Instant::now() < deadline, "drain did not exit");
            sleep(Duration::from_millis(25));
        }
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn post(port: u16, body: &str) -> u16 {
    ureq::post(&format!("http://127.0.0.1:{port}/"))
        .send_string(body)
        .expect("post")
        .status()
}

fn wait_for(path: &Path, expected: &str) {
    let deadline = Instant::now() + DEADLINE;
    loop {
        let content = fs::read_to_string(path).unwrap_or_default();
        if content == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "{} never reached {expected:?}, last saw {content:?}",
            path.display()
        );
        sleep(Duration::from_millis(25));
    }
}

fn wait_exists(path: &Path) {
    let deadline = Instant::now() + DEADLINE;
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        sleep(Duration::from_millis(25));
    }
}

#[test]
fn sighup_rotation_after_external_rename() {
    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("log.out");
    let rotated: PathBuf = dir.path().join("log.out.1");

    let mut daemon = DaemonProcess::start(&output, &[]);
    assert!(output.exists(), "output is opened at startup");

    assert_eq!(daemon.post("a"), 200);
    assert_eq!(daemon.post("b"), 200);
    wait_for(&output, "a\nb\n");

    fs::rename(&output, &rotated).expect("rename");
    daemon.signal("HUP");
    wait_exists(&output);

    assert_eq!(daemon.post("c"), 200);
    wait_for(&output, "c\n");
    assert_eq!(fs::read_to_string(&rotated).expect("read rotated"), "a\nb\n");

    daemon.signal("TERM");
    assert!(daemon.wait_exit().success(), "quit exits with status 0");
}

#[test]
fn repeated_sighups_each_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("log.out");

    let mut daemon = DaemonProcess::start(&output, &[]);
    for round in 1..=3 {
        assert_eq!(daemon.post(&format!("round-{round}")), 200);
        wait_for(&output, &format!("round-{round}\n"));

        let archived = dir.path().join(format!("log.out.{round}"));
        fs::rename(&output, &archived).expect("rename");
        daemon.signal("HUP");
        wait_exists(&output);
    }

    for round in 1..=3 {
        let archived = dir.path().join(format!("log.out.{round}"));
        assert_eq!(
            fs::read_to_string(&archived).expect("read archive"),
            format!("round-{round}\n")
        );
    }
    assert_eq!(fs::read_to_string(&output).expect("read live"), "");

    daemon.signal("INT");
    assert!(daemon.wait_exit().success());
}

#[test]
fn concurrent_clients_never_interleave_records() {
    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("log.out");
    let mut daemon = DaemonProcess::start(&output, &["--queue-capacity", "1"]);
    let port = daemon.port;

    let clients: Vec<_> = (0..24)
        .map(|n| {
            std::thread::spawn(move || {
                let record = format!("client-{n:02}|{}", "q".repeat(8192));
                post(port, &record)
            })
        })
        .collect();
    for client in clients {
        assert_eq!(client.join().expect("client thread"), 200);
    }

    let deadline = Instant::now() + DEADLINE;
    let content = loop {
        let content = fs::read_to_string(&output).unwrap_or_default();
        if content.lines().count() >= 24 || Instant::now() > deadline {
            break content;
        }
        sleep(Duration::from_millis(25));
    };

    let mut lines: Vec<&str> = content.lines().collect();
    lines.sort_unstable();
    let expected: Vec<String> = (0..24)
        .map(|n| format!("client-{n:02}|{}", "q".repeat(8192)))
        .collect();
    assert_eq!(lines, expected);

    daemon.signal("TERM");
    assert!(daemon.wait_exit().success());
}

#[test]
fn drainctl_rotate_and_quit() {
    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("log.out");
    let rotated = dir.path().join("log.out.old");
    let socket = dir.path().join("drain.sock");
    let socket_arg = socket.to_string_lossy().to_string();

    let mut daemon = DaemonProcess::start(&output, &["--control-socket", &socket_arg]);
    wait_exists(&socket);

    assert_cmd::Command::cargo_bin("drainctl")
        .expect("drainctl binary")
        .args(["--socket", &socket_arg, "ping"])
        .assert()
        .success()
        .stdout(predicates::str::contains("pong"));

    assert_eq!(daemon.post("before"), 200);
    wait_for(&output, "before\n");
    fs::rename(&output, &rotated).expect("rename");

    assert_cmd::Command::cargo_bin("drainctl")
        .expect("drainctl binary")
        .args(["--socket", &socket_arg, "rotate"])
        .assert()
        .success()
        .stdout(predicates::str::contains("rotate"));
    wait_exists(&output);

    assert_eq!(daemon.post("after"), 200);
    wait_for(&output, "after\n");
    assert_eq!(fs::read_to_string(&rotated).expect("read"), "before\n");

    assert_cmd::Command::cargo_bin("drainctl")
        .expect("drainctl binary")
        .args(["--socket", &socket_arg, "quit"])
        .assert()
        .success();
    assert!(daemon.wait_exit().success());
    assert!(!socket.exists(), "socket removed on quit");
}

#[test]
fn sighup_on_character_device_output_keeps_running() {
    let mut daemon = DaemonProcess::start(Path::new("/dev/null"), &[]);

    assert_eq!(daemon.post("discarded"), 200);
    daemon.signal("HUP");
    assert_eq!(daemon.post("still discarded"), 200);
    sleep(Duration::from_millis(100));
    assert!(
        daemon.child.try_wait().expect("try_wait").is_none(),
        "rotation of /dev/null must not stop the daemon"
    );

    daemon.signal("TERM");
    assert!(daemon.wait_exit().success());
}
