use std::io::Write;
use std::process::{Command, Output};

fn tunlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tunlink"))
        .args(args)
        .output()
        .expect("Failed to run tunlink")
}

fn write_temp_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("tunlink-config")
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
fn test_help_lists_subcommands() {
    let output = tunlink(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serial network bridge"));
    assert!(stdout.contains("bridge"));
    assert!(stdout.contains("ping"));
}

#[test]
fn test_bridge_missing_serial_device_exits_with_open_error() {
    let output = tunlink(&["bridge", "--serial", "/dev/tunlink-missing-tty"]);
    assert_eq!(output.status.code(), Some(3));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/dev/tunlink-missing-tty"), "stdout: {}", stdout);
}

#[test]
fn test_bridge_unsupported_schema_exits_with_config_error() {
    let config = write_temp_config(
        r#"
schema_version: "2.0"
serial:
  path: "/dev/tunlink-missing-tty"
"#,
    );
    let path = config.path().to_str().unwrap();

    let output = tunlink(&["bridge", "--config", path]);
    assert_eq!(output.status.code(), Some(2));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("schema_version"), "stdout: {}", stdout);
}

#[test]
fn test_bridge_missing_config_file_exits_with_config_error() {
    let output = tunlink(&["bridge", "--config", "/nonexistent/tunlink.yaml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_bridge_flags_override_config_file() {
    let config = write_temp_config(
        r#"
schema_version: "1.0"
serial:
  path: "/dev/ttyUSB0"
  baud: 9600
"#,
    );
    let path = config.path().to_str().unwrap();

    let output = tunlink(&[
        "bridge",
        "--config",
        path,
        "--serial",
        "/dev/tunlink-override-tty",
    ]);
    assert_eq!(output.status.code(), Some(3));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/dev/tunlink-override-tty"), "stdout: {}", stdout);
}

#[test]
fn test_bridge_invalid_flags_exit_with_config_error() {
    for args in [
        &["bridge", "--baud", "12345"][..],
        &["bridge", "--buffer-size", "1"][..],
        &["bridge", "--pin-cpus", "2"][..],
        &["bridge", "--interface", "an-interface-name-too-long"][..],
    ] {
        let output = tunlink(args);
        assert_eq!(output.status.code(), Some(2), "args: {:?}", args);
    }
}

#[test]
fn test_ping_missing_port_exits_with_open_error() {
    let output = tunlink(&[
        "ping",
        "--port-a",
        "/dev/tunlink-missing-a",
        "--port-b",
        "/dev/tunlink-missing-b",
    ]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_ping_same_port_exits_with_config_error() {
    let output = tunlink(&[
        "ping",
        "--port-a",
        "/dev/ttyUSB0",
        "--port-b",
        "/dev/ttyUSB0",
    ]);
    assert_eq!(output.status.code(), Some(2));
}
