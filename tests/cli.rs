//! End-to-end checks of the simulator binary

use assert_cmd::Command;
use predicates::prelude::*;
use temp_dir::TempDir;

#[test]
fn short_run_prints_the_summary_report() {
    let mut cmd = Command::cargo_bin("alpidesim").unwrap();
    cmd.args([
        "--cycles",
        "4000",
        "--triggers",
        "4",
        "--trigger-period",
        "2000",
        "--check",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ALPIDE readout simulation summary"))
        .stdout(predicate::str::contains("Multi event buffer occupancy"));
}

#[test]
fn invalid_chip_id_fails_with_message() {
    let mut cmd = Command::cargo_bin("alpidesim").unwrap();
    cmd.args(["--chip-id", "99"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("chip ID"));
}

#[test]
fn stream_output_file_holds_whole_words() {
    let tmp_d = TempDir::new().unwrap();
    let out_path = tmp_d.child("stream.raw");
    let mut cmd = Command::cargo_bin("alpidesim").unwrap();
    cmd.args([
        "--cycles",
        "2000",
        "--triggers",
        "2",
        "--trigger-period",
        "2000",
        "-o",
        out_path.to_str().unwrap(),
    ]);
    cmd.assert().success();

    let stream = std::fs::read(&out_path).unwrap();
    assert_eq!(stream.len() % 3, 0, "output must be whole 24-bit words");
    assert_eq!(stream.len(), 3 * 2000);
    // The stream opens with inter-frame commas
    assert_eq!(&stream[..3], &[0xFE, 0xFE, 0xFE]);
}
