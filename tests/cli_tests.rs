use assert_cmd::Command;

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("notifier")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["serve", "migrate", "send-test", "cleanup-analytics"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in:\n{stdout}");
    }
}

#[test]
fn malformed_data_pairs_are_rejected_before_startup() {
    Command::cargo_bin("notifier")
        .unwrap()
        .args([
            "send-test",
            "user.registered",
            "--user",
            "1",
            "--email",
            "a@b.com",
            "--data",
            "no-equals-sign",
        ])
        .assert()
        .failure()
        .code(2);
}
