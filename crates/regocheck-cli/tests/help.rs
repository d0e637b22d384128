use assert_cmd::Command;

/// Helper to get a Command for the regocheck binary.
#[allow(deprecated)]
fn regocheck_cmd() -> Command {
    Command::cargo_bin("regocheck").unwrap()
}

#[test]
fn help_works() {
    regocheck_cmd().arg("--help").assert().success();
}

#[test]
fn check_help_lists_flags() {
    regocheck_cmd()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--max-errors"))
        .stdout(predicates::str::contains("--rego-v1"));
}
