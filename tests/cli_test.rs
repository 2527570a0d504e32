use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_replays_fixture() {
    let mut cmd = Command::new(cargo_bin!("marketflow"));
    cmd.arg("tests/fixtures/scenario.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "kind,id,number,status,total,verified,history_len",
        ))
        .stdout(predicate::str::contains(",delivered,45999,true,6"))
        .stdout(predicate::str::contains(",cancelled,40000,false,2"))
        .stdout(predicate::str::contains(",vendor_accepted,80,false,2"))
        .stdout(predicate::str::contains(",declined,80,false,2"))
        .stderr(predicate::str::contains("Error applying command on line 10"))
        .stderr(predicate::str::contains("Error applying command on line 16"))
        .stderr(predicate::str::contains("Error reading command on line 18"));
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("marketflow"));
    cmd.arg("tests/fixtures/does_not_exist.csv");

    cmd.assert().failure();
}

#[test]
fn test_cli_rejects_invalid_config() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut config, b"max_commit_attempts = 0\n").unwrap();

    let mut cmd = Command::new(cargo_bin!("marketflow"));
    cmd.arg("tests/fixtures/scenario.csv")
        .arg("--config")
        .arg(config.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("attempt limits"));
}

#[test]
fn test_cli_number_prefix_from_environment() {
    let mut cmd = Command::new(cargo_bin!("marketflow"));
    cmd.arg("tests/fixtures/scenario.csv")
        .env("MARKETFLOW_ORDER_NUMBER_PREFIX", "SHOP");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",SHOP-"));
}

#[test]
fn test_cli_refuses_unattested_verification() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut input,
        b"action, actor, target, arg1, arg2, arg3\n\
          restock, ops, lamp, 1\n\
          create_order, cust-1, o1, vend-1, lamp:1:120\n\
          submit_receipt, cust-1, o1, https://receipts/o1.png\n\
          verify, vend-1, o1\n\
          verify, vend-1, o1, no, looked fine\n",
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("marketflow"));
    cmd.arg(input.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",payment_submitted,120,false,2"))
        .stderr(predicate::str::contains("Error applying command on line 5"))
        .stderr(predicate::str::contains("Error applying command on line 6"));
}
