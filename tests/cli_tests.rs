//! Integration tests for the command line interface

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tally_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sentiment-tally").unwrap();
    cmd.current_dir(cwd);
    for key in [
        "TALLY_JOB_NAME",
        "TALLY_PARALLELISM",
        "TALLY_SPLIT_SIZE",
        "TALLY_REDUCERS",
        "TALLY_MAX_ATTEMPTS",
        "TALLY_OVERWRITE",
        "TALLY_MERGE",
        "TALLY_EXTRACTOR",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn write_reviews(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("reviews.txt");
    fs::write(&input, "great product\nterrible\nok i guess\n").unwrap();
    input
}

#[test]
fn test_help_lists_options() {
    let temp_dir = TempDir::new().unwrap();
    tally_cmd(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--reducers"))
        .stdout(predicate::str::contains("--merge"));
}

#[test]
fn test_missing_arguments_fail() {
    let temp_dir = TempDir::new().unwrap();
    tally_cmd(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_counts_reference_reviews() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_reviews(temp_dir.path());
    let output = temp_dir.path().join("out");

    tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Records labelled:  3"));

    assert_eq!(
        fs::read_to_string(output.join("part-r-00000")).unwrap(),
        "negative\t1\nneutral\t1\npositive\t1\n"
    );
    assert!(output.join("_SUCCESS").exists());
}

#[test]
fn test_existing_output_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_reviews(temp_dir.path());
    let output = temp_dir.path().join("out");
    fs::create_dir(&output).unwrap();

    tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
    assert!(!output.join("part-r-00000").exists());

    tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(&output)
        .arg("--overwrite")
        .assert()
        .success();
    assert!(output.join("part-r-00000").exists());
}

#[test]
fn test_missing_input_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    tally_cmd(temp_dir.path())
        .arg(temp_dir.path().join("nope"))
        .arg(temp_dir.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
    assert!(!temp_dir.path().join("out").exists());
}

#[test]
fn test_json_summary() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_reviews(temp_dir.path());
    let output = temp_dir.path().join("out");

    let assert = tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(&output)
        .args(["--json", "--merge", "tree", "-r", "2"])
        .assert()
        .success();

    let summary: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["records"], 3);
    assert_eq!(summary["dropped"], 0);
    assert_eq!(summary["files"].as_array().unwrap().len(), 2);
}

#[test]
fn test_config_file_and_flag_precedence() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("reviews.txt");
    fs::write(&input, "5\tgreat\n1\tawful\n").unwrap();
    fs::write(
        temp_dir.path().join("tally.toml"),
        "job_name = \"nightly\"\nextractor = \"lexicon\"\nreducers = 3\n",
    )
    .unwrap();

    // The file selects the lexicon extractor; the flag switches back to ratings
    tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(temp_dir.path().join("out"))
        .args(["--extractor", "rating", "--reducers", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Job 'nightly' completed"));

    assert_eq!(
        fs::read_to_string(temp_dir.path().join("out").join("part-r-00000")).unwrap(),
        "negative\t1\npositive\t1\n"
    );
}

#[test]
fn test_invalid_reducers_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_reviews(temp_dir.path());
    tally_cmd(temp_dir.path())
        .arg(&input)
        .arg(temp_dir.path().join("out"))
        .args(["--reducers", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}
