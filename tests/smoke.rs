use assert_cmd::Command;

#[test]
fn cli_help_runs() {
    let mut cmd = Command::cargo_bin("ml-lifecycle-mapper").expect("binary exists");
    cmd.arg("--help").assert().success();
}

#[test]
fn run_writes_records_for_a_small_corpus() {
    let root = tempfile::tempdir().unwrap();
    let raw = root.path().join("data").join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(
        raw.join("q1.jsonl"),
        [
            r#"{"doi":"10.1/a","abstract":"Supervised learning with a neural network for defect detection."}"#,
            r#"{"doi":"10.1/b","abstract":"Random forest models predict tool wear in machining."}"#,
            r#"{"doi":"10.1/c","abstract":""}"#,
        ]
        .join("\n"),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("ml-lifecycle-mapper").expect("binary exists");
    cmd.current_dir(root.path())
        .env("DATA_DIR", root.path().join("data"))
        .env("OUTPUTS_DIR", root.path().join("outputs"))
        .env("HASHING_DIM", "32")
        .arg("run")
        .assert()
        .success();

    let records = std::fs::read_to_string(root.path().join("outputs/records.jsonl")).unwrap();
    assert_eq!(records.lines().count(), 3);
    assert!(root.path().join("data/clean/labeled.jsonl").exists());
    assert!(root.path().join("outputs/records.parquet").exists());
    // Two embedded documents cannot be clustered.
    assert!(!root.path().join("outputs/cluster_run.json").exists());
}

#[test]
fn run_rejects_an_inverted_k_range() {
    let root = tempfile::tempdir().unwrap();
    let raw = root.path().join("data").join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(
        raw.join("q1.jsonl"),
        r#"{"doi":"10.1/a","abstract":"Supervised learning for product design."}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("ml-lifecycle-mapper").expect("binary exists");
    cmd.current_dir(root.path())
        .env("DATA_DIR", root.path().join("data"))
        .env("OUTPUTS_DIR", root.path().join("outputs"))
        .args(["run", "--k-min", "6", "--k-max", "3"])
        .assert()
        .failure();

    assert!(!root.path().join("outputs/records.jsonl").exists());
    assert!(!root.path().join("data/clean/labeled.jsonl").exists());
}
