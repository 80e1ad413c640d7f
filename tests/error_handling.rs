use demobench::bench::{BenchmarkRunner, FileSet};
use demobench::config::BenchmarkConfig;
use demobench::parser::{CommandParserFactory, ParserCommand};
use demobench::{error, DemoBenchError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_missing_demo_directory_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = FileSet::discover(&format!("{}/nope/*", dir.path().display())).unwrap_err();

    assert!(matches!(err, DemoBenchError::ConfigError(_)));
    assert_eq!(error::exit_code(&err), 2);
    assert!(error::user_friendly_message(&err).contains("Check your settings"));
}

#[cfg(unix)]
#[test]
fn test_file_removed_after_discovery_aborts_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.dem"), b"a").unwrap();
    fs::write(dir.path().join("b.dem"), b"b").unwrap();
    let files = FileSet::discover(&format!("{}/*.dem", dir.path().display())).unwrap();
    fs::remove_file(dir.path().join("b.dem")).unwrap();

    let factory = CommandParserFactory::new(ParserCommand::per_file("true", ["{file}"])).unwrap();
    let runner = BenchmarkRunner::new(BenchmarkConfig::new().with_trials(2), factory).unwrap();

    match runner.run(&files) {
        Err(DemoBenchError::ParserError(msg)) => {
            assert!(msg.starts_with("trial 1:"));
            assert!(msg.contains("b.dem"));
        }
        other => panic!("expected parser error, got {:?}", other.map(|o| o.trials)),
    }
}

#[cfg(unix)]
#[test]
fn test_failing_parser_reports_stderr() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.dem"), b"").unwrap();
    let files = FileSet::discover(&format!("{}/*.dem", dir.path().display())).unwrap();

    let command = ParserCommand::per_file("sh", ["-c", "echo 'not a demo' >&2; exit 1", "{file}"]);
    let runner = BenchmarkRunner::new(
        BenchmarkConfig::new().with_trials(1),
        CommandParserFactory::new(command).unwrap(),
    )
    .unwrap();

    let err = runner.run(&files).unwrap_err();
    assert!(err.to_string().contains("not a demo"));
    assert_eq!(error::exit_code(&err), 1);
}

#[test]
fn test_invalid_parser_command_rejected() {
    let err = CommandParserFactory::new(ParserCommand::per_file("parse", ["--all"])).unwrap_err();
    assert!(matches!(err, DemoBenchError::ConfigError(_)));

    let err = CommandParserFactory::new(ParserCommand::worker("parse", ["{file}"])).unwrap_err();
    assert!(matches!(err, DemoBenchError::ConfigError(_)));
    assert_eq!(error::exit_code(&err), 2);
}

#[cfg(unix)]
#[test]
fn test_worker_crash_aborts_run() {
    let dir = TempDir::new().unwrap();
    for name in ["a.dem", "b.dem", "c.dem"] {
        fs::write(dir.path().join(name), b"demo").unwrap();
    }
    let files = FileSet::discover(&format!("{}/*.dem", dir.path().display())).unwrap();

    // Answers two requests, then dies
    let command = ParserCommand::worker(
        "sh",
        ["-c", "for i in 1 2; do read -r line; echo '{\"ok\":true}'; done; exit 9"],
    );
    let runner = BenchmarkRunner::new(
        BenchmarkConfig::new().with_trials(2),
        CommandParserFactory::new(command).unwrap(),
    )
    .unwrap();

    match runner.run(&files) {
        Err(DemoBenchError::ParserError(msg)) => {
            assert!(msg.starts_with("trial 1:"));
            assert!(msg.contains("exited"));
        }
        other => panic!("expected parser error, got {:?}", other.map(|o| o.trials)),
    }
}
