//! CLI test cases.
//!
//! Most of these run without `tesseract` or `pdftotext`, by sticking to
//! subcommands and inputs that never reach an OCR engine. The rest are
//! ignored by default.

use assert_cmd::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary, making sure we never talk to a
/// real AI service.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("docscan").unwrap();
    cmd.env_remove("GEMINI_API_KEY");
    cmd
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("GEMINI_API_KEY"));
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_parse_driver_license_text() {
    cmd()
        .arg("parse")
        .arg("tests/fixtures/cnh.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""taxId": "987.654.321-00""#))
        .stdout(predicate::str::contains(r#""likelyName": "JOSE CARLOS PEREIRA""#))
        .stdout(predicate::str::contains(r#""documentType": "CNH""#))
        .stdout(predicate::str::contains(r#""score": 9"#))
        .stdout(predicate::str::contains(r#""gold": true"#));
}

#[test]
fn test_parse_from_stdin() {
    cmd()
        .arg("parse")
        .write_stdin("CPF 123.456.789-09\n\nNOME\nMARIA DA SILVA\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""taxId": "123.456.789-09""#))
        .stdout(predicate::str::contains(r#""documentType": "UNKNOWN""#));
}

#[test]
fn test_schema_extract_response() {
    cmd()
        .arg("schema")
        .arg("ExtractResponse")
        .assert()
        .success()
        .stdout(predicate::str::contains("extractedFields"))
        .stdout(predicate::str::contains("rawText"));
}

#[test]
fn test_schema_extractor_config() {
    cmd()
        .arg("schema")
        .arg("ExtractorConfig")
        .assert()
        .success()
        .stdout(predicate::str::contains("request_timeout_secs"));
}

#[test]
fn test_extract_reports_bad_records_per_line() {
    cmd()
        .arg("extract")
        .arg("tests/fixtures/malformed.jsonl")
        .arg("--allowed-failure-rate")
        .arg("1.0")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":1"#))
        .stdout(predicate::str::contains(r#""id":2"#))
        .stdout(predicate::str::contains(r#""success":false"#))
        .stdout(predicate::str::contains("request is malformed"));
}

#[test]
fn test_extract_enforces_failure_rate() {
    cmd()
        .arg("extract")
        .arg("tests/fixtures/malformed.jsonl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("documents failed"));
}

#[test]
fn test_image_rejects_non_images() {
    cmd()
        .arg("image")
        .arg("tests/fixtures/cnh.txt")
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""success": false"#))
        .stdout(predicate::str::contains("could not decode image"));
}

#[test]
fn test_list_models_requires_a_key() {
    cmd()
        .arg("list-models")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}

#[test]
#[ignore = "Needs pdftotext installed"]
fn test_image_reads_pdf_text_layer() {
    cmd()
        .arg("image")
        .arg("tests/fixtures/cnh.pdf")
        .assert()
        .success()
        .stdout(predicate::str::contains("PDF_NATIVE_EXTRACTION"))
        .stdout(predicate::str::contains(r#""taxId": "987.654.321-00""#));
}
