use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn citebridge_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("citebridge");
    path
}

const LIBRARY: &str = r#"[
  {
    "type": "book",
    "title": "First Book",
    "author": [{ "family": "Doe", "given": "John" }],
    "issued": { "date-parts": [[2005]] },
    "publisher": "Cambridge University Press",
    "citation-key": "DoeFirstBook2005",
    "attachments": ["/home/doe/storage/first-book.pdf"]
  },
  {
    "type": "article-journal",
    "title": "Article",
    "author": [{ "family": "Doe", "given": "John" }],
    "issued": { "date-parts": [[2006, 3, 1]] },
    "container-title": "Journal of Generic Studies",
    "volume": "6",
    "page": "33-34",
    "citation-key": "DoeArticle2006",
    "notes": ["Reading notes on the article"]
  },
  {
    "type": "book",
    "title": "Relatie tussen woordvorming en syntaxis",
    "author": [{ "family": "Hüning", "given": "Matthias" }],
    "issued": { "date-parts": [[2012]] },
    "tags": ["@hüning:2012foo"]
  },
  {
    "type": "article-journal",
    "title": "Jesus Wars",
    "author": [{ "family": "Jenkins", "given": "Philip" }],
    "issued": { "date-parts": [[2010]] }
  },
  {
    "type": "book",
    "title": "Jesus and Empire",
    "author": [{ "family": "Jenkins", "given": "John" }],
    "issued": { "date-parts": [[2010]] }
  }
]"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(root.join("library.json"), LIBRARY).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/library.sqlite"

[server]
bind = "127.0.0.1:23119"
prefix = "/citebridge"

[citation]
default_style = "chicago-note-bibliography"
styles = ["chicago-note-bibliography", "chicago-author-date"]
"#,
        root.display()
    );

    let config_path = config_dir.join("citebridge.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_citebridge(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = citebridge_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run citebridge binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn setup_imported() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_citebridge(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let library = tmp.path().join("library.json");
    let (stdout, stderr, success) = run_citebridge(
        &config_path,
        &["import", library.to_str().unwrap(), "--collection", "My citations"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_citebridge(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/library.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_citebridge(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_citebridge(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_counts() {
    let (tmp, config_path) = setup_test_env();
    run_citebridge(&config_path, &["init"]);
    let library = tmp.path().join("library.json");
    let (stdout, stderr, success) =
        run_citebridge(&config_path, &["import", library.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("items: 5"));
    assert!(stdout.contains("notes: 1"));
    assert!(stdout.contains("attachments: 1"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_resolve_csl_json() {
    let (_tmp, config_path) = setup_imported();

    let (stdout, stderr, success) = run_citebridge(&config_path, &["resolve", "DoeBook2005"]);
    assert!(success, "resolve failed: {}", stderr);
    let items: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(items[0]["type"], "book");
    assert_eq!(items[0]["title"], "First Book");
    assert_eq!(items[0]["author"][0]["family"], "Doe");
    assert_eq!(items[0]["id"], "DoeFirstBook2005");
}

#[test]
fn test_resolve_both_grammars_agree() {
    let (_tmp, config_path) = setup_imported();

    let (primary, _, ok1) =
        run_citebridge(&config_path, &["resolve", "DoeBook2005", "--format", "key"]);
    let (alternate, _, ok2) =
        run_citebridge(&config_path, &["resolve", "doe:2005book", "--format", "key"]);
    assert!(ok1 && ok2);
    assert_eq!(primary, alternate);
    assert!(primary.contains("\"1_"));
}

#[test]
fn test_resolve_unicode_and_pinned() {
    let (_tmp, config_path) = setup_imported();

    let (stdout, stderr, success) = run_citebridge(
        &config_path,
        &["resolve", "HüningRelatie2012,hüning:2012foo", "--format", "easykey"],
    );
    assert!(success, "resolve failed: {}", stderr);
    let keys: Vec<String> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(keys, vec!["hüning:2012relatie", "hüning:2012relatie"]);
}

#[test]
fn test_resolve_malformed_key_fails() {
    let (_tmp, config_path) = setup_imported();

    let (_, stderr, success) = run_citebridge(&config_path, &["resolve", "XXX"]);
    assert!(!success);
    assert!(stderr.contains("DoeTitle2000"));
}

#[test]
fn test_resolve_ambiguous_key_fails() {
    let (_tmp, config_path) = setup_imported();

    let (_, stderr, success) = run_citebridge(&config_path, &["resolve", "jenkins:2010jesus"]);
    assert!(!success);
    assert!(stderr.contains("multiple items"));
}

#[test]
fn test_resolve_bibtex() {
    let (_tmp, config_path) = setup_imported();

    let (stdout, stderr, success) = run_citebridge(
        &config_path,
        &["resolve", "DoeArticle2006", "--format", "bibtex"],
    );
    assert!(success, "resolve failed: {}", stderr);
    assert!(stdout.starts_with("@article{doe_article_2006,"));
    assert!(stdout.contains("journal = {Journal of Generic Studies}"));
    assert!(stdout.contains("pages = {33--34}"));
}

#[test]
fn test_resolve_bibliography_style() {
    let (_tmp, config_path) = setup_imported();

    let (stdout, stderr, success) = run_citebridge(
        &config_path,
        &[
            "resolve",
            "DoeArticle2006",
            "--format",
            "bibliography",
            "--style",
            "chicago-author-date",
        ],
    );
    assert!(success, "resolve failed: {}", stderr);
    let records: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(records[0]["text"], "Doe, John. 2006. Article.");

    let (_, stderr, success) = run_citebridge(
        &config_path,
        &["resolve", "DoeArticle2006", "--format", "bibliography", "--style", "apa"],
    );
    assert!(!success);
    assert!(stderr.contains("is not installed"));
}

#[test]
fn test_search_note_only_with_everything() {
    let (_tmp, config_path) = setup_imported();

    let (stdout, _, success) =
        run_citebridge(&config_path, &["search", "reading", "--format", "key"]);
    assert!(success);
    let keys: Vec<String> = serde_json::from_str(&stdout).unwrap();
    assert!(keys.is_empty());

    let (stdout, stderr, success) = run_citebridge(
        &config_path,
        &["search", "reading", "--method", "everything", "--format", "quickBib"],
    );
    assert!(success, "search failed: {}", stderr);
    let records: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(records[0]["quickBib"], "Doe, John - 2006 - Article");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) =
        run_citebridge(&tmp.path().join("missing.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
