use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};
use tempfile::TempDir;

use hap::cache::{Cache, MemoryCache};
use hap::engine::{Driver, FieldValue, Level, RunOptions, DATETIME_FIELD};
use hap::error::{FetchError, HapError, PlanError};
use hap::fetch::{Fetcher, LinkFetcher};
use hap::store;

const MOCKUP_LINK: &str = "http://localhost/mockup";

const MOCKUP: &str = r#"<!DOCTYPE html>
<html>
<head><title>Hap Test</title></head>
<body>
    <a href="https://github.com/lexndru/hap" title="Hap GitHub" id="github">Hap GitHub</a>
    <p>This is a sentence about cats.</p>
    <div>12:00 AM</div>
</body>
</html>"#;

/// Serves the mockup page and counts how often it was asked to.
#[derive(Default)]
struct MockupFetcher {
    calls: AtomicUsize,
}

impl Fetcher for MockupFetcher {
    fn fetch(&self, _link: &str, _headers: &BTreeMap<String, String>) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MOCKUP.as_bytes().to_vec())
    }
}

/// Always fails like a server returning 404.
struct NotFound;

impl Fetcher for NotFound {
    fn fetch(&self, _link: &str, _headers: &BTreeMap<String, String>) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Status(404))
    }
}

fn seeded_cache() -> MemoryCache {
    let cache = MemoryCache::default();
    cache.write_link(MOCKUP_LINK, MOCKUP.as_bytes()).unwrap();
    cache
}

fn offline_driver() -> Driver<NotFound, MemoryCache> {
    Driver::new(NotFound, seeded_cache(), RunOptions::default())
}

fn plan(define: Value, declare: Value) -> Value {
    json!({
        "meta": {"name": "mockup"},
        "link": MOCKUP_LINK,
        "define": define,
        "declare": declare
    })
}

fn text(value: &str) -> Option<FieldValue> {
    Some(FieldValue::Text(value.to_string()))
}

#[test]
fn test_css_query() {
    let outcome = offline_driver()
        .run(plan(
            json!([{"github": {"query_css": "#github"}}]),
            json!({"github": "string"}),
        ))
        .unwrap();
    assert_eq!(outcome.record.get("github").cloned(), text("Hap GitHub"));
    assert!(outcome.record.contains_key(DATETIME_FIELD));
}

#[test]
fn test_xpath_query() {
    let outcome = offline_driver()
        .run(plan(
            json!([{"url": {"query_xpath": "//a[@title='Hap GitHub']/@href"}}]),
            json!({"url": "string"}),
        ))
        .unwrap();
    assert_eq!(
        outcome.record.get("url").cloned(),
        text("https://github.com/lexndru/hap")
    );
}

#[test]
fn test_pattern_pipeline() {
    let outcome = offline_driver()
        .run(plan(
            json!([{"topic": [{"query": "p"}, {"pattern": "This is .* about (.+)\\."}]}]),
            json!({"topic": "string"}),
        ))
        .unwrap();
    assert_eq!(outcome.record.get("topic").cloned(), text("cats"));
}

#[test]
fn test_remove_and_glue() {
    let outcome = offline_driver()
        .run(plan(
            json!([
                {"time": [{"query": "body > div"}, {"remove": "[^0-9:]"}]},
                {"alert": {"glue": "The time is :time"}}
            ]),
            json!({"time": "string", "alert": "string"}),
        ))
        .unwrap();
    assert_eq!(outcome.record.get("time").cloned(), text("12:00"));
    assert_eq!(outcome.record.get("alert").cloned(), text("The time is 12:00"));
}

#[test]
fn test_replace_with_variable() {
    let outcome = offline_driver()
        .run(plan(
            json!([
                {"username": [
                    {"query_xpath": "//a[@id='github']/@href"},
                    {"pattern": "https?://.+/(.+)/.*"}
                ]},
                {"sentence": [{"query": "p"}, {"replace": ["cats", ":username"]}]}
            ]),
            json!({"username": "string", "sentence": "string"}),
        ))
        .unwrap();
    assert_eq!(outcome.record.get("username").cloned(), text("lexndru"));
    assert_eq!(
        outcome.record.get("sentence").cloned(),
        text("This is a sentence about lexndru.")
    );
}

#[test]
fn test_fallbacks_types_and_missing_fields() {
    let outcome = offline_driver()
        .run(plan(
            json!([
                {"title": {"query": "h1"}},
                {"title": {"query": "title"}},
                {"title": "never used"},
                {"hour": [{"query": "body > div"}, {"pattern": "(\\d+):"}]},
                {"broken": [{"query": "p"}, {"pattern": "("}]}
            ]),
            json!({"title": "string", "hour": "integer", "broken": "string", "ghost": "decimal"}),
        ))
        .unwrap();

    assert_eq!(outcome.record.get("title").cloned(), text("Hap Test"));
    assert_eq!(outcome.record.get("hour"), Some(&FieldValue::Integer(12)));
    assert!(!outcome.record.contains_key("broken"));
    assert!(!outcome.record.contains_key("ghost"));
    assert!(outcome.diagnostics.iter().any(|d| d.level == Level::Error));
}

#[test]
fn test_records_are_appended_and_reset() {
    let driver = offline_driver();
    let define = json!([{"github": {"query": "#github"}}]);
    let declare = json!({"github": "string"});

    let first = driver.run(plan(define.clone(), declare.clone())).unwrap();
    let second = driver.run(first.dataplan).unwrap();
    let records = second.dataplan["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["github"], "Hap GitHub");
    assert!(records[0]["_datetime"].is_string());

    let resetting = Driver::new(
        NotFound,
        seeded_cache(),
        RunOptions { reset_records: true, ..RunOptions::default() },
    );
    let third = resetting.run(second.dataplan).unwrap();
    assert_eq!(third.dataplan["records"].as_array().unwrap().len(), 1);
}

#[test]
fn test_skip_cache_fetches_every_time() {
    struct Shared<'a>(&'a MockupFetcher);
    impl Fetcher for Shared<'_> {
        fn fetch(&self, link: &str, headers: &BTreeMap<String, String>) -> Result<Vec<u8>, FetchError> {
            self.0.fetch(link, headers)
        }
    }

    let fetcher = MockupFetcher::default();
    let cached = Driver::new(Shared(&fetcher), MemoryCache::default(), RunOptions::default());
    let p = plan(json!([]), json!({}));
    cached.run(p.clone()).unwrap();
    cached.run(p.clone()).unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let live = Driver::new(
        Shared(&fetcher),
        MemoryCache::default(),
        RunOptions { skip_cache: true, ..RunOptions::default() },
    );
    live.run(p.clone()).unwrap();
    live.run(p).unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_local_file_link() {
    let dir = TempDir::new().unwrap();
    let page = dir.path().join("mockup.html");
    fs::write(&page, MOCKUP).unwrap();

    let cache = MemoryCache::default();
    let driver = Driver::new(LinkFetcher::default(), cache, RunOptions::default());
    let mut dataplan = plan(json!([{"github": {"query": "#github"}}]), json!({"github": "string"}));
    dataplan["link"] = json!(format!("file://{}", page.display()));

    let outcome = driver.run(dataplan).unwrap();
    assert_eq!(outcome.record.get("github").cloned(), text("Hap GitHub"));
}

#[test]
fn test_fatal_errors() {
    let driver = offline_driver();

    let missing_define = json!({"link": MOCKUP_LINK, "declare": {}});
    assert!(matches!(
        driver.run(missing_define).unwrap_err(),
        HapError::Plan(PlanError::MissingSection("define"))
    ));

    let bad_scheme = json!({"link": "ftp://localhost/", "define": [], "declare": {}});
    assert!(matches!(
        driver.run(bad_scheme).unwrap_err(),
        HapError::Plan(PlanError::UnsupportedScheme(_))
    ));

    let uncached = json!({"link": "http://localhost/other", "define": [], "declare": {}});
    assert!(matches!(
        driver.run(uncached).unwrap_err(),
        HapError::Fetch(FetchError::Status(404))
    ));

    assert!(matches!(
        driver.run(json!(["not", "a", "plan"])).unwrap_err(),
        HapError::Plan(PlanError::NotAnObject)
    ));
}

#[test]
fn test_saved_plan_keeps_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plan.json");
    store::write_plan(
        &path,
        &plan(json!([{"topic": {"query": "p"}}]), json!({"topic": "string"})),
    )
    .unwrap();

    let driver = offline_driver();
    for _ in 0..2 {
        let outcome = driver.run(store::read_plan(&path).unwrap()).unwrap();
        store::write_plan(&path, &outcome.dataplan).unwrap();
    }

    let saved = store::read_plan(&path).unwrap();
    assert_eq!(saved["records"].as_array().unwrap().len(), 2);
    assert_eq!(saved["records"][0]["topic"], "This is a sentence about cats.");
}
