//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end through the HTTP fetcher and SQLite.

use crawl_engine::config::UserAgentConfig;
use crawl_engine::engine::{CrawlContext, EngineSettings};
use crawl_engine::fetcher::HttpLauncher;
use crawl_engine::job::{CrawlOptions, FieldSelector};
use crawl_engine::storage::{JobStore, Projection, ResultStore, SqliteStore};
use crawl_engine::{CrawlEngine, CrawlJob, CrawlResult, CrawlSupervisor, JobStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn context(store: &Arc<SqliteStore>) -> CrawlContext {
    CrawlContext::new(
        Arc::clone(store),
        Arc::new(HttpLauncher::new(&user_agent())),
        EngineSettings {
            page_timeout: Duration::from_secs(5),
        },
    )
}

fn html(body: &str) -> ResponseTemplate {
    // set_body_string forces text/plain over any content-type header, so the
    // mime type has to be given through set_body_raw
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn result_for<'a>(results: &'a [CrawlResult], url: &str) -> &'a CrawlResult {
    results
        .iter()
        .find(|r| r.url == url)
        .unwrap_or_else(|| panic!("no result for {}", url))
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<html>
            <head>
                <title>Home</title>
                <meta name="description" content="The home page">
                <link rel="canonical" href="/">
            </head>
            <body>
                <h1>Welcome</h1>
                <a href="/about">About</a>
                <a href="/blog#latest">Blog</a>
                <a href="/broken">Broken</a>
                <a href="/report.pdf">Report</a>
                <a href="https://external.test/page">Elsewhere</a>
                <a href="mailto:someone@example.com">Mail</a>
            </body>
        </html>"#,
    )
    .await;
    mount_html(
        &server,
        "/about",
        r#"<html><head><title>About</title></head>
           <body><h1>About us</h1><a href="/team">Team</a></body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/blog",
        r#"<html><head><title>Blog</title></head><body><h1>Posts</h1></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4".to_vec())
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let mut options = CrawlOptions::default();
    options.selectors.insert(
        "heading".to_string(),
        FieldSelector {
            selector: "h1".to_string(),
            attribute: None,
            multiple: false,
        },
    );
    options.selectors.insert(
        "hrefs".to_string(),
        FieldSelector {
            selector: "a".to_string(),
            attribute: Some("href".to_string()),
            multiple: true,
        },
    );

    let seed = format!("{}/", base);
    let job = CrawlJob::new(&seed, 1, 50, options).unwrap();
    let job_id = job.id.clone();

    let status = CrawlEngine::new(job, context(&store)).start().await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let job = store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.progress.pages_processed, 5);
    assert_eq!(job.progress.pages_successful, 3);
    assert_eq!(job.progress.pages_failed, 2);
    assert_eq!(job.result_count, Some(5));

    let results = store
        .page_by_job(&job_id, 1, 100, Projection::Full)
        .await
        .unwrap()
        .results;
    assert_eq!(results.len(), 5);

    // Seed page content, links and selector data
    let home = result_for(&results, &seed);
    assert_eq!(home.depth, 0);
    let content = home.content().unwrap();
    assert_eq!(content.title.as_deref(), Some("Home"));
    assert_eq!(content.status_code, 200);
    assert!(content.text.contains("Welcome"));
    assert!(content.html.as_deref().unwrap().contains("<h1>Welcome</h1>"));
    assert_eq!(
        content.metadata.get("description").map(String::as_str),
        Some("The home page")
    );
    assert_eq!(content.metadata.get("canonical"), Some(&seed));
    assert_eq!(content.data["heading"], json!("Welcome"));
    assert_eq!(
        content.data["hrefs"],
        json!([
            "/about",
            "/blog#latest",
            "/broken",
            "/report.pdf",
            "https://external.test/page",
            "mailto:someone@example.com"
        ])
    );

    let internal: Vec<_> = content.internal_links().map(|l| l.url.clone()).collect();
    assert_eq!(
        internal,
        vec![
            format!("{}/about", base),
            format!("{}/blog", base),
            format!("{}/broken", base),
            format!("{}/report.pdf", base),
        ]
    );
    let external: Vec<_> = content.links.iter().filter(|l| !l.is_internal).collect();
    assert_eq!(external.len(), 1);
    assert_eq!(external[0].url, "https://external.test/page");

    // Children are recorded with their parent, but not expanded past depth 1
    let about = result_for(&results, &format!("{}/about", base));
    assert_eq!(about.depth, 1);
    assert_eq!(about.parent_url.as_deref(), Some(seed.as_str()));
    assert_eq!(
        about.content().unwrap().data["heading"],
        json!("About us")
    );
    assert!(results.iter().all(|r| !r.url.ends_with("/team")));

    let broken = result_for(&results, &format!("{}/broken", base));
    assert!(broken.error().unwrap().contains("500"));

    let pdf = result_for(&results, &format!("{}/report.pdf", base));
    assert!(pdf.error().unwrap().contains("application/pdf"));
}

#[tokio::test]
async fn test_custom_headers_and_user_agent_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-research-token", "abc123"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html("<html><head><title>Ok</title></head></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let mut options = CrawlOptions::default();
    options
        .headers
        .insert("X-Research-Token".to_string(), "abc123".to_string());

    let job = CrawlJob::new(&format!("{}/", server.uri()), 0, 1, options).unwrap();
    let job_id = job.id.clone();
    CrawlEngine::new(job, context(&store)).start().await.unwrap();

    let results = store
        .page_by_job(&job_id, 1, 10, Projection::Full)
        .await
        .unwrap()
        .results;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
}

#[tokio::test]
async fn test_invalid_selector_fails_job() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "<html></html>").await;

    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let mut options = CrawlOptions::default();
    options.selectors.insert(
        "broken".to_string(),
        FieldSelector {
            selector: "div[[".to_string(),
            attribute: None,
            multiple: false,
        },
    );

    let job = CrawlJob::new(&format!("{}/", server.uri()), 1, 10, options).unwrap();
    let job_id = job.id.clone();
    let status = CrawlEngine::new(job, context(&store)).start().await.unwrap();

    assert_eq!(status, JobStatus::Failed);
    let job = store.get_job(&job_id).await.unwrap().unwrap();
    assert!(job.error_message.unwrap().contains("broken"));
    assert_eq!(store.count_by_job(&job_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_supervised_crawl_with_file_database() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#,
    )
    .await;
    mount_html(&server, "/a", "<html><body>A</body></html>").await;
    mount_html(&server, "/b", "<html><body>B</body></html>").await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());

    let job = CrawlJob::new(
        &format!("{}/", server.uri()),
        2,
        10,
        CrawlOptions::default(),
    )
    .unwrap();
    let job_id = job.id.clone();
    store.save_job(&job).await.unwrap();

    let supervisor = CrawlSupervisor::new(context(&store));
    supervisor.submit(job).await.unwrap();

    let mut finished = None;
    for _ in 0..500 {
        let job = supervisor.job(&job_id).await.unwrap();
        if job.status.is_terminal() {
            finished = Some(job);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let finished = finished.expect("job did not finish in time");
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.result_count, Some(3));

    let page = supervisor.results_page(&job_id, 1, 2).await.unwrap();
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.pages, 2);
    assert_eq!(page.results.len(), 2);
    assert!(page
        .results
        .iter()
        .all(|r| r.content().unwrap().html.is_none()));

    // A reopened store sees the same data
    drop(supervisor);
    let reopened = SqliteStore::new(&db_path).unwrap();
    let listed = reopened.list_jobs(None, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, job_id);
    assert_eq!(reopened.count_by_job(&job_id).await.unwrap(), 3);
}
