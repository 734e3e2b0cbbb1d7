//! Integration tests for noticiero
//!
//! These drive the queue consumers and the orchestrator against a local HTTP
//! fixture and check what lands in the store and the index.

use noticiero::{
    config::{IngestConfig, StrategyConfig},
    index::{rank_by_label, DocumentId, DocumentQuery, SearchStore, SledSearchStore},
    linguistics::InMemoryCorpus,
    orchestrator::{start_orchestrators, OrchestratorDeps},
    pipeline::{register_stages, FetchMessage, PipelineContext, FETCH_TOPIC},
    queue::Queue,
    scraping::{FetchConfig, FetchEngine},
    sources::{SharedCatalog, SourceCatalog, StaticSourceProvider},
    storage::Store,
    types::SourceId,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

const WORDS: &str = "\
el\tes\tel\tdet
la\tes\tel\tdet
vino\tes\tvenir\tverb
vino\tes\tvino-n\tnoun
llegó\tes\tllegar\tverb
a\tes\ta\tprep
mesa\tes\tmesa\tnoun
portada\tes\tportada\tnoun
";

const BIGRAMS: &str = "el\tel\tvino\tvino-n\t10\n";

fn pages() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (
            "/",
            r#"<html lang="es"><body><p>La portada.</p>
                <a href="/nota-1">uno</a>
                <a href="/nota-2">dos</a>
                <a href="https://desconocido.org/x">fuera</a>
            </body></html>"#,
        ),
        (
            "/nota-1",
            r#"<html lang="es"><head><meta property="og:title" content="El vino"></head>
                <body><p>El vino llegó a la mesa.</p></body></html>"#,
        ),
        (
            "/nota-2",
            r#"<html lang="en"><body><p>Nothing to see here.</p></body></html>"#,
        ),
    ])
}

/// Minimal HTTP/1.1 server answering GETs from a fixed route table
async fn serve_site() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = pages();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = match routes.get(path.as_str()) {
                    Some(body) => ("200 OK", body.to_string()),
                    None => ("404 Not Found", String::new()),
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

struct Setup {
    _temp_dir: TempDir,
    store: Arc<Store>,
    search: Arc<SledSearchStore>,
    ctx: Arc<PipelineContext>,
    base: String,
}

async fn setup() -> Setup {
    let addr = serve_site().await;
    let base = format!("http://{}", addr);
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp_dir.path()).unwrap());
    let search = Arc::new(SledSearchStore::open(store.db()).unwrap());

    let catalog = SourceCatalog::from_toml_str(&format!(
        r#"
        [[source]]
        id = "local"
        url = "{}"
        ingest_strategy = "website-html-1"
        language_code = "es"
        should_use_url_as_seed_url = true
        "#,
        base
    ))
    .unwrap();

    let ctx = Arc::new(PipelineContext {
        fetcher: Arc::new(FetchEngine::new(FetchConfig::default()).unwrap()),
        catalog: Arc::new(SharedCatalog::new(Arc::new(StaticSourceProvider(catalog))).unwrap()),
        corpus: Arc::new(InMemoryCorpus::from_tsv(WORDS, BIGRAMS).unwrap()),
        search: search.clone(),
    });
    Setup {
        _temp_dir: temp_dir,
        store,
        search,
        ctx,
        base,
    }
}

/// Poll `done` every 50 ms for up to 10 s
async fn eventually(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

#[tokio::test]
async fn seed_page_flows_through_queue_then_orchestrator_indexes_links() {
    let s = setup().await;
    let (shutdown_tx, _) = broadcast::channel(1);

    // queue: fetch the seed page, discover its links
    let mut queue = Queue::new(s.store.clone()).with_poll_interval(Duration::from_millis(20));
    register_stages(&mut queue, s.ctx.clone()).unwrap();
    let queue = Arc::new(queue);
    let mut handles = queue.start_consumers(&shutdown_tx);
    queue
        .publish_now(FETCH_TOPIC, &FetchMessage { url: format!("{}/", s.base) })
        .unwrap();

    let store = s.store.clone();
    assert!(
        eventually(|| store.enqueued_total() == 0 && store.get_link("127.0.0.1|nota-2").unwrap().is_some()).await,
        "seed page was not processed"
    );
    assert!(store.get_link("127.0.0.1|nota-1").unwrap().is_some());
    assert!(store.get_link("desconocido.org|x").unwrap().is_none());
    let seed_doc = DocumentId::for_url(&format!("{}/", s.base)).unwrap();
    assert!(s.search.get_document(&seed_doc).unwrap().is_some());

    // orchestrator: work through the discovered links
    let website = StrategyConfig {
        time_until_free_secs: 0,
        ..StrategyConfig::website_html()
    };
    handles.extend(start_orchestrators(
        &IngestConfig {
            website_html: website,
            podcast_rss: StrategyConfig {
                enabled: false,
                ..StrategyConfig::podcast_rss()
            },
            ..IngestConfig::default()
        },
        OrchestratorDeps {
            store: s.store.clone(),
            pipeline: s.ctx.clone(),
            prefetch_batch_size: 300,
        },
        &shutdown_tx,
    ));

    let store = s.store.clone();
    assert!(
        eventually(|| store.unfetched_links(&SourceId::new("local"), 10).unwrap().is_empty()).await,
        "orchestrator did not fetch every link"
    );
    shutdown_tx.send(()).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    let nota_1 = DocumentId::for_url(&format!("{}/nota-1", s.base)).unwrap();
    let doc = s.search.get_document(&nota_1).unwrap().expect("nota-1 indexed");
    // the bigram with "el" picks the noun reading of "vino"
    assert_eq!(doc.lemmatized_body, "el vino-n llegar a el mesa");
    assert_eq!(doc.metadata.title.as_deref(), Some("El vino"));
    assert_eq!(doc.domain, "127.0.0.1");

    // English page was fetched but never indexed
    let nota_2 = DocumentId::for_url(&format!("{}/nota-2", s.base)).unwrap();
    assert!(s.search.get_document(&nota_2).unwrap().is_none());
    assert!(s.store.get_link("127.0.0.1|nota-2").unwrap().unwrap().is_fetched);

    let ranked = rank_by_label(s.search.as_ref(), &["vino-n".to_string()], &DocumentQuery::default()).unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].id, nota_1);
    assert!(ranked[0].score > 0.0);
}

#[tokio::test]
async fn restarted_store_redelivers_unfinished_messages() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Arc::new(Store::open(temp_dir.path()).unwrap());
        let s = setup().await;
        let mut queue = Queue::new(store.clone());
        register_stages(&mut queue, s.ctx.clone()).unwrap();
        queue
            .publish_now(FETCH_TOPIC, &FetchMessage { url: format!("{}/nota-1", s.base) })
            .unwrap();
        store.flush().unwrap();
    }

    let store = Store::open(temp_dir.path()).unwrap();
    assert_eq!(store.enqueued_count(FETCH_TOPIC), 1);
    let message = store.oldest_enqueued(FETCH_TOPIC).unwrap().unwrap();
    assert!(message.body.contains("/nota-1"));
}
