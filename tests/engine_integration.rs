//! End-to-end tests of probes, transfers, selection and reporting against
//! mock LibreSpeed backends

use async_trait::async_trait;
use network_speed_tester::{
    client::{ClientFactory, SpeedtestClient, TransportOptions},
    error::{AppError, Result},
    latency::{EchoProbe, LatencyProbe, ProbeOptions},
    logging::Logger,
    models::{Config, IpInfo, Server},
    selector::{EndpointSelector, HttpProber},
    servers::{fetch_server_list, ServerFilter},
    telemetry::{send_telemetry, TelemetryExtra, TelemetryLevel, TelemetryReport, TelemetrySettings},
    transfer::{TransferConfig, TransferDriver},
    types::OutputMode,
    TestOrchestrator,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const CHUNK: usize = 64 * 1024;

/// Mock backend exposing the standard LibreSpeed paths
struct MockSpeedServer {
    server: MockServer,
}

impl MockSpeedServer {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn url(&self) -> String {
        self.server.uri()
    }

    fn record(&self, id: i64, name: &str) -> Server {
        Server {
            id,
            name: name.to_string(),
            server: format!("{}/", self.url()),
            download_url: "garbage.php".to_string(),
            upload_url: "empty.php".to_string(),
            ping_url: "empty.php".to_string(),
            get_ip_url: "getIP.php".to_string(),
            ..Default::default()
        }
    }

    async fn mock_ping(&self, delay: Option<Duration>) {
        let mut template = ResponseTemplate::new(200);
        if let Some(delay) = delay {
            template = template.set_delay(delay);
        }
        Mock::given(method("GET"))
            .and(path("/empty.php"))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    async fn mock_download(&self) {
        Mock::given(method("GET"))
            .and(path("/garbage.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; CHUNK]))
            .mount(&self.server)
            .await;
    }

    async fn mock_upload(&self) {
        Mock::given(method("POST"))
            .and(path("/empty.php"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    async fn mock_ip_info(&self) {
        Mock::given(method("GET"))
            .and(path("/getIP.php"))
            .and(query_param("isp", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"processedString":"198.51.100.7 - Example ISP","rawIspInfo":{"ip":"198.51.100.7","org":"Example ISP","readme":"https://ipinfo.io/missingauth"}}"#,
            ))
            .mount(&self.server)
            .await;
    }

    async fn mock_all(&self) {
        self.mock_ping(None).await;
        self.mock_download().await;
        self.mock_upload().await;
        self.mock_ip_info().await;
    }
}

/// ICMP that never works, forcing the HTTP fallback
struct BrokenEcho {
    calls: AtomicUsize,
}

#[async_trait]
impl EchoProbe for BrokenEcho {
    async fn echo(&self, _host: &str, _count: usize, _options: &ProbeOptions) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::network("ping: permission denied"))
    }
}

fn http_client() -> reqwest::Client {
    ClientFactory::build(&TransportOptions::default()).unwrap()
}

fn probe(client: reqwest::Client) -> LatencyProbe {
    LatencyProbe::new(client, ProbeOptions::default(), Logger::quiet("PING"))
}

fn transfer_config(concurrency: usize, secs: u64) -> TransferConfig {
    TransferConfig {
        concurrency,
        duration: Duration::from_secs(secs),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_http_ping_takes_requested_samples() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/empty.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(5)
        .mount(&mock.server)
        .await;

    let outcome = probe(http_client())
        .http_ping_and_jitter(&mock.record(1, "A"), 5)
        .await
        .unwrap();

    assert!(outcome.avg_ms > 0.0);
    assert!(outcome.jitter_ms >= 0.0);
}

#[tokio::test]
async fn test_icmp_failure_falls_back_to_http_with_extra_samples() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/empty.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(12)
        .mount(&mock.server)
        .await;

    let echo = Arc::new(BrokenEcho { calls: AtomicUsize::new(0) });
    let probe = probe(http_client()).with_echo(echo.clone());
    let mut server = mock.record(1, "A");

    probe.icmp_ping_and_jitter(&mut server, 10).await.unwrap();
    assert!(server.no_icmp);
    mock.server.verify().await;

    // sticky: the second run goes straight to HTTP
    mock.server.reset().await;
    mock.mock_ping(None).await;
    probe.icmp_ping_and_jitter(&mut server, 1).await.unwrap();
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_download_counts_streamed_bytes() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/garbage.php"))
        .and(query_param("ckSize", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; CHUNK]))
        .mount(&mock.server)
        .await;

    let driver = TransferDriver::new(transfer_config(2, 1), Logger::quiet("XFER"));
    let outcome = driver.download(&http_client(), &mock.record(1, "A"), 4).await.unwrap();

    assert!(outcome.total_bytes >= CHUNK as u64, "only {} bytes", outcome.total_bytes);
    assert!(outcome.mbps > 0.0);
}

#[tokio::test]
async fn test_upload_sends_full_payloads() {
    let mock = MockSpeedServer::new().await;
    mock.mock_upload().await;

    let driver = TransferDriver::new(transfer_config(2, 1), Logger::quiet("XFER"));
    let outcome = driver
        .upload(&http_client(), &mock.record(1, "A"), true, CHUNK)
        .await
        .unwrap();

    assert!(outcome.total_bytes > 0);

    let received = mock.server.received_requests().await.unwrap();
    let posts: Vec<_> = received.iter().filter(|r| r.method.as_str() == "POST").collect();
    assert!(posts.iter().any(|r| r.body.len() == CHUNK));
    assert!(posts.iter().all(|r| r.body.len() <= CHUNK));
}

#[tokio::test]
async fn test_upload_without_preallocation() {
    let mock = MockSpeedServer::new().await;
    mock.mock_upload().await;

    let driver = TransferDriver::new(transfer_config(1, 1), Logger::quiet("XFER"));
    let outcome = driver
        .upload(&http_client(), &mock.record(1, "A"), false, 16 * 1024)
        .await
        .unwrap();

    assert!(outcome.total_bytes > 0);
}

#[tokio::test]
async fn test_download_error_status_is_not_counted() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/garbage.php"))
        .respond_with(ResponseTemplate::new(404).set_body_bytes(vec![1u8; 1024]))
        .mount(&mock.server)
        .await;

    let driver = TransferDriver::new(transfer_config(1, 1), Logger::quiet("XFER"));
    let outcome = driver.download(&http_client(), &mock.record(1, "A"), 4).await.unwrap();

    assert_eq!(outcome.total_bytes, 0);
}

#[tokio::test]
async fn test_selector_picks_lowest_latency() {
    let slow = MockSpeedServer::new().await;
    let fast = MockSpeedServer::new().await;
    let medium = MockSpeedServer::new().await;
    slow.mock_ping(Some(Duration::from_millis(50))).await;
    fast.mock_ping(Some(Duration::from_millis(10))).await;
    medium.mock_ping(Some(Duration::from_millis(30))).await;

    let mut unreachable = slow.record(4, "D");
    unreachable.server = "http://127.0.0.1:1/".to_string();

    let servers = vec![
        slow.record(1, "A"),
        fast.record(2, "B"),
        medium.record(3, "C"),
        unreachable,
    ];

    let client = http_client();
    let prober = HttpProber::new(
        SpeedtestClient::new(client.clone(), Logger::quiet("APP")),
        probe(client),
        true,
    );
    let selection = EndpointSelector::new(prober, Logger::quiet("SELECT"))
        .select_fastest(&servers)
        .await
        .unwrap();

    assert_eq!(selection.index, 1);
    assert_eq!(selection.responsive, 3);
    assert!(selection.ping_ms.unwrap() >= 10.0);
}

#[tokio::test]
async fn test_is_up_requires_200() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/empty.php"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock.server)
        .await;

    let client = SpeedtestClient::new(http_client(), Logger::quiet("APP"));
    let mut server = mock.record(1, "A");
    assert!(!client.is_up(&mut server).await);

    mock.server.reset().await;
    mock.mock_ping(None).await;
    assert!(client.is_up(&mut server).await);
}

#[tokio::test]
async fn test_ip_info_json_and_plain_text() {
    let mock = MockSpeedServer::new().await;
    mock.mock_ip_info().await;

    let client = SpeedtestClient::new(http_client(), Logger::quiet("APP"));
    let mut server = mock.record(1, "A");
    let info = client.ip_info(&mut server, "km").await.unwrap();
    assert_eq!(info.processed_string, "198.51.100.7 - Example ISP");
    assert_eq!(info.raw_isp_info.ip, "198.51.100.7");
    assert_eq!(info.raw_isp_info.organization, "Example ISP");

    mock.server.reset().await;
    Mock::given(method("GET"))
        .and(path("/getIP.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.9"))
        .mount(&mock.server)
        .await;
    let info = client.ip_info(&mut server, "km").await.unwrap();
    assert_eq!(info.processed_string, "203.0.113.9");
    assert_eq!(info.raw_isp_info.ip, "");
}

#[tokio::test]
async fn test_telemetry_returns_share_link() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("POST"))
        .and(path("/results/telemetry.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id abc123\n"))
        .expect(1)
        .mount(&mock.server)
        .await;

    let settings = TelemetrySettings {
        level: TelemetryLevel::Basic,
        server: mock.url(),
        ..Default::default()
    };
    let ip_info = IpInfo::default();
    let report = TelemetryReport {
        ip_info: &ip_info,
        download_mbps: 93.5,
        upload_mbps: 20.25,
        ping_ms: 12.7,
        jitter_ms: 1.2,
        log: String::new(),
        extra: TelemetryExtra {
            server_name: "A".to_string(),
            extra: String::new(),
        },
    };

    let link = send_telemetry(&http_client(), &settings, report).await.unwrap();
    assert_eq!(link, format!("{}/results/?id=abc123", mock.url()));

    let received = mock.server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains("name=\"dl\""));
    assert!(body.contains("93.50"));
    assert!(body.contains("name=\"ispinfo\""));
}

#[tokio::test]
async fn test_server_list_retries_well_known_path() {
    let mock = MockSpeedServer::new().await;
    Mock::given(method("GET"))
        .and(path("/list.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list.json/.well-known/librespeed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"id":1,"name":"A","server":"//a.example.com/","dlURL":"garbage.php","ulURL":"empty.php","pingURL":"empty.php","getIpURL":"getIP.php"},
                {"id":2,"name":"B","server":"https://b.example.com/","dlURL":"garbage.php","ulURL":"empty.php","pingURL":"empty.php","getIpURL":"getIP.php"}]"#,
        ))
        .mount(&mock.server)
        .await;

    let filter = ServerFilter {
        exclude: vec![2],
        apply: true,
        ..Default::default()
    };
    let servers = fetch_server_list(
        &http_client(),
        &format!("{}/list.json", mock.url()),
        &filter,
        &Logger::quiet("APP"),
    )
    .await
    .unwrap();

    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].server, "http://a.example.com/");
}

fn local_list(servers: &[Server]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", serde_json::to_string(servers).unwrap()).unwrap();
    file
}

fn run_config(list: &NamedTempFile, ids: Vec<i64>) -> Config {
    Config {
        local_json: Some(list.path().to_string_lossy().to_string()),
        server_ids: ids,
        concurrency: 1,
        duration_secs: 1,
        chunks: 4,
        upload_size_kib: 16,
        ping_count: 3,
        no_icmp: true,
        output: OutputMode::Json,
        enable_color: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_orchestrator_full_run_skips_down_server() {
    let mock = MockSpeedServer::new().await;
    mock.mock_all().await;

    let mut down = mock.record(2, "Down");
    down.server = "http://127.0.0.1:1/".to_string();
    let list = local_list(&[mock.record(1, "Mock"), down]);

    let orchestrator = TestOrchestrator::new(run_config(&list, vec![1, 2])).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    assert_eq!(servers.len(), 2);

    let targets = orchestrator.choose_servers(servers).await.unwrap();
    let results = orchestrator.run_tests(targets).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.server_name, "Mock");
    assert_eq!(result.client.ip, "198.51.100.7");
    assert!(result.latency.avg_ms > 0.0);
    assert!(result.bytes_received() > 0);
    assert!(result.bytes_sent() > 0);
    assert!(result.share_link.is_none());
}

#[tokio::test]
async fn test_orchestrator_selects_when_no_ids_given() {
    let mock = MockSpeedServer::new().await;
    mock.mock_all().await;

    let mut down = mock.record(2, "Down");
    down.server = "http://127.0.0.1:1/".to_string();
    let list = local_list(&[down, mock.record(1, "Mock")]);

    let mut config = run_config(&list, Vec::new());
    config.no_download = true;
    config.no_upload = true;

    let orchestrator = TestOrchestrator::new(config).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    let targets = orchestrator.choose_servers(servers).await.unwrap();

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "Mock");
}

#[tokio::test]
async fn test_orchestrator_no_responsive_server_is_fatal() {
    let mock = MockSpeedServer::new().await;
    let mut down = mock.record(1, "Down");
    down.server = "http://127.0.0.1:1/".to_string();
    let list = local_list(&[down]);

    let orchestrator = TestOrchestrator::new(run_config(&list, Vec::new())).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    let err = orchestrator.choose_servers(servers).await.unwrap_err();

    assert!(matches!(err, AppError::Unreachable(_)));
}

#[tokio::test]
async fn test_orchestrator_telemetry_failure_does_not_fail_run() {
    let mock = MockSpeedServer::new().await;
    mock.mock_all().await;
    Mock::given(method("POST"))
        .and(path("/results/telemetry.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("unexpected"))
        .expect(1)
        .mount(&mock.server)
        .await;

    let list = local_list(&[mock.record(1, "Mock")]);
    let mut config = run_config(&list, vec![1]);
    config.no_download = true;
    config.no_upload = true;
    config.telemetry = TelemetrySettings {
        level: TelemetryLevel::Basic,
        server: mock.url(),
        ..Default::default()
    };

    let orchestrator = TestOrchestrator::new(config).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    let results = orchestrator.run_tests(servers).await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].share_link.is_none());
    assert!(results[0].download.is_none());
}

#[tokio::test]
async fn test_orchestrator_failed_server_does_not_stop_run() {
    let good = MockSpeedServer::new().await;
    good.mock_all().await;

    // Up, but its IP-info reply outlives the request timeout
    let slow = MockSpeedServer::new().await;
    slow.mock_ping(None).await;
    Mock::given(method("GET"))
        .and(path("/getIP.php"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&slow.server)
        .await;

    let list = local_list(&[slow.record(1, "Slow"), good.record(2, "Mock")]);
    let mut config = run_config(&list, vec![1, 2]);
    config.timeout_secs = 1;
    config.no_download = true;
    config.no_upload = true;

    let orchestrator = TestOrchestrator::new(config.clone()).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    let results = orchestrator.run_tests(servers).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].server_name, "Mock");

    config.server_ids = vec![1];
    let orchestrator = TestOrchestrator::new(config).await.unwrap();
    let servers = orchestrator.load_servers().await.unwrap();
    let err = orchestrator.run_tests(servers).await.unwrap_err();
    assert!(matches!(err, AppError::TestExecution(_)));
    assert_eq!(err.exit_code(), 6);
}
