//! Replay Endpoint Integration Tests
//!
//! Runs the real TLS listener on an ephemeral loopback port and drives it
//! with a rustls WebSocket client that trusts the generated certificate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use historical_alpaca_ws_endpoint::{
    BarSource, BarSourceError, CertificateMaterial, CertificateProvisioner, CsvBarSource,
    RcgenGenerator, ReplayServer, ServerError, ServerSettings, SessionStats,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

const THREE_AAPL_ROWS: &str = "\
symbol,timestamp,open,high,low,close,volume,trade_count,vwap
AAPL,2024-01-02T14:30:00+00:00,187.15,188.44,186.9,188.1,1523400,10234,187.8
AAPL,2024-01-02T14:31:00+00:00,188.1,188.2,187.5,187.6,833100,6120,187.9
AAPL,2024-01-02T14:32:00+00:00,187.6,187.99,187.4,187.95,712900,5011,187.7
";

struct Harness {
    addr: SocketAddr,
    shutdown: CancellationToken,
    stats: Arc<SessionStats>,
    server: JoinHandle<Result<(), ServerError>>,
    material: CertificateMaterial,
    _dir: tempfile::TempDir,
}

fn write_csv(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("bars.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

async fn start(csv: &str, delay: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let bars = CsvBarSource::new(write_csv(&dir, csv)).load().unwrap();

    let material = CertificateMaterial::in_dir(dir.path());
    let acceptor = CertificateProvisioner::new(Arc::new(RcgenGenerator::new()))
        .ensure(&material)
        .await
        .unwrap();

    let settings = ServerSettings {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        delay,
        shutdown_timeout: Duration::from_secs(5),
        close_timeout: Duration::from_secs(1),
    };
    let shutdown = CancellationToken::new();
    let stats = Arc::new(SessionStats::new());
    let server = ReplayServer::bind(&settings, acceptor, bars, Arc::clone(&stats), shutdown.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    Harness {
        addr,
        shutdown,
        stats,
        server: tokio::spawn(server.run()),
        material,
        _dir: dir,
    }
}

fn client_config(material: &CertificateMaterial) -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots
        .add(CertificateDer::from_pem_file(material.cert_path()).unwrap())
        .unwrap();

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots)
    .with_no_client_auth();
    Arc::new(config)
}

async fn connect(harness: &Harness) -> Client {
    let tcp = TcpStream::connect(harness.addr).await.unwrap();
    let url = format!("wss://localhost:{}/", harness.addr.port());
    let connector = Connector::Rustls(client_config(&harness.material));
    let (ws, _response) =
        tokio_tungstenite::client_async_tls_with_config(url, tcp, None, Some(connector))
            .await
            .unwrap();
    ws
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Drain until the server closes; returns the close code and any text
/// frames that arrived first.
async fn until_closed(client: &mut Client) -> (Option<CloseCode>, Vec<String>) {
    let mut texts = Vec::new();
    loop {
        match timeout(WAIT, client.next()).await.expect("server never closed") {
            Some(Ok(Message::Close(frame))) => return (frame.map(|f| f.code), texts),
            Some(Ok(Message::Text(text))) => texts.push(text.as_str().to_string()),
            Some(Ok(_)) => {}
            None | Some(Err(_)) => return (None, texts),
        }
    }
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::text(value.to_string())).await.unwrap();
}

async fn handshake(client: &mut Client, symbol: &str) {
    assert_eq!(
        next_json(client).await,
        json!([{"T": "success", "msg": "connected"}])
    );
    send(client, json!({"action": "auth", "key": "k", "secret": "s"})).await;
    assert_eq!(
        next_json(client).await,
        json!([{"T": "success", "msg": "authenticated"}])
    );
    send(client, json!({"action": "subscribe", "bars": [symbol]})).await;
}

async fn stop(harness: Harness) {
    harness.shutdown.cancel();
    timeout(WAIT, harness.server)
        .await
        .expect("server did not drain")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn replays_three_bars_in_order_then_closes() {
    let harness = start(THREE_AAPL_ROWS, Duration::ZERO).await;
    let mut client = connect(&harness).await;

    handshake(&mut client, "AAPL").await;
    assert_eq!(
        next_json(&mut client).await,
        json!([{
            "T": "subscription",
            "bars": ["AAPL"],
            "trades": [],
            "quotes": [],
            "updatedBars": [],
            "dailyBars": [],
            "statuses": [],
            "lulds": [],
            "corrections": [],
            "cancelErrors": []
        }])
    );

    let expected_opens = [187.15, 188.1, 187.6];
    let expected_times = [
        "2024-01-02T14:30:00Z",
        "2024-01-02T14:31:00Z",
        "2024-01-02T14:32:00Z",
    ];
    for (open, time) in expected_opens.iter().zip(expected_times) {
        let message = next_json(&mut client).await;
        let bars = message.as_array().unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0]["T"], "b");
        assert_eq!(bars[0]["S"], "AAPL");
        assert_eq!(bars[0]["o"], *open);
        assert_eq!(bars[0]["t"], time);
    }

    let (code, extra) = until_closed(&mut client).await;
    assert_eq!(code, Some(CloseCode::Normal));
    assert!(extra.is_empty(), "no frames after the last bar: {extra:?}");

    stop(harness).await;
}

#[tokio::test]
async fn each_connection_starts_from_the_first_bar() {
    let harness = start(THREE_AAPL_ROWS, Duration::ZERO).await;

    for _ in 0..2 {
        let mut client = connect(&harness).await;
        handshake(&mut client, "AAPL").await;
        let _subscription = next_json(&mut client).await;
        let first = next_json(&mut client).await;
        assert_eq!(first[0]["o"], 187.15);
        let _ = until_closed(&mut client).await;
    }

    assert_eq!(harness.stats.snapshot().bars_sent, 6);
    stop(harness).await;
}

#[tokio::test]
async fn auth_without_secret_closes_without_reply() {
    let harness = start(THREE_AAPL_ROWS, Duration::ZERO).await;
    let mut client = connect(&harness).await;

    let _connected = next_json(&mut client).await;
    send(&mut client, json!({"action": "auth", "key": "k"})).await;

    let (code, texts) = until_closed(&mut client).await;
    assert_eq!(code, Some(CloseCode::Policy));
    assert!(texts.is_empty());

    stop(harness).await;
}

#[tokio::test]
async fn subscribing_to_another_symbol_is_rejected() {
    let harness = start(THREE_AAPL_ROWS, Duration::ZERO).await;
    let mut client = connect(&harness).await;

    handshake(&mut client, "MSFT").await;

    let (code, texts) = until_closed(&mut client).await;
    assert_eq!(code, Some(CloseCode::Policy));
    assert!(texts.is_empty(), "no subscription or bars: {texts:?}");

    stop(harness).await;
}

#[tokio::test]
async fn shutdown_closes_streaming_sessions_with_going_away() {
    let harness = start(THREE_AAPL_ROWS, Duration::from_secs(60)).await;
    let mut client = connect(&harness).await;

    handshake(&mut client, "AAPL").await;
    let _subscription = next_json(&mut client).await;
    let first = next_json(&mut client).await;
    assert_eq!(first[0]["S"], "AAPL");

    harness.shutdown.cancel();
    let (code, texts) = until_closed(&mut client).await;
    assert_eq!(code, Some(CloseCode::Away));
    assert!(texts.is_empty());

    timeout(WAIT, harness.server)
        .await
        .expect("server did not drain")
        .unwrap()
        .unwrap();
    assert_eq!(harness.stats.active(), 0);
}

#[tokio::test]
async fn unparseable_timestamp_streams_as_null() {
    let csv = "\
symbol,timestamp,open,high,low,close,volume,trade_count,vwap
AAPL,not-a-date,1.0,2.0,0.5,1.5,100,3,1.2
";
    let harness = start(csv, Duration::ZERO).await;
    let mut client = connect(&harness).await;

    handshake(&mut client, "AAPL").await;
    let _subscription = next_json(&mut client).await;
    let bar = next_json(&mut client).await;
    assert_eq!(bar[0]["t"], Value::Null);
    assert_eq!(bar[0]["c"], 1.5);

    stop(harness).await;
}

#[tokio::test]
async fn certificate_files_are_removed_when_material_drops() {
    let harness = start(THREE_AAPL_ROWS, Duration::ZERO).await;
    let key = harness.material.key_path().to_path_buf();
    let cert = harness.material.cert_path().to_path_buf();
    assert!(key.exists() && cert.exists());

    let Harness {
        shutdown,
        server,
        material,
        _dir,
        ..
    } = harness;
    shutdown.cancel();
    server.await.unwrap().unwrap();
    drop(material);

    assert!(!key.exists());
    assert!(!cert.exists());
}

#[test]
fn missing_input_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = CsvBarSource::new(dir.path().join("absent.csv"))
        .load()
        .unwrap_err();
    assert!(matches!(err, BarSourceError::NotFound(_)));
}
