use approx::assert_relative_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use phone_telemetry_rs::config::{ChannelConfig, ClientConfig};
use phone_telemetry_rs::input::{CommandPrompt, LinePump, ScriptedLines};
use phone_telemetry_rs::{
    PositionIntegrator, SharedIntegrator, StopFlag, TelemetryClient, TelemetryService,
};

struct Server {
    port: u16,
    service: Arc<TelemetryService>,
    handle: JoinHandle<()>,
}

/// Run a server on an ephemeral port whose operator types `script`, then
/// closes the input.
async fn start_server(script: &[&str]) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let operator = LinePump::spawn(ScriptedLines::new(script.to_vec()), "operator-script").unwrap();
    let service = Arc::new(TelemetryService::new(
        CommandPrompt::new(operator),
        StopFlag::new(),
        Duration::from_secs(5),
    ));
    let handle = tokio::spawn(service.clone().serve(listener, 4));
    Server {
        port,
        service,
        handle,
    }
}

fn client(port: u16, equation: &str) -> TelemetryClient {
    let integrator = SharedIntegrator::new(PositionIntegrator::with_equation(equation).unwrap());
    TelemetryClient::new(
        "e2e-user",
        integrator,
        StopFlag::new(),
        ChannelConfig {
            port,
            ..ChannelConfig::default()
        },
        &ClientConfig::default(),
    )
    .with_pacing(Duration::from_millis(5))
    .with_idle(Duration::from_millis(5), Duration::from_millis(100))
}

async fn run(client: &TelemetryClient) {
    tokio::time::timeout(Duration::from_secs(5), client.run())
        .await
        .expect("client session did not finish")
        .expect("client session failed");
}

#[tokio::test]
async fn test_start_command_drives_one_burst() {
    let server = start_server(&["start 2"]).await;
    let client = client(server.port, "1");

    run(&client).await;

    assert_eq!(client.integrator().samples(), 2);
    assert_eq!(client.integrator().position(), (2.0, 2.0));

    tokio::time::timeout(Duration::from_secs(1), server.handle)
        .await
        .unwrap()
        .unwrap();
    let stats = server.service.stats();
    assert_eq!(stats.calls, 2);
    // handshake plus the burst
    assert_eq!(stats.samples, 3);
    assert!(server.service.stop_flag().is_set());
}

#[tokio::test]
async fn test_repeated_get_one_accumulates_position() {
    let server = start_server(&["get_one", "GET_ONE"]).await;
    let client = client(server.port, "0.5");

    run(&client).await;

    let (latitude, longitude) = client.integrator().position();
    assert_relative_eq!(latitude, 1.0);
    assert_relative_eq!(longitude, 1.0);
    assert_eq!(client.integrator().samples(), 2);
    assert_eq!(server.service.stats().calls, 3);
}

#[tokio::test]
async fn test_malformed_operator_text_is_skipped() {
    let server = start_server(&["fly away", "start", "start 1"]).await;
    let client = client(server.port, "x - x + 3");

    run(&client).await;

    assert_eq!(client.integrator().samples(), 1);
    assert_relative_eq!(client.integrator().position().0, 3.0);
}

#[tokio::test]
async fn test_start_zero_sends_empty_call() {
    let server = start_server(&["start 0", "get_one"]).await;
    let client = client(server.port, "1");

    run(&client).await;

    // the empty call still gets the next command
    assert_eq!(client.integrator().samples(), 1);
    assert_eq!(server.service.stats().calls, 3);
}

#[tokio::test]
async fn test_server_stop_before_any_command() {
    let server = start_server(&[]).await;
    let client = client(server.port, "1");

    run(&client).await;

    assert_eq!(client.integrator().samples(), 0);
    assert_eq!(server.service.stats().samples, 1);
}
