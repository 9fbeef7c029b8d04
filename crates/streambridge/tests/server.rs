//! Integration tests for the server: configuration scripts, binding, and
//! full sessions over real sockets.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use streambridge::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::LocalSet;

// =========================================================================
// Helpers
// =========================================================================

const ECHO_SESSION: &str = r#"
    local payload = stream.ctx_get("payload")
    stream.log(stream.LOG_INFO, "got " .. payload)
    stream.ctx_set("reply", payload)
    stream.on_teardown(function(id) torn_down = (torn_down or 0) + 1 end)
    return stream.OK
"#;

fn config(config_script: Option<&str>, default_listen: Option<&str>) -> ServerConfig {
    ServerConfig {
        servers: vec![ServerSection {
            name: "echo".into(),
            config_script: config_script.map(|s| ScriptSource::Inline(s.into())),
            session_script: ScriptSource::Inline(ECHO_SESSION.into()),
            default_listen: default_listen.map(str::to_string),
        }],
        ..ServerConfig::default()
    }
}

/// Builds a server and starts it on the current `LocalSet`.
async fn start(config: ServerConfig, sink: Arc<MemorySink>) -> (Vec<std::net::SocketAddr>, Rc<ScriptEngine>) {
    let server = StreamBridgeBuilder::new(config)
        .sink(sink)
        .build()
        .await
        .expect("server should build");
    let addrs = server.local_addrs().expect("should have local addrs");
    let engine = server.engine();

    tokio::task::spawn_local(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addrs, engine)
}

/// Waits until every session has been torn down.
async fn wait_for_teardown(engine: &ScriptEngine) {
    for _ in 0..200 {
        if engine.contexts().live_sessions() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sessions were never torn down");
}

fn torn_down(engine: &ScriptEngine) -> i64 {
    engine
        .lua()
        .globals()
        .get::<Option<i64>>("torn_down")
        .unwrap()
        .unwrap_or(0)
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_stream_session_runs_handler_and_tears_down() {
    LocalSet::new()
        .run_until(async {
            let sink = MemorySink::new();
            let (addrs, engine) = start(
                config(Some("stream.add_listener({ address = '127.0.0.1:0' })"), None),
                sink.clone(),
            )
            .await;
            assert_eq!(addrs.len(), 1);

            let mut client = TcpStream::connect(addrs[0]).await.expect("should connect");
            client.write_all(b"ping").await.unwrap();
            let mut reply = Vec::new();
            client.read_to_end(&mut reply).await.unwrap();
            assert_eq!(reply, b"ping");

            wait_for_teardown(&engine).await;
            assert_eq!(torn_down(&engine), 1);
            assert_eq!(engine.contexts().allocated(), 0);

            let records = sink.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].message, "got ping");
            assert_eq!(records[0].level, Severity::Info.code());
            assert!(records[0].session.is_some());
        })
        .await;
}

#[tokio::test]
async fn test_stream_sessions_do_not_share_state() {
    LocalSet::new()
        .run_until(async {
            let sink = MemorySink::new();
            let mut config = config(Some("stream.add_listener({ address = '127.0.0.1:0' })"), None);
            config.servers[0].session_script = ScriptSource::Inline(
                r#"
                local seen = stream.ctx_get("seen")
                stream.ctx_set("seen", true)
                stream.ctx_set("reply", seen and "stale" or "fresh")
                "#
                .into(),
            );
            let (addrs, engine) = start(config, sink).await;

            for _ in 0..2 {
                let mut client = TcpStream::connect(addrs[0]).await.unwrap();
                client.write_all(b"x").await.unwrap();
                let mut reply = String::new();
                client.read_to_string(&mut reply).await.unwrap();
                assert_eq!(reply, "fresh");
            }
            wait_for_teardown(&engine).await;
        })
        .await;
}

#[tokio::test]
async fn test_handler_error_still_tears_down() {
    LocalSet::new()
        .run_until(async {
            let sink = MemorySink::new();
            let mut config = config(Some("stream.add_listener({ address = '127.0.0.1:0' })"), None);
            config.servers[0].session_script = ScriptSource::Inline(
                "stream.on_teardown(function() torn_down = 1 end); error('boom')".into(),
            );
            let (addrs, engine) = start(config, sink).await;

            let mut client = TcpStream::connect(addrs[0]).await.unwrap();
            client.write_all(b"x").await.unwrap();
            let mut reply = Vec::new();
            let _ = client.read_to_end(&mut reply).await;
            assert!(reply.is_empty());

            wait_for_teardown(&engine).await;
            assert_eq!(torn_down(&engine), 1);
        })
        .await;
}

#[tokio::test]
async fn test_silent_client_is_disconnected() {
    LocalSet::new()
        .run_until(async {
            let sink = MemorySink::new();
            let mut config = config(Some("stream.add_listener({ address = '127.0.0.1:0' })"), None);
            config.read_timeout_ms = 100;
            let (addrs, engine) = start(config, sink.clone()).await;

            let mut client = TcpStream::connect(addrs[0]).await.unwrap();
            let mut buf = [0u8; 16];
            let closed = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
                .await
                .expect("server should close a silent connection");
            assert!(matches!(closed, Ok(0) | Err(_)));

            // The handler never ran and nothing was left open.
            assert_eq!(engine.contexts().live_sessions(), 0);
            assert_eq!(torn_down(&engine), 0);
            assert!(sink.records().is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_datagram_session_replies_to_sender() {
    if !streambridge::transport::DATAGRAM_SUPPORTED {
        return;
    }
    LocalSet::new()
        .run_until(async {
            let sink = MemorySink::new();
            let (addrs, engine) = start(
                config(
                    Some("stream.add_listener({ address = '127.0.0.1:0', udp = true })"),
                    None,
                ),
                sink.clone(),
            )
            .await;

            let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            client.send_to(b"hello", addrs[0]).await.unwrap();
            let mut buf = [0u8; 64];
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
                .await
                .expect("reply should arrive")
                .unwrap();
            assert_eq!(&buf[..n], b"hello");

            wait_for_teardown(&engine).await;
            assert_eq!(torn_down(&engine), 1);
            assert_eq!(sink.messages(), vec!["got hello".to_string()]);
        })
        .await;
}

// =========================================================================
// Configuration
// =========================================================================

#[tokio::test]
async fn test_default_listen_used_without_config_script() {
    let server = StreamBridgeBuilder::new(config(None, Some("127.0.0.1:0")))
        .build()
        .await
        .expect("server should build");
    assert_eq!(server.local_addrs().unwrap().len(), 1);
}

#[tokio::test]
async fn test_default_listen_skipped_when_script_adds_listener() {
    let server = StreamBridgeBuilder::new(config(
        Some("stream.add_listener({ address = '127.0.0.1:0' })"),
        Some("127.0.0.2:0"),
    ))
    .build()
    .await
    .expect("server should build");

    let addrs = server.local_addrs().unwrap();
    assert_eq!(addrs.len(), 1);
    assert_eq!(addrs[0].ip().to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_unresolvable_listener_aborts_startup() {
    let result = StreamBridgeBuilder::new(config(
        Some("stream.add_listener({ address = 'not-an-address' })"),
        None,
    ))
    .build()
    .await;

    let Err(err) = result else {
        panic!("startup should fail");
    };
    assert!(matches!(
        err,
        BridgeError::Config(ConfigFatal::Listen {
            source: ListenError::Resolve { .. },
            ..
        })
    ));
    assert!(err.to_string().contains("not-an-address"));
}

#[tokio::test]
async fn test_udp_with_ssl_aborts_startup() {
    if !streambridge::transport::DATAGRAM_SUPPORTED {
        return;
    }
    let result = StreamBridgeBuilder::new(config(
        Some("stream.add_listener({ address = '127.0.0.1:0', udp = true, ssl = true })"),
        None,
    ))
    .build()
    .await;

    assert!(matches!(
        result,
        Err(BridgeError::Config(ConfigFatal::Listen {
            source: ListenError::Incompatible("ssl"),
            ..
        }))
    ));
}

#[tokio::test]
async fn test_tls_listener_refused_at_bind() {
    let result = StreamBridgeBuilder::new(config(
        Some("stream.add_listener({ address = '127.0.0.1:0', ssl = true })"),
        None,
    ))
    .build()
    .await;

    assert!(matches!(
        result,
        Err(BridgeError::Transport(TransportError::Unsupported { option: "ssl", .. }))
    ));
}

#[tokio::test]
async fn test_duplicate_server_name_aborts_startup() {
    let mut config = config(None, Some("127.0.0.1:0"));
    config.servers.push(config.servers[0].clone());

    let result = StreamBridgeBuilder::new(config).build().await;
    assert!(matches!(result, Err(BridgeError::Config(ConfigFatal::Load { .. }))));
}

#[tokio::test]
async fn test_session_script_syntax_error_aborts_startup() {
    let mut config = config(None, Some("127.0.0.1:0"));
    config.servers[0].session_script = ScriptSource::Inline("this is not lua".into());

    let result = StreamBridgeBuilder::new(config).build().await;
    assert!(matches!(result, Err(BridgeError::Config(ConfigFatal::Script { .. }))));
}
