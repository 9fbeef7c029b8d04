use std::path::PathBuf;

use clap::Parser;
use streambridge::prelude::*;
use tokio::task::LocalSet;

const DEFAULT_CONFIG: &str = "demos/stream-echo/streambridge.json";

// CLI
#[derive(Parser)]
#[command(name = "stream-echo")]
#[command(version)]
#[command(about = "Scripted echo server over TCP and UDP")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BridgeError> {
    let cli = Cli::parse();
    let config = ServerConfig::from_json_file(&cli.config)?;
    init_logging(&config.log)?;

    let server = StreamBridgeBuilder::new(config).build().await?;
    for addr in server.local_addrs()? {
        tracing::info!(%addr, "listening");
    }

    LocalSet::new().run_until(server.run()).await
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;

    const ECHO: &str = include_str!("../scripts/echo.lua");
    const LISTEN: &str = include_str!("../scripts/listen.lua");

    fn engine() -> (ScriptEngine, Arc<MemorySink>) {
        let sink = MemorySink::new();
        let engine = ScriptEngine::new(sink.clone(), ContextConfig::default()).unwrap();
        (engine, sink)
    }

    fn session(engine: &ScriptEngine, payload: &str) -> SessionId {
        let session = engine.open_session().unwrap();
        engine
            .set_context_value(session, "payload", payload.into())
            .unwrap();
        engine
            .set_context_value(session, "peer", "127.0.0.1:50000".into())
            .unwrap();
        session
    }

    #[test]
    fn test_cli_config_path_defaults_and_overrides() {
        let cli = Cli::try_parse_from(["stream-echo"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));

        let cli = Cli::try_parse_from(["stream-echo", "other.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("other.json"));
    }

    #[test]
    fn test_echo_replies_with_payload() {
        let (engine, sink) = engine();
        let handler = engine.compile("echo", ECHO).unwrap();
        let id = session(&engine, "hello");

        let status = engine.run_session(id, &handler).unwrap();

        assert_eq!(status, Status::Ok);
        let reply = engine.context_value(id, "reply");
        assert_eq!(reply.as_ref().and_then(|v| v.as_str()), Some("hello"));
        assert_eq!(sink.messages(), vec!["127.0.0.1:50000 sent 5 bytes".to_string()]);
    }

    #[test]
    fn test_echo_declines_empty_payload() {
        let (engine, sink) = engine();
        let handler = engine.compile("echo", ECHO).unwrap();
        let id = session(&engine, "");

        assert_eq!(engine.run_session(id, &handler).unwrap(), Status::Declined);
        assert!(engine.context_value(id, "reply").is_none());
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_echo_counts_served_sessions_on_teardown() {
        let (engine, _) = engine();
        let handler = engine.compile("echo", ECHO).unwrap();

        for _ in 0..3 {
            let id = session(&engine, "x");
            engine.run_session(id, &handler).unwrap();
            engine.teardown_session(id);
        }

        let served: i64 = engine.lua().globals().get("served").unwrap();
        assert_eq!(served, 3);
    }

    #[test]
    fn test_listen_script_registers_tcp_and_udp() {
        let (engine, _) = engine();
        let pass = ConfigPass::new(ServerBlock::new("echo"), ListenerSet::new(), Rc::new(SystemResolver));

        let (server, listeners) = engine.configure(pass, LISTEN).unwrap().into_parts();

        assert!(server.has_listen);
        assert_eq!(listeners.len(), 2);
        assert_eq!(listeners.endpoints()[0].protocol(), Protocol::Stream);
        assert!(listeners.endpoints()[0].options.keepalive);
    }
}
