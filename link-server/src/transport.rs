//! Newline-delimited JSON-RPC transport
//!
//! Every line read is one JSON-RPC message from the peer. Requests are
//! handed to the session by a single forwarding task, in the order they were
//! read; only the wait for each completion runs on its own task, so a slow
//! completion never holds up the next line. Responses, notifications and the
//! session's own requests are written back one JSON document per line. End
//! of input disposes the session.

use anyhow::Context;
use link_session::rpc::{encode_outbound, Request, Response};
use link_session::{Outbound, PendingRequests, RpcError, RpcMessage, SessionHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

async fn write_message<W>(output: &mut W, message: &RpcMessage) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.to_json().context("Failed to encode message")?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .context("Failed to write message")?;
    output.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Hand `request` to the session and queue its response once completed
async fn submit_call(
    session: &SessionHandle,
    request: Request,
    responses: mpsc::UnboundedSender<Response>,
) {
    let Request {
        id, method, params, ..
    } = request;
    let submitted = session.submit(&method, params).await;
    tokio::spawn(async move {
        let result = match submitted {
            Ok(call) => call.completion().await,
            Err(e) => Err(e),
        };
        let _ = responses.send(Response::new(id, result.map_err(|e| RpcError::from(&e))));
    });
}

/// Start the task handing requests to the session one at a time
fn spawn_forwarder(
    session: SessionHandle,
    responses: mpsc::UnboundedSender<Response>,
) -> mpsc::UnboundedSender<Request> {
    let (requests_tx, mut requests_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(request) = requests_rx.recv().await {
            submit_call(&session, request, responses.clone()).await;
        }
    });
    requests_tx
}

/// Serve one session over `input` and `output` until end of input
pub async fn serve<R, W>(
    session: SessionHandle,
    mut outbound: mpsc::Receiver<Outbound>,
    input: R,
    mut output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut pending = PendingRequests::new();
    let (responses_tx, mut responses_rx) = mpsc::unbounded_channel();
    let requests = spawn_forwarder(session.clone(), responses_tx);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    info!("Input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match RpcMessage::parse(line) {
                    Ok(RpcMessage::Request(request)) => {
                        debug!("Request {} ({})", request.method, request.id);
                        let _ = requests.send(request);
                    }
                    Ok(RpcMessage::Response(response)) => {
                        pending.resolve(response);
                    }
                    Ok(RpcMessage::Notification(notification)) => {
                        debug!("Ignoring notification {} from peer", notification.method);
                    }
                    Err(error) => {
                        warn!("Rejecting input line: {}", error);
                        let response = Response::new(serde_json::Value::Null, Err(error));
                        write_message(&mut output, &RpcMessage::Response(response)).await?;
                    }
                }
            }

            Some(response) = responses_rx.recv() => {
                write_message(&mut output, &RpcMessage::Response(response)).await?;
            }

            message = outbound.recv() => {
                let Some(message) = message else {
                    info!("Session stopped");
                    break;
                };
                let message = encode_outbound(message, &mut pending);
                write_message(&mut output, &message).await?;
            }
        }
    }

    // Nobody drains outbound from here on
    drop(requests);
    drop(outbound);
    session.dispose().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use link_detect::usb_ids::{arduino, ch340};
    use link_session::{SessionBackend, SessionConfig};
    use link_sim::{ScriptedToolchain, VirtualBus};
    use serde_json::{json, Value};
    use tokio::io::{duplex, BufReader, DuplexStream, Lines};

    const PORT: &str = "/dev/ttySIM0";

    struct Peer {
        writer: DuplexStream,
        reader: Lines<BufReader<DuplexStream>>,
    }

    impl Peer {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(2), self.reader.next_line())
                .await
                .expect("timed out waiting for output")
                .unwrap()
                .expect("output closed");
            serde_json::from_str(&line).unwrap()
        }
    }

    fn start() -> (Peer, VirtualBus, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let bus = VirtualBus::new();
        bus.attach_loopback(PORT, arduino::UNO);
        let backend = SessionBackend {
            enumerator: Arc::new(bus.clone()),
            driver: Arc::new(bus.clone()),
            toolchain: Arc::new(ScriptedToolchain::new()),
        };
        let config = SessionConfig {
            discovery_period: Duration::from_millis(5),
            watchdog_period: Duration::from_millis(2),
            ..SessionConfig::default()
        };
        let (session, outbound) = SessionHandle::spawn(backend, config);

        let (peer_out, server_in) = duplex(4096);
        let (server_out, peer_in) = duplex(4096);
        let server = tokio::spawn(serve(session, outbound, BufReader::new(server_in), server_out));

        let peer = Peer {
            writer: peer_out,
            reader: BufReader::new(peer_in).lines(),
        };
        (peer, bus, server)
    }

    #[tokio::test]
    async fn test_request_response() {
        let (mut peer, _bus, _server) = start();
        peer.send(r#"{"jsonrpc":"2.0","id":7,"method":"getServices","params":{}}"#)
            .await;
        assert_eq!(peer.recv().await, json!({ "jsonrpc": "2.0", "id": 7, "result": [] }));

        peer.send(r#"{"jsonrpc":"2.0","id":"a","method":"fly"}"#).await;
        let response = peer.recv().await;
        assert_eq!(response["id"], "a");
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["data"]["kind"], "MethodNotFound");
    }

    #[tokio::test]
    async fn test_unparseable_line_gets_error_response() {
        let (mut peer, _bus, _server) = start();
        peer.send("{ not json").await;
        let response = peer.recv().await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], -32700);

        // Still serving
        peer.send(r#"{"jsonrpc":"2.0","id":1,"method":"pingMe"}"#).await;
        let mut seen = vec![peer.recv().await, peer.recv().await];
        seen.sort_by_key(|v| v.get("method").is_some());
        assert_eq!(seen[0], json!({ "jsonrpc": "2.0", "id": 1, "result": "willPing" }));
        assert_eq!(seen[1]["method"], "ping");
        assert_eq!(seen[1]["id"], 1);

        peer.send(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#).await;
    }

    #[tokio::test]
    async fn test_notifications_are_forwarded() {
        let (mut peer, _bus, _server) = start();
        peer.send(
            r#"{"jsonrpc":"2.0","id":1,"method":"discover","params":{"filters":{"patterns":["*"]}}}"#,
        )
        .await;

        let mut seen = vec![peer.recv().await, peer.recv().await];
        seen.sort_by_key(|v| v.get("method").is_some());
        assert_eq!(seen[0], json!({ "jsonrpc": "2.0", "id": 1, "result": null }));
        assert_eq!(
            seen[1],
            json!({
                "jsonrpc": "2.0",
                "method": "didDiscoverPeripheral",
                "params": { "peripheralId": PORT, "name": "Arduino Uno (/dev/ttySIM0)" }
            })
        );
    }

    #[tokio::test]
    async fn test_end_of_input_disposes_session() {
        let (mut peer, bus, server) = start();
        peer.send(
            r#"{"jsonrpc":"2.0","id":1,"method":"discover","params":{"filters":{"patterns":["*"]}}}"#,
        )
        .await;
        let _ = peer.recv().await;
        let _ = peer.recv().await;

        peer.send(&format!(
            r#"{{"jsonrpc":"2.0","id":2,"method":"connect","params":{{"peripheralId":"{}","peripheralConfig":{{"config":{{"baudRate":9600}}}}}}}}"#,
            PORT
        ))
        .await;
        assert_eq!(peer.recv().await["result"], Value::Null);
        assert!(bus.is_open(PORT));

        drop(peer.writer);
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!bus.is_open(PORT));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pipelined_writes_keep_request_order() {
        const SINK: &str = "/dev/ttySIM1";
        const WRITES: usize = 100;

        let (mut peer, bus, _server) = start();
        bus.attach_usb(SINK, ch340::CH340);
        peer.send(
            r#"{"jsonrpc":"2.0","id":1,"method":"discover","params":{"filters":{"patterns":["*"]}}}"#,
        )
        .await;
        loop {
            let message = peer.recv().await;
            if message["params"]["peripheralId"] == SINK {
                break;
            }
        }
        peer.send(&format!(
            r#"{{"jsonrpc":"2.0","id":2,"method":"connect","params":{{"peripheralId":"{}","peripheralConfig":{{"config":{{"baudRate":9600}}}}}}}}"#,
            SINK
        ))
        .await;
        loop {
            let message = peer.recv().await;
            if message["id"] == 2 {
                assert_eq!(message["result"], Value::Null, "connect failed: {}", message);
                break;
            }
        }

        let mut expected = String::new();
        let mut batch = String::new();
        for i in 0..WRITES {
            let chunk = format!("{:03},", i);
            expected.push_str(&chunk);
            batch.push_str(&format!(
                "{{\"jsonrpc\":\"2.0\",\"id\":{},\"method\":\"write\",\"params\":{{\"message\":\"{}\",\"encoding\":\"utf8\"}}}}\n",
                100 + i,
                chunk
            ));
        }

        // Responses are read while the batch is still being written
        let Peer { writer, reader } = &mut peer;
        let send = async {
            writer.write_all(batch.as_bytes()).await.unwrap();
        };
        let receive = async {
            let mut completed = 0;
            while completed < WRITES {
                let line = tokio::time::timeout(Duration::from_secs(5), reader.next_line())
                    .await
                    .expect("timed out waiting for write results")
                    .unwrap()
                    .expect("output closed");
                let message: Value = serde_json::from_str(&line).unwrap();
                if message["id"].as_u64().is_some_and(|id| id >= 100) {
                    assert_eq!(message["result"], 4, "write failed: {}", message);
                    completed += 1;
                }
            }
        };
        tokio::join!(send, receive);

        for _ in 0..200 {
            if bus.received(SINK).len() >= expected.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(String::from_utf8(bus.received(SINK)).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_end_of_input_disposes_with_outbound_backlog() {
        let bus = VirtualBus::new();
        for i in 0..4 {
            bus.attach_usb(&format!("/dev/ttySIM{}", i), arduino::UNO);
        }
        let backend = SessionBackend {
            enumerator: Arc::new(bus.clone()),
            driver: Arc::new(bus.clone()),
            toolchain: Arc::new(ScriptedToolchain::new()),
        };
        let config = SessionConfig {
            discovery_period: Duration::from_millis(5),
            channel_capacity: 1,
            ..SessionConfig::default()
        };
        let (session, outbound) = SessionHandle::spawn(backend, config);
        session
            .call("discover", json!({ "filters": { "patterns": ["*"] } }))
            .await
            .unwrap();

        // The session is now stuck emitting discoveries nobody reads
        tokio::time::sleep(Duration::from_millis(50)).await;

        let input = BufReader::new(tokio::io::empty());
        tokio::time::timeout(
            Duration::from_secs(2),
            serve(session.clone(), outbound, input, tokio::io::sink()),
        )
        .await
        .expect("dispose hung on a full outbound queue")
        .unwrap();
        assert_eq!(
            session.call("getServices", json!({})).await,
            Err(link_session::SessionError::Disposed)
        );
    }
}
