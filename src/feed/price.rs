//! Gold price streaming connection.
//!
//! One persistent socket to the market-data stream. On open, a subscribe
//! request carrying the current session credential is sent immediately.
//! Inbound messages are parsed defensively into a tagged union: quotes
//! update the price, the backend's invalid-session error code stops the
//! feed and reports expiry upward (distinct from a plain close, which
//! redials with the same credential after the fixed retry delay).

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{wait_until_online, ConnectionState, FeedConfig, FeedHandle};
use crate::error::{Fault, Recovery, SessionError};
use crate::market::INVALID_SESSION_CODE;
use crate::session::SessionCredential;

/// Market-data streaming endpoint.
pub const PRICE_STREAM_URL: &str = "wss://api-streaming-capital.backend-capital.com/connect";

/// Correlation id attached to the GOLD subscription request.
pub const SUBSCRIPTION_CORRELATION_ID: &str = "gold-price-subscription";

/// Events the price feed reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceEvent {
    /// A live bid quote.
    Quote(f64),
    /// The backend rejected the session token mid-stream. The feed has
    /// stopped; the orchestrator must re-acquire a session and restart it.
    SessionExpired,
}

/// Inbound stream message. Field soup by design: the wire mixes quote
/// frames and error frames, so everything is optional and classification
/// happens after parsing.
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    payload: Option<QuotePayload>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    #[serde(default)]
    bid: Option<f64>,
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
enum ParsedMessage {
    Quote(f64),
    SessionFault(String),
    Unknown,
}

/// Classify one inbound text frame. Anything that does not parse, or parses
/// to an unexpected shape, is Unknown and silently discarded by the caller.
fn parse_message(text: &str) -> ParsedMessage {
    let message: StreamMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => return ParsedMessage::Unknown,
    };

    if let Some(code) = message.error_code {
        return ParsedMessage::SessionFault(code);
    }

    let is_quote = message.status.as_deref() == Some("OK")
        && message.destination.as_deref() == Some("quote");
    if is_quote {
        if let Some(bid) = message.payload.and_then(|payload| payload.bid) {
            if bid.is_finite() {
                return ParsedMessage::Quote(bid);
            }
        }
    }

    ParsedMessage::Unknown
}

/// Subscribe request sent immediately after the socket opens.
fn subscribe_request(credential: &SessionCredential) -> String {
    json!({
        "destination": "marketData.subscribe",
        "correlationId": SUBSCRIPTION_CORRELATION_ID,
        "cst": credential.security_id,
        "securityToken": credential.security_token,
        "payload": { "epics": ["GOLD"] }
    })
    .to_string()
}

/// Spawn the price feed task. The credential is borrowed for the lifetime
/// of this feed instance; a session-expired signal ends the task, and the
/// orchestrator restarts it with a fresh credential.
pub fn spawn_price_feed(
    config: FeedConfig,
    credential: SessionCredential,
    event_tx: mpsc::Sender<PriceEvent>,
    status_tx: watch::Sender<ConnectionState>,
    online: watch::Receiver<bool>,
) -> FeedHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_price_feed(
        config,
        credential,
        event_tx,
        status_tx,
        online,
        shutdown_rx,
    ));
    FeedHandle::new(shutdown_tx, task)
}

async fn run_price_feed(
    config: FeedConfig,
    credential: SessionCredential,
    event_tx: mpsc::Sender<PriceEvent>,
    status_tx: watch::Sender<ConnectionState>,
    mut online: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(url = %config.url, "starting price feed");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        wait_until_online(&mut online).await;
        let _ = status_tx.send(ConnectionState::Connecting);

        let ws_stream = match connect_async(&config.url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(error) => {
                let fault = Fault::Transport(error.to_string());
                error!(%fault, url = %config.url, "price feed connection failed");
                let _ = status_tx.send(ConnectionState::Errored);
                tokio::time::sleep(config.connect_fail_delay).await;
                continue;
            }
        };

        info!(url = %config.url, "price feed connected");
        let _ = status_tx.send(ConnectionState::Connected);

        let (mut write, mut read) = ws_stream.split();

        if let Err(error) = write
            .send(Message::Text(subscribe_request(&credential).into()))
            .await
        {
            error!(%error, "failed to send price subscription");
            let _ = status_tx.send(ConnectionState::Errored);
            tokio::time::sleep(config.retry_delay).await;
            continue;
        }

        // Inner loop runs until the connection drops or the credential is
        // rejected; the fault's recovery policy decides what happens next.
        let fault = loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        return;
                    }
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => match parse_message(&text) {
                        ParsedMessage::Quote(bid) => {
                            if event_tx.send(PriceEvent::Quote(bid)).await.is_err() {
                                debug!("price receiver dropped, stopping feed");
                                let _ = status_tx.send(ConnectionState::Disconnected);
                                return;
                            }
                        }
                        ParsedMessage::SessionFault(code) if code == INVALID_SESSION_CODE => {
                            let _ = status_tx.send(ConnectionState::Disconnected);
                            break Fault::Session(SessionError::Rejected(code));
                        }
                        ParsedMessage::SessionFault(code) => {
                            let fault = Fault::Protocol(format!("error frame: {code}"));
                            warn!(%fault, "dropping price stream error frame");
                        }
                        ParsedMessage::Unknown => {
                            let raw = text.as_str();
                            debug!(raw = %raw.get(..120).unwrap_or(raw), "dropping unrecognised price message");
                        }
                    },
                    Some(Ok(Message::Close(_))) => {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        break Fault::Transport("closed by server".to_string());
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Heartbeat, handled by tungstenite.
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let _ = status_tx.send(ConnectionState::Errored);
                        break Fault::Transport(error.to_string());
                    }
                    None => {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        break Fault::Transport("stream ended".to_string());
                    }
                }
            }
        };

        match fault.recovery() {
            Recovery::RefreshSession => {
                warn!(%fault, "price stream stopped, session refresh required");
                let _ = event_tx.send(PriceEvent::SessionExpired).await;
                return;
            }
            _ => {
                warn!(%fault, delay = ?config.retry_delay, "price feed redialing");
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }

    let _ = status_tx.send(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> SessionCredential {
        SessionCredential {
            security_id: "cst-1".to_string(),
            security_token: "token-1".to_string(),
        }
    }

    #[test]
    fn test_parse_message_union() {
        struct TestCase {
            input: &'static str,
            expected: ParsedMessage,
        }

        let tests = vec![
            TestCase {
                // TC0: well-formed quote
                input: r#"{"status":"OK","destination":"quote","payload":{"bid":3401.25}}"#,
                expected: ParsedMessage::Quote(3401.25),
            },
            TestCase {
                // TC1: session fault carries the backend error code
                input: r#"{"errorCode":"error.invalid.session.token"}"#,
                expected: ParsedMessage::SessionFault(INVALID_SESSION_CODE.to_string()),
            },
            TestCase {
                // TC2: quote without a bid is unknown, not a crash
                input: r#"{"status":"OK","destination":"quote","payload":{}}"#,
                expected: ParsedMessage::Unknown,
            },
            TestCase {
                // TC3: wrong destination is discarded
                input: r#"{"status":"OK","destination":"ping","payload":{"bid":1.0}}"#,
                expected: ParsedMessage::Unknown,
            },
            TestCase {
                // TC4: malformed JSON is dropped, never an error
                input: "{nope",
                expected: ParsedMessage::Unknown,
            },
            TestCase {
                // TC5: non-OK status is discarded
                input: r#"{"status":"FAILED","destination":"quote","payload":{"bid":1.0}}"#,
                expected: ParsedMessage::Unknown,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(parse_message(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_subscribe_request_carries_credential() {
        let request = subscribe_request(&credential());
        let parsed: serde_json::Value = serde_json::from_str(&request).unwrap();

        assert_eq!(parsed["destination"], "marketData.subscribe");
        assert_eq!(parsed["correlationId"], SUBSCRIPTION_CORRELATION_ID);
        assert_eq!(parsed["cst"], "cst-1");
        assert_eq!(parsed["securityToken"], "token-1");
        assert_eq!(parsed["payload"]["epics"][0], "GOLD");
    }

    #[tokio::test]
    async fn test_feed_stops_on_close_without_connecting() {
        // Unroutable endpoint: the loop stays in connect-retry. Closing the
        // handle must stop it without panicking.
        let config = FeedConfig::new("ws://127.0.0.1:9")
            .with_connect_fail_delay(std::time::Duration::from_millis(10));
        let (event_tx, _event_rx) = mpsc::channel(4);
        let (status_tx, _status_rx) = watch::channel(ConnectionState::Disconnected);
        let (_online_tx, online_rx) = watch::channel(true);

        let handle = spawn_price_feed(config, credential(), event_tx, status_tx, online_rx);
        handle.close();
        handle.close();
    }
}
