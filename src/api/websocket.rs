//! WebSocket game transport
//!
//! Every socket becomes one observer of the round engine. Inbound JSON
//! commands are dispatched to the engine and answered with an `ack` or an
//! `error` reply carrying the client's `request_id`. Game events are pushed
//! as they happen.

use super::handlers::AppState;
use crate::errors::GameError;
use crate::game::engine::CrashGame;
use crate::game::events::GameEvent;
use crate::game::types::PlaceBetRequest;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{atomic::Ordering, Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands accepted from clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Identify {
        #[serde(default)]
        request_id: Option<String>,
        wallet: String,
    },
    PlaceBet {
        #[serde(default)]
        request_id: Option<String>,
        currency: String,
        stake: Decimal,
        #[serde(default)]
        auto_cash_out: Option<Decimal>,
    },
    CancelBet {
        #[serde(default)]
        request_id: Option<String>,
    },
    CashOut {
        #[serde(default)]
        request_id: Option<String>,
    },
}

impl ClientCommand {
    fn request_id(&self) -> Option<String> {
        match self {
            ClientCommand::Identify { request_id, .. }
            | ClientCommand::PlaceBet { request_id, .. }
            | ClientCommand::CancelBet { request_id }
            | ClientCommand::CashOut { request_id } => request_id.clone(),
        }
    }
}

/// Direct answer to one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandReply {
    Ack {
        request_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Error {
        request_id: Option<String>,
        code: String,
        message: String,
    },
}

impl CommandReply {
    fn ack(request_id: Option<String>) -> Self {
        CommandReply::Ack {
            request_id,
            data: None,
        }
    }

    fn ack_with<T: Serialize>(request_id: Option<String>, data: &T) -> Self {
        CommandReply::Ack {
            request_id,
            data: serde_json::to_value(data).ok(),
        }
    }

    fn error(request_id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        CommandReply::Error {
            request_id,
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn game_error(request_id: Option<String>, error: GameError) -> Self {
        Self::error(request_id, error.code(), error.to_string())
    }
}

/// Per-socket state: the transport id and the wallet it identified as
pub struct ClientSession {
    transport_id: String,
    wallet: Option<String>,
}

impl ClientSession {
    pub fn new(transport_id: String) -> Self {
        Self {
            transport_id,
            wallet: None,
        }
    }

    pub fn wallet(&self) -> Option<&str> {
        self.wallet.as_deref()
    }

    /// Parse and execute one text frame
    pub async fn handle_text(&mut self, game: &CrashGame, text: &str) -> CommandReply {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => self.handle_command(game, command).await,
            Err(e) => CommandReply::error(None, "INVALID_REQUEST", e.to_string()),
        }
    }

    pub async fn handle_command(&mut self, game: &CrashGame, command: ClientCommand) -> CommandReply {
        let request_id = command.request_id();

        let command = match command {
            ClientCommand::Identify { wallet, .. } => return self.identify(game, request_id, wallet).await,
            other => other,
        };

        let Some(wallet) = self.wallet.clone() else {
            return CommandReply::error(request_id, "NOT_IDENTIFIED", "identify before betting");
        };

        match command {
            ClientCommand::PlaceBet {
                currency,
                stake,
                auto_cash_out,
                ..
            } => {
                let request = PlaceBetRequest {
                    wallet,
                    currency,
                    stake,
                    auto_cash_out,
                    transport_id: self.transport_id.clone(),
                };
                match game.place_bet(request).await {
                    Ok(bet) => CommandReply::ack_with(request_id, &bet),
                    Err(e) => CommandReply::game_error(request_id, e),
                }
            }
            ClientCommand::CancelBet { .. } => match game.cancel_bet(&wallet).await {
                Ok(()) => CommandReply::ack(request_id),
                Err(e) => CommandReply::game_error(request_id, e),
            },
            ClientCommand::CashOut { .. } => match game.cash_out(&wallet).await {
                Ok(receipt) => CommandReply::ack_with(request_id, &receipt),
                Err(e) => CommandReply::game_error(request_id, e),
            },
            ClientCommand::Identify { .. } => CommandReply::ack(request_id),
        }
    }

    async fn identify(
        &mut self,
        game: &CrashGame,
        request_id: Option<String>,
        wallet: String,
    ) -> CommandReply {
        let wallet = wallet.trim().to_string();
        if wallet.is_empty() {
            return CommandReply::error(request_id, "INVALID_REQUEST", "wallet must not be empty");
        }
        game.identify(&self.transport_id, wallet.clone()).await;
        debug!(transport_id = %self.transport_id, %wallet, "client identified");
        self.wallet = Some(wallet);
        CommandReply::ack(request_id)
    }
}

/// GET /ws
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let game = state.game.clone();
    ws.on_upgrade(move |socket| handle_connection(socket, game))
}

async fn handle_connection(socket: WebSocket, game: CrashGame) {
    let transport_id = generate_client_id();
    let metrics = game.metrics();
    let active = metrics
        .websocket_connections_active
        .fetch_add(1, Ordering::SeqCst)
        + 1;
    info!("🔌 WebSocket client {} connected (total: {})", transport_id, active);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<GameEvent>();
    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<CommandReply>();
    let (mut sender, mut receiver) = socket.split();

    game.connect(transport_id.clone(), events_tx).await;

    let client_id_for_send = transport_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let encoded = tokio::select! {
                Some(event) = events_rx.recv() => serde_json::to_string(&event),
                Some(reply) = replies_rx.recv() => serde_json::to_string(&reply),
                else => break,
            };

            let message = match encoded {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };

            if sender.send(message).await.is_err() {
                debug!("Client {} disconnected", client_id_for_send);
                break;
            }
        }
    });

    let recv_game = game.clone();
    let mut session = ClientSession::new(transport_id.clone());
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = session.handle_text(&recv_game, &text).await;
                    if replies_tx.send(reply).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Client {} requested close", session.transport_id);
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error from client {}: {}", session.transport_id, e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut receive_task => send_task.abort(),
        _ = &mut send_task => receive_task.abort(),
    }

    game.disconnect(&transport_id).await;
    let remaining = metrics
        .websocket_connections_active
        .fetch_sub(1, Ordering::SeqCst)
        .saturating_sub(1);
    info!("🔌 WebSocket client {} disconnected (remaining: {})", transport_id, remaining);
}

/// Generate a unique client ID
fn generate_client_id() -> String {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::randomness::FixedDuration;
    use crate::ledger::InMemoryLedger;
    use crate::round_store::InMemoryRoundStore;
    use std::time::Duration;

    fn game_with(ledger: Arc<InMemoryLedger>) -> CrashGame {
        CrashGame::with_duration_source(
            &GameConfig::default(),
            ledger,
            Arc::new(InMemoryRoundStore::default()),
            Arc::new(FixedDuration(Duration::from_secs(5))),
        )
    }

    #[test]
    fn test_command_parsing() {
        let command: ClientCommand = serde_json::from_str(
            r#"{"type":"place_bet","request_id":"r1","currency":"USDC","stake":"12.50","auto_cash_out":"1.5"}"#,
        )
        .unwrap();

        match command {
            ClientCommand::PlaceBet {
                request_id,
                stake,
                auto_cash_out,
                ..
            } => {
                assert_eq!(request_id.as_deref(), Some("r1"));
                assert_eq!(stake, "12.50".parse::<Decimal>().unwrap());
                assert_eq!(auto_cash_out, Some("1.5".parse().unwrap()));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply = CommandReply::error(Some("r9".into()), "WRONG_STATE", "nope");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["request_id"], "r9");
        assert_eq!(json["code"], "WRONG_STATE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_betting_requires_identify() {
        let ledger = Arc::new(InMemoryLedger::new());
        let game = game_with(ledger);
        let (tx, _rx) = mpsc::unbounded_channel();
        game.connect("ws_test".into(), tx).await;

        let mut session = ClientSession::new("ws_test".into());
        let reply = session
            .handle_text(&game, r#"{"type":"cash_out","request_id":"r1"}"#)
            .await;

        assert_eq!(
            reply,
            CommandReply::error(Some("r1".into()), "NOT_IDENTIFIED", "identify before betting")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_then_bet_then_cancel() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.deposit("0xabc", "USDC", "100".parse().unwrap());
        let game = game_with(ledger.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        game.connect("ws_test".into(), tx).await;

        let mut session = ClientSession::new("ws_test".into());
        let reply = session
            .handle_text(&game, r#"{"type":"identify","wallet":"0xabc"}"#)
            .await;
        assert!(matches!(reply, CommandReply::Ack { .. }));
        assert_eq!(session.wallet(), Some("0xabc"));

        let reply = session
            .handle_text(
                &game,
                r#"{"type":"place_bet","request_id":"b1","currency":"USDC","stake":"40"}"#,
            )
            .await;
        match reply {
            CommandReply::Ack { request_id, data } => {
                assert_eq!(request_id.as_deref(), Some("b1"));
                assert_eq!(data.unwrap()["wallet"], "0xabc");
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let reply = session
            .handle_text(&game, r#"{"type":"place_bet","currency":"USDC","stake":"1"}"#)
            .await;
        assert!(matches!(reply, CommandReply::Error { ref code, .. } if code == "ALREADY_JOINED"));

        let reply = session
            .handle_text(&game, r#"{"type":"cancel_bet"}"#)
            .await;
        assert_eq!(reply, CommandReply::ack(None));
        assert_eq!(
            crate::ledger::Ledger::balance(ledger.as_ref(), "0xabc", "USDC")
                .await
                .unwrap(),
            "100".parse::<Decimal>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let game = game_with(Arc::new(InMemoryLedger::new()));
        let mut session = ClientSession::new("ws_test".into());

        let reply = session.handle_text(&game, "not json").await;
        assert!(matches!(reply, CommandReply::Error { ref code, .. } if code == "INVALID_REQUEST"));
    }
}
