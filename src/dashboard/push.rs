//! WebSocket push channel.
//!
//! Each connection gets a `snapshot` on connect, then every service event as
//! it happens, plus a periodic `stats` push. Dashboards may send `delete` and
//! `clear` commands back.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::DashboardState;
use crate::engine::QueueService;
use crate::event::{Event, EventKind};
use crate::model::WorkId;

/// A command sent by a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DashboardCommand {
    Delete {
        #[serde(rename = "itemId")]
        item_id: String,
    },
    Clear,
}

impl DashboardCommand {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Apply to the queue. Results reach dashboards through the event bus.
    pub async fn apply(self, service: &QueueService) {
        match self {
            DashboardCommand::Delete { item_id } => {
                let removed = service.remove(&WorkId::from(item_id.as_str())).await;
                info!(id = %item_id, removed, "dashboard command: delete");
            }
            DashboardCommand::Clear => {
                let cleared = service.clear().await;
                info!(cleared, "dashboard command: clear");
            }
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

type Sink = SplitSink<WebSocket, Message>;

async fn session(socket: WebSocket, state: DashboardState) {
    let service = state.service;
    let (mut sink, mut stream) = socket.split();
    // Subscribe before the snapshot so nothing falls between the two.
    let mut events = service.subscribe();

    info!("dashboard connected");
    if send(&mut sink, &Event::now(service.snapshot())).await.is_err() {
        return;
    }

    let mut stats_tick = tokio::time::interval(state.stats_push_interval);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    stats_tick.tick().await;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match DashboardCommand::parse(&text) {
                    Ok(command) => command.apply(&service).await,
                    Err(e) => warn!(error = %e, "ignoring invalid dashboard command"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket receive failed");
                    break;
                }
            },
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "dashboard fell behind, resending snapshot");
                        Event::now(service.snapshot())
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sink, &event).await.is_err() {
                    break;
                }
            }
            _ = stats_tick.tick() => {
                let event = Event::now(EventKind::Stats(service.report()));
                if send(&mut sink, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("dashboard disconnected");
}

async fn send(sink: &mut Sink, event: &Event) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "event not serializable");
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await.map_err(|e| {
        debug!(error = %e, "websocket send failed");
    })
}
