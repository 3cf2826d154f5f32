use crate::RelayService;
use axum::Json;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use beam_core::RelayFrame;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<RelayService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

pub async fn health_handler(State(service): State<RelayService>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "members": service.members().len(),
    }))
}

async fn handle_socket(socket: WebSocket, service: RelayService) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayFrame>();

    let conn = service.connect(tx);
    info!("New WebSocket connection #{}", conn);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize relay frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<RelayFrame>(&text) {
                        Ok(RelayFrame::Enter { member }) => service.enter(conn, member),
                        Ok(RelayFrame::Publish { event, envelope }) => {
                            service.publish(conn, event, envelope)
                        }
                        Ok(other) => warn!("Unexpected frame from #{}: {:?}", conn, other),
                        Err(e) => warn!("Invalid relay frame from #{}: {:?}", conn, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.disconnect(conn);
    info!("WebSocket #{} disconnected", conn);
}
