use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_prices(socket, state))
}

/// Forwards every published price batch until either side goes away.
async fn stream_prices(socket: WebSocket, state: AppState) {
    let mut updates = state.stocks.feed().subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!("Price subscriber connected");

    loop {
        tokio::select! {
            batch = updates.recv() => match batch {
                Ok(payload) => {
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Price subscriber lagged; skipped {} batches", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("Price subscriber disconnected");
}
