use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::ChatState;
use crate::{
    message::{ClientEvent, ServerEvent, read_message, write_message},
    registry::ConnectionId,
    transport::Outbox,
};

/// Accepts newline-delimited JSON connections.
pub struct TcpServer {
    listener: TcpListener,
    state: ChatState,
}

impl TcpServer {
    pub fn new(listener: TcpListener, state: ChatState) -> Self {
        Self { listener, state }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let TcpServer { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("tcp listener shutting down");
                    state.shutdown();
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state);
                }
            }
        }

        Ok(())
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, state: &ChatState) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, state),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, state: &ChatState) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, state).await {
            warn!(peer = %peer, error = ?err, "connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, state: ChatState) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let (id, outbox) = state.open();
    info!(?peer, connection = %id, "connection opened");

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let reader_task = spawn_reader(BufReader::new(reader), inbound_tx);

    let result = run_session(&state, &id, inbound_rx, outbox, &mut writer).await;
    reader_task.abort();

    state.close(&id).await;
    info!(?peer, connection = %id, "connection closed");
    result
}

type Inbound = std::io::Result<Option<ClientEvent>>;

/// Reads client events on their own task.
///
/// `read_message` is not cancel safe, so the session loop selects on this
/// channel instead of polling the socket directly.
fn spawn_reader<R>(mut reader: R, inbound: mpsc::UnboundedSender<Inbound>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let message = read_message::<_, ClientEvent>(&mut reader).await;
            let done = !matches!(message, Ok(Some(_)));
            if inbound.send(message).is_err() || done {
                break;
            }
        }
    })
}

async fn run_session<W>(
    state: &ChatState,
    id: &ConnectionId,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut outbox: Outbox,
    writer: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        select! {
            client_event = inbound.recv() => {
                if !handle_client_event(client_event, state, id).await? {
                    break;
                }
            }
            server_event = outbox.recv() => {
                if !handle_server_event(server_event, writer).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn handle_client_event(
    message: Option<Inbound>,
    state: &ChatState,
    id: &ConnectionId,
) -> Result<bool> {
    match message {
        Some(message) => match message? {
            Some(event) => {
                state.relay().handle(id, event).await;
                Ok(true)
            }
            None => Ok(false),
        },
        None => Ok(false),
    }
}

async fn handle_server_event<W>(event: Option<ServerEvent>, writer: &mut W) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    match event {
        Some(event) => {
            if let Err(err) = write_message(writer, &event).await {
                debug!(?err, "failed to deliver event to connection");
                return Ok(false);
            }
            Ok(true)
        }
        None => Ok(false),
    }
}
