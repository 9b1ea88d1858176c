use std::sync::Arc;

use crate::{
    config::Config,
    dispatch::Dispatcher,
    error::ProtocolError,
    net::{
        framing::{read_frame, write_frame},
        outbound::Outbox,
    },
    protocol::{
        message::Message,
        request::{Inbound, MalformedBody, Request},
    },
};
use tokio::{
    io::{AsyncWrite, BufReader, BufWriter},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};

const INBOUND_QUEUE: usize = 64;

pub async fn start_listening(
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    outbox: Outbox,
) -> Result<(), ProtocolError> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Waiting for controller");
    serve(listener, config, dispatcher, outbox).await
}

/// Serves one controller at a time. Frames queued in `outbox` while nobody
/// is connected go to the next controller.
pub async fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    mut outbox: Outbox,
) -> Result<(), ProtocolError> {
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        tracing::info!(%peer_addr, "New connection");

        match handle_connection(socket, &config, &dispatcher, &mut outbox).await {
            Ok(()) => tracing::info!(%peer_addr, "Controller disconnected"),
            Err(e) => tracing::warn!(%peer_addr, error = %e, "Connection handler failed"),
        }
    }
}

pub async fn handle_connection(
    socket: TcpStream,
    config: &Config,
    dispatcher: &Arc<Dispatcher>,
    outbox: &mut Outbox,
) -> Result<(), ProtocolError> {
    let (reader, writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    let hello_rcv = timeout(config.handshake_timeout, read_frame::<_, Inbound>(&mut reader))
        .await
        .map_err(|_| ProtocolError::InvalidHandshake)?;

    match hello_rcv {
        Ok(Inbound::Connect { user_id }) => {
            tracing::info!(user_id, "Started core");
        }
        Ok(other) => {
            let err = Message::mk_error(
                "INVALID_HANDSHAKE".into(),
                format!("expected connect, got {other:?}"),
            );
            write_frame(&mut writer, &err).await?;
            return Err(ProtocolError::InvalidHandshake);
        }
        Err(ProtocolError::InvalidFormat) => {
            write_frame(&mut writer, &Message::from(ProtocolError::InvalidHandshake)).await?;
            return Err(ProtocolError::InvalidHandshake);
        }
        Err(e) => return Err(e),
    }

    // read_frame is not cancel safe, so reads happen outside the select loop
    let (frames_tx, mut frames) = mpsc::channel(INBOUND_QUEUE);
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = read_frame::<_, Inbound>(&mut reader).await;
            let fatal = matches!(&frame, Err(e) if !matches!(e, ProtocolError::InvalidFormat));
            if frames_tx.send(frame).await.is_err() || fatal {
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(Ok(Inbound::Request { update_id, data })) => match Request::from_body(data) {
                    Ok(request) => {
                        dispatcher.dispatch(request, update_id);
                    }
                    Err(MalformedBody { chat_id: Some(chat_id), reason }) => {
                        tracing::warn!(chat_id, %update_id, %reason, "Malformed request body");
                        dispatcher.dispatch(Request::unparsed(chat_id), update_id);
                    }
                    Err(MalformedBody { chat_id: None, reason }) => {
                        tracing::warn!(%update_id, %reason, "Request names no chat");
                        if let Err(e) = send_error(&mut writer, ProtocolError::InvalidFormat).await {
                            break Err(e);
                        }
                    }
                },
                Some(Ok(Inbound::Connect { user_id })) => {
                    tracing::debug!(user_id, "Ignoring repeated connect");
                }
                Some(Err(ProtocolError::InvalidFormat)) => {
                    tracing::warn!("Dropping malformed frame");
                    if let Err(e) = send_error(&mut writer, ProtocolError::InvalidFormat).await {
                        break Err(e);
                    }
                }
                Some(Err(ProtocolError::OversizedFrame)) => {
                    let _ = send_error(&mut writer, ProtocolError::OversizedFrame).await;
                    break Err(ProtocolError::OversizedFrame);
                }
                Some(Err(ProtocolError::ConnectionClosed)) | None => break Ok(()),
                Some(Err(e)) => break Err(e),
            },
            msg = outbox.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write_frame(&mut writer, &msg).await {
                        tracing::error!(?msg, "Outbound frame lost");
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    reader_task.abort();
    result
}

async fn send_error<W: AsyncWrite + Unpin>(
    writer: &mut W,
    err: ProtocolError,
) -> Result<(), ProtocolError> {
    write_frame(writer, &Message::from(err)).await
}
