use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::util::constants::RECV_BUFFER_LIMIT;

/// Reads one NDJSON frame. Blank lines are keep-alives and are skipped.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    loop {
        let mut limited_reader = (&mut *reader).take(RECV_BUFFER_LIMIT as u64);
        let mut line = String::new();
        let n = limited_reader.read_line(&mut line).await.map_err(ProtocolError::Io)?;

        if n == 0 {
            return Err(ProtocolError::ConnectionClosed); // EOF
        }
        if n >= RECV_BUFFER_LIMIT {
            return Err(ProtocolError::OversizedFrame);
        }
        if line.trim().is_empty() {
            continue;
        }

        return serde_json::from_str(&line).map_err(|_| ProtocolError::InvalidFormat);
    }
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(msg).map_err(|_| ProtocolError::InvalidFormat)?;
    line.push('\n'); // NDJSON format
    writer.write_all(line.as_bytes()).await.map_err(ProtocolError::Io)?;
    writer.flush().await.map_err(ProtocolError::Io)?;

    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::protocol::{
        message::{Message, ResultCode},
        request::Inbound,
    };
    use tokio::io::{BufReader, BufWriter};

    #[tokio::test]
    async fn test_read_frame() {
        let (client, mut server) = tokio::io::duplex(RECV_BUFFER_LIMIT);
        let mut reader = BufReader::new(client);

        let line = r#"{"type":"connect","user_id":7}"#.to_string() + "\n";
        server.write_all(line.as_bytes()).await.expect("Io error while writing");

        let frame: Inbound = read_frame(&mut reader).await.expect("Io error while reading");
        assert_eq!(frame, Inbound::Connect { user_id: 7 });
    }

    #[tokio::test]
    async fn test_write_frame() {
        let (client, server) = tokio::io::duplex(RECV_BUFFER_LIMIT);
        let mut writer = BufWriter::new(server);
        let mut reader = BufReader::new(client);

        let msg = Message::mk_update(ResultCode::JoinedVoiceChat, -100, "s1".into());
        write_frame(&mut writer, &msg).await.expect("Failed to write frame");

        let mut line = String::new();
        reader.read_line(&mut line).await.expect("Error reading line");

        assert!(line.ends_with('\n'));
        let parsed = serde_json::from_str::<Message>(&line).expect("Failed to parse JSON");
        assert_eq!(parsed, msg);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"\n  \n{\"type\":\"connect\",\"user_id\":1}\n").await.unwrap();

        let mut reader = BufReader::new(client);
        let frame: Inbound = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame, Inbound::Connect { user_id: 1 });
    }

    #[tokio::test]
    async fn garbage_is_invalid_format_and_stream_continues() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"{not json\n{\"type\":\"connect\",\"user_id\":2}\n").await.unwrap();

        let mut reader = BufReader::new(client);
        let res = read_frame::<_, Inbound>(&mut reader).await;
        assert!(matches!(res, Err(ProtocolError::InvalidFormat)));
        let frame: Inbound = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame, Inbound::Connect { user_id: 2 });
    }

    #[tokio::test]
    async fn eof_is_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let mut reader = BufReader::new(client);
        let res = read_frame::<_, Inbound>(&mut reader).await;
        assert!(matches!(res, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let (client, mut server) = tokio::io::duplex(600_000);
        let big = "A".repeat(RECV_BUFFER_LIMIT + 1) + "\n";
        server.write_all(big.as_bytes()).await.unwrap();

        let mut reader = BufReader::new(client);
        let res = read_frame::<_, Inbound>(&mut reader).await;
        assert!(matches!(res, Err(ProtocolError::OversizedFrame)));
    }
}
