use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::registry::User;

/// Events a connection sends to the relay. Disconnect has no message: it is
/// the end of the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Join { username: String, room: String },
    Message { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    Message(ChatMessage),
    RoomUsers(RoomUsers),
}

/// A chat line, either from a user or from the relay's bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub time: String,
}

/// Membership snapshot for one room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomUsers {
    pub room: String,
    pub users: Vec<User>,
}

/// Reads the next newline-delimited JSON frame, skipping blank lines.
///
/// Returns `Ok(None)` at end of stream. A frame that does not decode as `T`
/// is an [`io::ErrorKind::InvalidData`] error.
pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut frame = Vec::new();
    while reader.read_until(b'\n', &mut frame).await? > 0 {
        let body = frame.trim_ascii();
        if !body.is_empty() {
            return decode_frame(body).map(Some);
        }
        frame.clear();
    }
    Ok(None)
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer.write_all(&encode_frame(message)?).await?;
    writer.flush().await
}

fn encode_frame<T: Serialize>(message: &T) -> io::Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(message)?;
    frame.push(b'\n');
    Ok(frame)
}

fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> io::Result<T> {
    serde_json::from_slice(body).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn outbound_events_use_camel_case_tags() {
        let roster = ServerEvent::RoomUsers(RoomUsers {
            room: "r1".into(),
            users: vec![User {
                id: "A".into(),
                username: "alice".into(),
                room: "r1".into(),
            }],
        });
        assert_eq!(
            serde_json::to_value(&roster).expect("encode"),
            json!({
                "type": "roomUsers",
                "room": "r1",
                "users": [{ "id": "A", "username": "alice", "room": "r1" }],
            })
        );

        let chat = ServerEvent::Message(ChatMessage {
            username: "Bot".into(),
            text: "alice has joined the chat".into(),
            time: "07:30".into(),
        });
        assert_eq!(
            serde_json::to_value(&chat).expect("encode"),
            json!({
                "type": "message",
                "username": "Bot",
                "text": "alice has joined the chat",
                "time": "07:30",
            })
        );
    }

    #[tokio::test]
    async fn reads_client_events_and_skips_blank_lines() {
        let input = b"\r\n{\"type\":\"join\",\"username\":\"alice\",\"room\":\"r1\"}\n\n{\"type\":\"message\",\"text\":\"hi\"}\n";
        let mut reader = tokio::io::BufReader::new(&input[..]);

        let join = read_message::<_, ClientEvent>(&mut reader).await.expect("read");
        assert_eq!(
            join,
            Some(ClientEvent::Join {
                username: "alice".into(),
                room: "r1".into(),
            })
        );
        let message = read_message::<_, ClientEvent>(&mut reader).await.expect("read");
        assert_eq!(message, Some(ClientEvent::Message { text: "hi".into() }));
        let eof = read_message::<_, ClientEvent>(&mut reader).await.expect("read");
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn malformed_line_is_invalid_data() {
        let mut reader = tokio::io::BufReader::new(&b"{\"type\":\"shout\"}\n"[..]);
        let err = read_message::<_, ClientEvent>(&mut reader)
            .await
            .expect_err("unknown event type");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn final_frame_without_newline_is_read() {
        let mut reader = tokio::io::BufReader::new(&b"{\"type\":\"message\",\"text\":\"bye\"}"[..]);
        let last = read_message::<_, ClientEvent>(&mut reader).await.expect("read");
        assert_eq!(last, Some(ClientEvent::Message { text: "bye".into() }));
        assert_eq!(read_message::<_, ClientEvent>(&mut reader).await.expect("read"), None);
    }

    #[tokio::test]
    async fn truncated_frame_is_invalid_data() {
        let mut reader = tokio::io::BufReader::new(&b"{\"type\":\"join\",\n"[..]);
        let err = read_message::<_, ClientEvent>(&mut reader)
            .await
            .expect_err("truncated frame");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encoded_frame_is_one_line() {
        let frame = encode_frame(&ClientEvent::Message {
            text: "two\nlines".into(),
        })
        .expect("encode");
        assert_eq!(frame.iter().filter(|byte| **byte == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn roundtrip_server_message() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let message = ServerEvent::Message(ChatMessage {
            username: "alice".into(),
            text: "hello".into(),
            time: "09:05".into(),
        });

        write_message(&mut writer, &message)
            .await
            .expect("write message");
        let parsed = read_message::<_, ServerEvent>(&mut reader)
            .await
            .expect("read message")
            .expect("expected message");

        assert_eq!(message, parsed);
    }
}
