//! Terminal client for the line-protocol listener.
//!
//! Relay events are printed one per line. Input lines are sent as chat
//! messages, except for the local commands `/who` and `/quit`.

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout},
    net::{TcpStream, tcp::OwnedReadHalf},
    select, signal,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    cli::ClientArgs,
    message::{ChatMessage, ClientEvent, RoomUsers, ServerEvent, read_message, write_message},
    relay::BOT_NAME,
};

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    Who,
    Quit,
    Blank,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let text = line.trim_end();
        if text.is_empty() {
            Input::Blank
        } else if text.eq_ignore_ascii_case("/quit") {
            Input::Quit
        } else if text.eq_ignore_ascii_case("/who") {
            Input::Who
        } else {
            Input::Say(text.to_string())
        }
    }
}

/// The client's picture of its room, refreshed by every roster snapshot.
#[derive(Debug, Default)]
pub struct RoomView {
    room: Option<String>,
    members: Vec<String>,
}

impl RoomView {
    /// Records `event` and returns the line to print for it.
    pub fn apply(&mut self, event: &ServerEvent) -> String {
        if let ServerEvent::RoomUsers(RoomUsers { room, users }) = event {
            self.room = Some(room.clone());
            self.members = users.iter().map(|user| user.username.clone()).collect();
        }
        render_server_event(event)
    }

    pub fn describe(&self) -> String {
        match &self.room {
            Some(room) => roster_line(room, self.members.iter().map(String::as_str)),
            None => "*** no roster received yet".to_string(),
        }
    }
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, room = %args.room, "connected to relay");

    let (read_half, mut writer) = stream.into_split();
    let join = ClientEvent::Join {
        username: args.username,
        room: args.room,
    };
    write_message(&mut writer, &join)
        .await
        .context("failed to send join")?;

    let mut events = spawn_event_reader(read_half);
    let mut input = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut view = RoomView::default();

    let outcome = loop {
        select! {
            event = events.recv() => match event {
                Some(Ok(event)) => print_line(&mut stdout, &view.apply(&event)).await?,
                Some(Err(err)) => break Err(err).context("failed to read from relay"),
                None => {
                    print_line(&mut stdout, "*** relay closed the connection").await?;
                    break Ok(());
                }
            },
            line = input.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break Ok(());
                };
                match Input::parse(&line) {
                    Input::Blank => {}
                    Input::Who => print_line(&mut stdout, &view.describe()).await?,
                    Input::Quit => {
                        print_line(&mut stdout, "*** leaving chat").await?;
                        break Ok(());
                    }
                    Input::Say(text) => write_message(&mut writer, &ClientEvent::Message { text })
                        .await
                        .context("failed to send message")?,
                }
            }
            result = signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = ?err, "ctrl-c handler failed");
                }
                break Ok(());
            }
        }
    };

    if let Err(err) = writer.shutdown().await {
        debug!(error = ?err, "relay connection already gone");
    }
    outcome
}

/// Decodes relay events on a separate task so the prompt loop only selects
/// on cancel-safe futures. The channel closes after end of stream or the
/// first error.
fn spawn_event_reader(read_half: OwnedReadHalf) -> mpsc::Receiver<io::Result<ServerEvent>> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        while let Some(event) = read_message::<_, ServerEvent>(&mut reader).await.transpose() {
            let failed = event.is_err();
            if tx.send(event).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// One terminal line per relay event: `HH:MM <user> text` for chat,
/// `HH:MM *** text` for bot notices.
pub fn render_server_event(event: &ServerEvent) -> String {
    match event {
        ServerEvent::Message(ChatMessage {
            username,
            text,
            time,
        }) if username == BOT_NAME => format!("{time} *** {text}"),
        ServerEvent::Message(ChatMessage {
            username,
            text,
            time,
        }) => format!("{time} <{username}> {text}"),
        ServerEvent::RoomUsers(RoomUsers { room, users }) => {
            roster_line(room, users.iter().map(|user| user.username.as_str()))
        }
    }
}

fn roster_line<'a>(room: &str, names: impl Iterator<Item = &'a str>) -> String {
    format!("*** users in {room}: {}", names.collect::<Vec<_>>().join(", "))
}

async fn print_line(stdout: &mut Stdout, line: &str) -> io::Result<()> {
    stdout.write_all(format!("{line}\n").as_bytes()).await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::User;

    fn roster(room: &str, names: &[&str]) -> ServerEvent {
        ServerEvent::RoomUsers(RoomUsers {
            room: room.into(),
            users: names
                .iter()
                .map(|name| User {
                    id: (*name).into(),
                    username: (*name).into(),
                    room: room.into(),
                })
                .collect(),
        })
    }

    #[test]
    fn renders_bot_notices_chat_and_rosters() {
        let notice = ServerEvent::Message(ChatMessage {
            username: BOT_NAME.into(),
            text: "bob has joined the chat".into(),
            time: "07:30".into(),
        });
        assert_eq!(render_server_event(&notice), "07:30 *** bob has joined the chat");

        let chat = ServerEvent::Message(ChatMessage {
            username: "alice".into(),
            text: "hi".into(),
            time: "09:05".into(),
        });
        assert_eq!(render_server_event(&chat), "09:05 <alice> hi");

        assert_eq!(
            render_server_event(&roster("r1", &["alice", "bob"])),
            "*** users in r1: alice, bob"
        );
    }

    #[test]
    fn parses_commands_and_chat() {
        assert_eq!(Input::parse("hello there\n"), Input::Say("hello there".into()));
        assert_eq!(Input::parse("  \r\n"), Input::Blank);
        assert_eq!(Input::parse("/QUIT"), Input::Quit);
        assert_eq!(Input::parse("/who"), Input::Who);
        assert_eq!(Input::parse("/whom"), Input::Say("/whom".into()));
    }

    #[test]
    fn room_view_follows_latest_roster() {
        let mut view = RoomView::default();
        assert_eq!(view.describe(), "*** no roster received yet");

        view.apply(&roster("lobby", &["alice", "bob"]));
        let line = view.apply(&ServerEvent::Message(ChatMessage {
            username: BOT_NAME.into(),
            text: "bob has left the chat".into(),
            time: "07:30".into(),
        }));
        assert_eq!(line, "07:30 *** bob has left the chat");
        assert_eq!(view.describe(), "*** users in lobby: alice, bob");

        view.apply(&roster("lobby", &["alice"]));
        assert_eq!(view.describe(), "*** users in lobby: alice");
    }
}
