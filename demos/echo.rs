//! Echo - a listener and an initiator in one process.
//!
//! This example demonstrates:
//! - Registering a profile with the session builder
//! - Starting a channel and sending MsgPack-encoded requests
//! - Closing the channel and then the session
//!
//! ```sh
//! RUST_LOG=beepwire=debug cargo run --example echo
//! ```

use beepwire::connection::{Connection, ConnectionConfig};
use beepwire::transport::{connect, Listener};
use beepwire::{
    ChannelContext, CloseRequest, Message, Profile, Result, Role, Session, StartRequest,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ECHO: &str = "http://example.com/profiles/echo";

#[derive(Serialize, Deserialize, Debug)]
struct Ping {
    seq: u32,
    text: String,
}

/// Replies to every request with the request itself.
struct Echo;

impl Profile for Echo {
    fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
        ctx.send_rpy(msgno, message);
        Ok(())
    }
}

/// Forwards replies to `main`.
struct Client {
    replies: mpsc::UnboundedSender<Ping>,
}

impl Profile for Client {
    fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, _message: Message) -> Result<()> {
        ctx.send_error(msgno, 550, "requests are not served here")
    }

    fn handle_rpy(&mut self, _ctx: &mut ChannelContext<'_>, _msgno: u32, message: Message) -> Result<()> {
        let _ = self.replies.send(message.decode_msgpack()?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let listener = Listener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "serving");
        let session = Session::builder(Role::Listener).profile(ECHO, || Echo).build()?;
        Connection::spawn(session, stream, ConnectionConfig::default())
            .wait()
            .await
    });

    let (replies_tx, mut replies) = mpsc::unbounded_channel();
    let session = Session::builder(Role::Initiator)
        .profile(ECHO, move || Client {
            replies: replies_tx.clone(),
        })
        .build()?;
    let connection = Connection::spawn(session, connect(addr).await?, ConnectionConfig::default());
    let handle = connection.handle();

    let (started_tx, mut started) = mpsc::unbounded_channel();
    handle
        .start(StartRequest::new([ECHO]).on_success(move |number, _uri| {
            let _ = started_tx.send(number);
        }))
        .await?;
    let channel = started.recv().await.ok_or("channel was not started")?;

    for seq in 0..3 {
        let ping = Ping {
            seq,
            text: format!("hello #{seq}"),
        };
        handle.send_msg(channel, Message::msgpack(&ping)?).await?;
        let reply = replies.recv().await.ok_or("no reply")?;
        info!(seq = reply.seq, text = %reply.text, "echoed");
    }

    let (closed_tx, mut closed) = mpsc::unbounded_channel();
    for number in [channel, 0] {
        let done = closed_tx.clone();
        handle
            .close(CloseRequest::new(number).on_success(move || {
                let _ = done.send(());
            }))
            .await?;
        closed.recv().await.ok_or("close was not acknowledged")?;
    }

    connection.wait().await?;
    server.await??;
    info!("done");
    Ok(())
}
