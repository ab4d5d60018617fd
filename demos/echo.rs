//! Echo session running entirely in memory.
//!
//! Frames written by the session go through a `FrameWriter` into a channel standing for the
//! wire. Inbound frames are injected through a `PolicyEnforcer`, as a connection's read path
//! would after decoding them.
use std::sync::{Arc, Weak};

use futures::{SinkExt, StreamExt};
use wsession::{
    CloseCode, CloseDirection, CloseInfo, Frame, FrameWriter, Handler, IncomingFrames,
    LocalConnection, OpCode, PolicyEnforcer, Session, SessionSlot, WebSocketError,
    WebSocketPolicy,
};

#[derive(Default)]
struct Echo {
    session: SessionSlot,
}

impl IncomingFrames for Echo {
    fn incoming_frame(&self, frame: Frame) {
        let Some(session) = self.session.get() else {
            return;
        };

        let res = match frame.opcode() {
            OpCode::Text => match frame.to_str() {
                Ok(text) => session.write_text((), log_result, text.to_owned()),
                Err(err) => Err(err),
            },
            OpCode::Binary => session.write_binary((), log_result, frame.into_payload()),
            OpCode::Close => {
                let info = CloseInfo::from_frame(&frame).unwrap_or_default();
                session.on_close_handshake(CloseDirection::Incoming, &info);
                session.close_with(info.code(), info.reason());
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(err) = res {
            log::error!("echo failed: {err}");
        }
    }

    fn incoming_error(&self, err: WebSocketError) {
        log::warn!("protocol error: {err}");
        if let Some(session) = self.session.get() {
            session.close_with(err.close_code(), &err.to_string());
        }
    }
}

impl Handler for Echo {
    fn attach(&self, session: Weak<Session>) {
        self.session.attach(session);
    }

    fn on_connect(&self) {
        log::info!("connected");
    }
}

fn log_result(_: (), res: wsession::Result<()>) {
    if let Err(err) = res {
        log::error!("write failed: {err}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Debug)?;

    let (wire, mut peer) = futures::channel::mpsc::unbounded::<Frame>();
    let (writer, task) =
        FrameWriter::spawn(wire.sink_map_err(|_| WebSocketError::ConnectionClosed));

    let connection = Arc::new(LocalConnection::with_remote_addr("127.0.0.1:9002".parse()?));
    connection.on_opened();

    let policy = WebSocketPolicy::new_server_policy()
        .with_max_text_message_size(64)
        .with_utf8();
    let session = Session::new(Echo::default(), connection.clone(), policy.clone(), "echo");
    session.set_outgoing(Arc::new(writer.clone()));
    session.on_connect()?;

    let inbound = PolicyEnforcer::new(policy, Arc::clone(&session));
    inbound.incoming_frame(Frame::text("Hello World"));
    inbound.incoming_frame(Frame::binary(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    inbound.incoming_frame(Frame::close(CloseCode::Normal, "done"));
    // input is closed now, this one is never delivered
    inbound.incoming_frame(Frame::text("ignored"));

    log::info!("session {:?} remote={:?}", session, session.remote_addr());

    drop(session);
    writer.shutdown();
    task.await??;

    while let Some(frame) = peer.next().await {
        log::info!("wire <- {:?} {:?}", frame.opcode(), frame.payload());
    }

    Ok(())
}
