use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use wsession::{
    CloseCode, CloseDirection, CloseInfo, Completion, ConnectionState, Frame, FrameWriter,
    Handler, IncomingFrames, LocalConnection, LogicalConnection, OpCode, OutgoingFrames,
    PolicyEnforcer, Session, SessionSlot, SuspendToken, WebSocketError, WebSocketPolicy,
};

/// Connection whose every answer can be changed from the test.
#[derive(Default)]
struct ScriptedConnection {
    open: AtomicBool,
    reading: AtomicBool,
    input_closed: AtomicBool,
    output_closed: AtomicBool,
    state: Mutex<Option<ConnectionState>>,
    remote: Mutex<Option<SocketAddr>>,
    closes: Mutex<Vec<(CloseCode, String)>>,
    disconnects: AtomicUsize,
    suspends: Arc<AtomicUsize>,
    handshakes: Mutex<Vec<(CloseDirection, CloseInfo)>>,
}

impl LogicalConnection for ScriptedConnection {
    fn close_with(&self, code: CloseCode, reason: &str) {
        self.closes.lock().push((code, reason.to_owned()));
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_input_closed(&self) -> bool {
        self.input_closed.load(Ordering::SeqCst)
    }

    fn is_output_closed(&self) -> bool {
        self.output_closed.load(Ordering::SeqCst)
    }

    fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }

    fn state(&self) -> ConnectionState {
        self.state.lock().unwrap_or(ConnectionState::Connecting)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote.lock()
    }

    fn suspend(&self) -> Box<dyn SuspendToken> {
        self.suspends.fetch_add(1, Ordering::SeqCst);
        let suspends = Arc::clone(&self.suspends);
        Box::new(move || {
            suspends.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn on_close_handshake(&self, direction: CloseDirection, close: &CloseInfo) {
        self.handshakes.lock().push((direction, close.clone()));
    }
}

#[derive(Default)]
struct RecordingHandler {
    session: SessionSlot,
    frames: Mutex<Vec<Frame>>,
    errors: Mutex<Vec<WebSocketError>>,
    greeted: AtomicBool,
}

impl IncomingFrames for RecordingHandler {
    fn incoming_frame(&self, frame: Frame) {
        self.frames.lock().push(frame);
    }

    fn incoming_error(&self, err: WebSocketError) {
        self.errors.lock().push(err);
    }
}

impl Handler for RecordingHandler {
    fn attach(&self, session: Weak<Session>) {
        self.session.attach(session);
    }

    fn on_connect(&self) {
        // reentrant use of the session from within the connect callback
        let session = self.session.get().expect("session attached before on_connect");
        session.write_text((), |_, _| {}, "welcome").unwrap();
        self.greeted.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingPipeline {
    calls: Mutex<Vec<Frame>>,
}

impl OutgoingFrames for RecordingPipeline {
    fn output(&self, frame: Frame, completion: Completion) {
        self.calls.lock().push(frame);
        completion.succeeded();
    }
}

struct Fixture {
    session: Arc<Session>,
    handler: Arc<RecordingHandler>,
    pipeline: Arc<RecordingPipeline>,
    connection: Arc<ScriptedConnection>,
}

fn fixture() -> Fixture {
    let handler = Arc::new(RecordingHandler::default());
    let pipeline = Arc::new(RecordingPipeline::default());
    let connection = Arc::new(ScriptedConnection::default());
    let session = Session::new(
        Arc::clone(&handler),
        connection.clone(),
        WebSocketPolicy::new_server_policy(),
        "echo",
    );
    session.set_outgoing(pipeline.clone());
    Fixture {
        session,
        handler,
        pipeline,
        connection,
    }
}

#[test]
fn test_write_text_hello_world() {
    let fx = fixture();
    let called = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&called);

    fx.session
        .write_text(
            "ctx",
            move |ctx, res| {
                assert_eq!(ctx, "ctx");
                assert!(res.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            },
            "Hello World",
        )
        .unwrap();

    let calls = fx.pipeline.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].opcode(), OpCode::Text);
    assert!(calls[0].fin());
    assert_eq!(calls[0].to_str().unwrap(), "Hello World");
    assert_eq!(called.load(Ordering::SeqCst), 1);
}

#[test]
fn test_write_binary_after_output_closed() {
    let fx = fixture();
    fx.connection.output_closed.store(true, Ordering::SeqCst);

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    fx.session
        .write_binary_range(
            (),
            move |_, _| flag.store(true, Ordering::SeqCst),
            &[0x01, 0x02],
            0,
            2,
        )
        .unwrap();

    assert!(fx.pipeline.calls.lock().is_empty());
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn test_incoming_until_input_closed() {
    let fx = fixture();

    fx.session.incoming_frame(Frame::text("hi"));
    assert_eq!(fx.handler.frames.lock().as_slice(), &[Frame::text("hi")]);

    fx.connection.input_closed.store(true, Ordering::SeqCst);
    fx.session.incoming_frame(Frame::text("again"));
    fx.session.incoming_error(WebSocketError::InvalidFragment);

    assert_eq!(fx.handler.frames.lock().len(), 1);
    assert!(fx.handler.errors.lock().is_empty());
}

#[test]
fn test_every_write_is_one_fin_frame() {
    let fx = fixture();

    fx.session.write_text((), |_, _| {}, "t").unwrap();
    fx.session.write_binary((), |_, _| {}, vec![0u8; 4096]).unwrap();
    fx.session
        .write_binary_range((), |_, _| {}, &[1, 2, 3, 4, 5], 2, 3)
        .unwrap();
    fx.session.ping((), |_, _| {}, vec![7u8; 125]).unwrap();

    let calls = fx.pipeline.calls.lock();
    let opcodes: Vec<OpCode> = calls.iter().map(Frame::opcode).collect();
    assert_eq!(
        opcodes,
        [OpCode::Text, OpCode::Binary, OpCode::Binary, OpCode::Ping]
    );
    assert!(calls.iter().all(Frame::fin));
    assert_eq!(calls[1].payload().len(), 4096);
    assert_eq!(calls[2].payload().as_ref(), &[3, 4, 5]);
    assert_eq!(calls[3].payload().len(), 125);
}

#[test]
fn test_connect_before_callback() {
    let fx = fixture();

    fx.session.on_connect().unwrap();

    assert!(fx.handler.greeted.load(Ordering::SeqCst));
    assert!(fx.handler.session.is_attached());
    let calls = fx.pipeline.calls.lock();
    assert_eq!(calls[0].to_str().unwrap(), "welcome");
}

#[test]
fn test_delegation_is_live() {
    let fx = fixture();
    let conn = &fx.connection;
    let session = &fx.session;

    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(!session.is_open());
    assert!(session.remote_addr().is_none());

    *conn.state.lock() = Some(ConnectionState::Open);
    conn.open.store(true, Ordering::SeqCst);
    conn.reading.store(true, Ordering::SeqCst);
    *conn.remote.lock() = Some("10.0.0.1:443".parse().unwrap());

    assert_eq!(session.state(), ConnectionState::Open);
    assert!(session.is_open());
    assert!(session.is_reading());
    assert_eq!(session.remote_addr().unwrap().port(), 443);

    *conn.state.lock() = Some(ConnectionState::Closing);
    conn.reading.store(false, Ordering::SeqCst);
    conn.input_closed.store(true, Ordering::SeqCst);

    assert_eq!(session.state(), ConnectionState::Closing);
    assert!(!session.is_reading());
    assert!(session.is_input_closed());
    assert!(!session.is_output_closed());

    let token = session.suspend();
    assert_eq!(conn.suspends.load(Ordering::SeqCst), 1);
    token.resume();
    assert_eq!(conn.suspends.load(Ordering::SeqCst), 0);
}

#[test]
fn test_close_and_disconnect_delegate() {
    let fx = fixture();

    fx.session.close();
    fx.session.close_with(CloseCode::Policy, "too chatty");
    fx.session.disconnect();
    fx.session
        .on_close_handshake(CloseDirection::Incoming, &CloseInfo::new(CloseCode::Away, "bye"));

    assert_eq!(
        fx.connection.closes.lock().as_slice(),
        &[
            (CloseCode::Normal, String::new()),
            (CloseCode::Policy, String::from("too chatty")),
        ]
    );
    assert_eq!(fx.connection.disconnects.load(Ordering::SeqCst), 1);

    let handshakes = fx.connection.handshakes.lock();
    assert_eq!(handshakes[0].0, CloseDirection::Incoming);
    assert_eq!(handshakes[0].1.reason(), "bye");

    // the session never writes CLOSE frames itself
    assert!(fx.pipeline.calls.lock().is_empty());
}

#[test]
fn test_policy_enforcer_in_front_of_session() {
    let fx = fixture();
    let policy = WebSocketPolicy::new_server_policy()
        .with_max_text_message_size(8)
        .with_utf8();
    let inbound = PolicyEnforcer::new(policy, Arc::clone(&fx.session));

    inbound.incoming_frame(Frame::text("short"));
    inbound.incoming_frame(Frame::text("definitely too long"));
    inbound.incoming_frame(Frame::text(&[0xC3, 0x28][..]));

    assert_eq!(fx.handler.frames.lock().len(), 1);
    let errors = fx.handler.errors.lock();
    assert!(matches!(errors[0], WebSocketError::MessageTooLarge { .. }));
    assert!(matches!(errors[1], WebSocketError::InvalidUTF8));
    assert_eq!(errors[1].close_code(), CloseCode::Invalid);
}

#[tokio::test]
async fn test_session_over_frame_writer() {
    let (tx, rx) = futures::channel::mpsc::unbounded::<Frame>();
    let (writer, task) = FrameWriter::spawn(tx.sink_map_err(|_| WebSocketError::ConnectionClosed));

    let connection = Arc::new(LocalConnection::new());
    connection.on_opened();
    let handler = Arc::new(RecordingHandler::default());
    let session = Session::new(
        Arc::clone(&handler),
        connection.clone(),
        WebSocketPolicy::default(),
        "",
    );
    session.set_outgoing(Arc::new(writer.clone()));
    session.on_connect().unwrap();

    session.send_text("one").await.unwrap();
    session.send_binary(&b"two"[..]).await.unwrap();
    session.send_ping("three").await.unwrap();

    session.close();
    assert!(matches!(
        session.send_text("after close").await,
        Err(WebSocketError::ConnectionClosed)
    ));

    drop(session);
    writer.shutdown();
    task.await.unwrap().unwrap();

    let frames: Vec<Frame> = rx.collect().await;
    let payloads: Vec<&[u8]> = frames.iter().map(|f| f.payload().as_ref()).collect();
    assert_eq!(
        payloads,
        [&b"welcome"[..], &b"one"[..], &b"two"[..], &b"three"[..]]
    );
    assert_eq!(connection.close_info().unwrap().code(), CloseCode::Normal);
}

/// Pipeline without any synchronization of its own, counting calls that overlap.
#[derive(Default)]
struct OverlapPipeline {
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
    outputs: AtomicUsize,
}

impl OutgoingFrames for OverlapPipeline {
    fn output(&self, frame: Frame, completion: Completion) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        // widen the window a concurrent call would hit
        for _ in 0..frame.payload().len() % 4 + 1 {
            std::thread::yield_now();
        }
        self.outputs.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        completion.succeeded();
    }
}

#[test]
fn test_concurrent_writes_never_overlap() {
    const THREADS: usize = 8;
    const WRITES: usize = 500;

    let fx = fixture();
    let pipeline = Arc::new(OverlapPipeline::default());
    fx.session.set_outgoing(pipeline.clone());
    let settled = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let session = &fx.session;
            let settled = &settled;
            s.spawn(move || {
                for i in 0..WRITES {
                    let counter = Arc::clone(settled);
                    let callback = move |_, res: wsession::Result<()>| {
                        assert!(res.is_ok());
                        counter.fetch_add(1, Ordering::SeqCst);
                    };
                    let res = match i % 3 {
                        0 => session.write_text(t, callback, format!("{t}:{i}")),
                        1 => session.write_binary(t, callback, vec![t as u8; i % 7]),
                        _ => session.ping(t, callback, vec![i as u8; 3]),
                    };
                    res.unwrap();
                }
            });
        }
    });

    assert_eq!(pipeline.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.outputs.load(Ordering::SeqCst), THREADS * WRITES);
    assert_eq!(settled.load(Ordering::SeqCst), THREADS * WRITES);
}

#[test]
fn test_outgoing_replaced_under_load() {
    const THREADS: usize = 4;
    const WRITES: usize = 500;

    let fx = fixture();
    let first = Arc::new(RecordingPipeline::default());
    let second = Arc::new(RecordingPipeline::default());
    fx.session.set_outgoing(first.clone());
    let settled = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let session = &fx.session;
            let settled = &settled;
            s.spawn(move || {
                for i in 0..WRITES {
                    let counter = Arc::clone(settled);
                    session
                        .write_text(
                            (),
                            move |_, _| {
                                counter.fetch_add(1, Ordering::SeqCst);
                            },
                            format!("{t}:{i}"),
                        )
                        .unwrap();
                }
            });
        }

        for round in 0..200 {
            let next: Arc<dyn OutgoingFrames> = if round % 2 == 0 {
                second.clone()
            } else {
                first.clone()
            };
            fx.session.set_outgoing(next);
            std::thread::yield_now();
        }
    });

    // every frame went to exactly one pipeline, once
    let mut seen: Vec<String> = first
        .calls
        .lock()
        .iter()
        .chain(second.calls.lock().iter())
        .map(|f| f.to_str().unwrap().to_owned())
        .collect();
    seen.sort();

    let mut expected: Vec<String> = (0..THREADS)
        .flat_map(|t| (0..WRITES).map(move |i| format!("{t}:{i}")))
        .collect();
    expected.sort();

    assert_eq!(seen, expected);
    assert_eq!(settled.load(Ordering::SeqCst), THREADS * WRITES);
}
