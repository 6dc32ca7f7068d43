//! stitch-wasm 統合テスト
//!
//! ホストとコントローラーを、メモリ上の中継サーバー経由でつないで
//! トークン発行 → 接続確認 → 連続ストリーム → 離散イベント → 切断 までを通しで確認する。

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use stitch_codec::{SampleEvent, Value};
use stitch_session::{
    AppEvent, Controller, EdgeMarker, Host, Session, SessionConfig, SessionError, SessionStatus,
};
use stitch_transport::{ChannelId, ChannelProvider, RequestId, RequestSender, TransportEvent};
use stitch_wasm::convert::{sample_to_json, stream_data_from_json};

// ==============================================================
// ヘルパー: メモリ上の中継サーバー
// ==============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Host,
    Controller,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Host => 0,
            Side::Controller => 1,
        }
    }

    fn other(self) -> Side {
        match self {
            Side::Host => Side::Controller,
            Side::Controller => Side::Host,
        }
    }

    /// クライアント ID の末尾（キー + "1" / "2"）
    fn suffix(self) -> &'static str {
        match self {
            Side::Host => "1",
            Side::Controller => "2",
        }
    }
}

/// 片側のセッションが外に出したリクエスト
#[derive(Default)]
struct Wire {
    posts: VecDeque<(RequestId, String, String)>,
    opens: VecDeque<(ChannelId, String)>,
    closes: VecDeque<ChannelId>,
}

struct Endpoint(Rc<RefCell<Wire>>);

impl RequestSender for Endpoint {
    fn post(&mut self, request: RequestId, uri: &str, body: &str) {
        self.0
            .borrow_mut()
            .posts
            .push_back((request, uri.to_string(), body.to_string()));
    }
}

impl ChannelProvider for Endpoint {
    fn open(&mut self, channel: ChannelId, token: &str) {
        self.0
            .borrow_mut()
            .opens
            .push_back((channel, token.to_string()));
    }

    fn close(&mut self, channel: ChannelId) {
        self.0.borrow_mut().closes.push_back(channel);
    }
}

fn endpoint() -> (Box<dyn RequestSender>, Box<dyn ChannelProvider>, Rc<RefCell<Wire>>) {
    let wire = Rc::new(RefCell::new(Wire::default()));
    (
        Box::new(Endpoint(wire.clone())),
        Box::new(Endpoint(wire.clone())),
        wire,
    )
}

/// セッションキーの払い出しとメッセージ中継を行う
struct Relay {
    wires: [Rc<RefCell<Wire>>; 2],
    sessions: HashSet<String>,
    next_key: u32,
    channels: [Option<ChannelId>; 2],
    /// 中継したメッセージ（送信側, ペイロード）
    relayed: Vec<(Side, String)>,
}

impl Relay {
    fn new(host: Rc<RefCell<Wire>>, controller: Rc<RefCell<Wire>>) -> Self {
        Relay {
            wires: [host, controller],
            sessions: HashSet::new(),
            next_key: 1000,
            channels: [None, None],
            relayed: Vec::new(),
        }
    }

    /// 双方のリクエストが尽きるまで処理し、結果をセッションに戻す
    fn pump(&mut self, host: &mut Session, controller: &mut Session, now_ms: u64) {
        loop {
            let mut events = Vec::new();
            for side in [Side::Host, Side::Controller] {
                self.drain(side, &mut events);
            }
            if events.is_empty() {
                break;
            }
            for (side, event) in events {
                match side {
                    Side::Host => host.handle_transport_event(event, now_ms),
                    Side::Controller => controller.handle_transport_event(event, now_ms),
                }
            }
        }
    }

    fn drain(&mut self, side: Side, events: &mut Vec<(Side, TransportEvent)>) {
        let wire = self.wires[side.index()].clone();
        let mut wire = wire.borrow_mut();

        while wire.closes.pop_front().is_some() {
            self.channels[side.index()] = None;
            self.deliver(side.other(), "disconnected", events);
        }
        while let Some((channel, _token)) = wire.opens.pop_front() {
            self.channels[side.index()] = Some(channel);
            events.push((side, TransportEvent::ChannelOpened { channel }));
        }
        while let Some((request, uri, body)) = wire.posts.pop_front() {
            let response = if let Some(key) = uri.strip_prefix("/connect/") {
                self.grant(side, key)
            } else {
                self.relay(side, &body, events);
                String::new()
            };
            events.push((
                side,
                TransportEvent::PostCompleted {
                    request,
                    outcome: Ok(response),
                },
            ));
        }
    }

    fn grant(&mut self, side: Side, key: &str) -> String {
        let key = match (side, key) {
            (Side::Host, "") => {
                let key = self.next_key.to_string();
                self.next_key += 1;
                key
            }
            (_, key) => key.to_string(),
        };

        match side {
            Side::Host => {
                self.sessions.insert(key.clone());
            }
            Side::Controller if !self.sessions.contains(&key) => {
                return r#"{"error":"unknown session"}"#.to_string();
            }
            Side::Controller => {}
        }

        format!(
            r#"{{"key":"{key}","token":"tok-{key}-{id}","endpoint":"/message/{key}","id":"{key}{id}"}}"#,
            id = side.suffix()
        )
    }

    fn relay(&mut self, from: Side, body: &str, events: &mut Vec<(Side, TransportEvent)>) {
        let payload = body
            .split_once("&m=")
            .map(|(_, payload)| payload)
            .unwrap_or_default();
        self.relayed.push((from, payload.to_string()));

        if payload == "_poll" {
            self.deliver(Side::Host, "connected", events);
            self.deliver(Side::Controller, "connected", events);
        } else {
            self.deliver(from.other(), payload, events);
        }
    }

    fn deliver(&self, to: Side, data: &str, events: &mut Vec<(Side, TransportEvent)>) {
        if let Some(channel) = self.channels[to.index()] {
            events.push((
                to,
                TransportEvent::ChannelMessage {
                    channel,
                    data: data.to_string(),
                },
            ));
        }
    }
}

struct Stage {
    host: Host,
    controller: Controller,
    relay: Relay,
}

impl Stage {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("stitch=debug")
            .try_init();

        let (host_sender, host_provider, host_wire) = endpoint();
        let (ctl_sender, ctl_provider, ctl_wire) = endpoint();
        Stage {
            host: Host::new(SessionConfig::default(), host_sender, host_provider),
            controller: Controller::new(SessionConfig::default(), ctl_sender, ctl_provider),
            relay: Relay::new(host_wire, ctl_wire),
        }
    }

    fn pump(&mut self, now_ms: u64) {
        self.relay.pump(&mut self.host, &mut self.controller, now_ms);
    }

    fn tick(&mut self, now_ms: u64) {
        self.host.tick(now_ms);
        self.controller.tick(now_ms);
        self.pump(now_ms);
        self.host.tick(now_ms);
        self.controller.tick(now_ms);
    }

    /// ホストがキーを発行し、コントローラーが参加してポーリングで接続を確認するまで進める
    fn connect(&mut self) -> String {
        self.host.connect(None, 0);
        self.pump(0);
        let code = self.host.code().map(str::to_string).unwrap();

        self.controller.connect(Some(&code), 100).unwrap();
        self.pump(100);
        self.tick(2100);
        code
    }
}

fn collect_samples(session: &mut Session) -> Rc<RefCell<Vec<SampleEvent>>> {
    let samples = Rc::new(RefCell::new(Vec::new()));
    let sink = samples.clone();
    session.subscribe_sample(move |sample| sink.borrow_mut().push(sample.clone()));
    samples
}

// ==============================================================
// テスト
// ==============================================================

#[test]
fn test_host_and_controller_connect() {
    let mut stage = Stage::new();
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let sink = statuses.clone();
    stage
        .controller
        .subscribe_status(move |status| sink.borrow_mut().push(*status));

    stage.host.connect(None, 0);
    assert_eq!(stage.host.status(), SessionStatus::Contacting);
    stage.pump(0);
    assert_eq!(stage.host.status(), SessionStatus::Disconnected);
    assert_eq!(stage.host.code(), Some("1000"));

    stage.controller.connect(Some("1000"), 100).unwrap();
    stage.pump(100);
    assert_eq!(stage.controller.status(), SessionStatus::Connecting);
    assert_eq!(stage.controller.next_wakeup(), Some(2100));

    stage.tick(2100);
    assert_eq!(stage.controller.status(), SessionStatus::Connected);
    assert_eq!(stage.host.status(), SessionStatus::Connected);
    assert_eq!(
        *statuses.borrow(),
        [
            SessionStatus::Contacting,
            SessionStatus::Connecting,
            SessionStatus::Connected,
        ]
    );

    // ポーリングの Body にはキーとクライアント ID が載る
    let polls: Vec<_> = stage
        .relay
        .relayed
        .iter()
        .filter(|(side, payload)| *side == Side::Controller && payload == "_poll")
        .collect();
    assert_eq!(polls.len(), 1);
}

#[test]
fn test_accel_stream_replayed_on_host() {
    let mut stage = Stage::new();
    stage.connect();
    let samples = collect_samples(&mut stage.host);

    // 1 本目: スキーマ登録付きで即時送信
    stage
        .controller
        .write_stream("accel", [("x", 1), ("y", 2)], None, 3000)
        .unwrap();

    // 2 本目: 250ms ウィンドウにまとめて送信
    let data = stream_data_from_json(r#"{"y":2}"#).unwrap();
    stage.controller.write_stream("accel", data, None, 3100).unwrap();
    stage
        .controller
        .write_stream("accel", [("y", 3)], None, 3150)
        .unwrap();
    stage.controller.tick(3250);

    // 2 本とも 300ms 遅れて同時に届く
    stage.pump(3300);
    let frame = stage.relay.relayed.last().map(|(_, p)| p.clone()).unwrap();
    assert_eq!(frame, "[3100,50,g0,0,1,2,g0,50,1,3]");
    assert_eq!(stage.host.clock_offset_ms(), Some(300));

    // 送信側の間隔で再生される
    let mut now = 3300;
    while let Some(next) = stage.host.next_wakeup() {
        now = next.max(now);
        stage.host.tick(now);
    }

    let samples = samples.borrow();
    let replayed: Vec<_> = samples
        .iter()
        .map(|s| (s.event_type(), s.get("y").cloned(), s.dispatch_time_ms))
        .collect();
    assert_eq!(
        replayed,
        [
            ("accelchange".to_string(), Some(Value::Number(2.0)), 3300),
            ("accelchange".to_string(), Some(Value::Number(2.0)), 3400),
            ("accelchange".to_string(), Some(Value::Number(3.0)), 3450),
        ]
    );
    assert_eq!(sample_to_json(&samples[2])["x"], 1.0);
}

#[test]
fn test_edge_markers_survive_burst() {
    let mut stage = Stage::new();
    stage.connect();
    let samples = collect_samples(&mut stage.host);

    stage
        .controller
        .write_stream("touch", [("x", 0)], Some(EdgeMarker::Start), 3000)
        .unwrap();
    for (i, t) in (3010..3100).step_by(10).enumerate() {
        stage
            .controller
            .write_stream("touch", [("x", i as i32 + 1)], None, t)
            .unwrap();
    }
    stage
        .controller
        .write_stream("touch", [("x", 99)], Some(EdgeMarker::End), 3100)
        .unwrap();

    // 遅れて一度に届けても開始・終了は落ちず、途中の変化はまとめられる
    stage.pump(3000);
    stage.tick(3250);
    stage.host.tick(4000);

    // 3010〜3090 の変化は最後の x=9 だけが残る
    let samples = samples.borrow();
    let kinds: Vec<_> = samples.iter().map(SampleEvent::event_type).collect();
    assert_eq!(kinds, ["touchstart", "touchchange", "touchend"]);
    assert_eq!(samples[1].get("x"), Some(&Value::Number(9.0)));
    assert_eq!(samples[1].dispatch_time_ms, 3090);
    assert_eq!(samples[2].get("x"), Some(&Value::Number(99.0)));
}

#[test]
fn test_discrete_events_both_ways() {
    let mut stage = Stage::new();
    stage.connect();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    stage
        .controller
        .subscribe_event(move |event| sink.borrow_mut().push(event.clone()));

    stage
        .host
        .send_event(&AppEvent::new("score").with("value", 3))
        .unwrap();
    stage.pump(3000);

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event_type(), "score");
    assert_eq!(received[0].get("value"), Some(&serde_json::json!(3)));
}

#[test]
fn test_unknown_session_fails_connection() {
    let mut stage = Stage::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    stage
        .controller
        .subscribe_error(move |err| sink.borrow_mut().push(err.clone()));

    stage.controller.connect(Some("9999"), 0).unwrap();
    stage.pump(0);

    assert_eq!(stage.controller.status(), SessionStatus::Unknown);
    assert_eq!(stage.controller.key(), None);
    assert!(matches!(
        errors.borrow().as_slice(),
        [SessionError::ConnectionFailed(_)]
    ));
}

#[test]
fn test_host_disconnect_notifies_controller() {
    let mut stage = Stage::new();
    stage.connect();

    stage.host.disconnect(3000);
    stage.pump(3000);

    assert_eq!(stage.host.status(), SessionStatus::Unknown);
    assert_eq!(stage.controller.status(), SessionStatus::Disconnected);
    // コントローラーはポーリングを再開する
    assert_eq!(stage.controller.next_wakeup(), Some(5000));
    assert_eq!(
        stage.controller.write_stream("accel", [("x", 1)], None, 3100),
        Err(SessionError::NotConnected(SessionStatus::Disconnected))
    );
}
