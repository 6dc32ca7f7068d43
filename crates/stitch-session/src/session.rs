//! セッション本体
//!
//! トランスポート、ストリームの Writer / Reader、スロットル、状態機械を束ねる。
//!
//! ## 受信メッセージの振り分け
//!
//! | 先頭 | 種類 | 処理 |
//! |------|------|------|
//! | `[`  | 連続ストリームフレーム | Reader でデコードし、再生キューに積む |
//! | `{`  | 離散イベント（JSON） | そのままイベント通知 |
//! | その他 | 制御文字列 | `connected` / `disconnected` で状態遷移、それ以外は無視 |

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use stitch_codec::{split_frame, EdgeMarker, ReaderSet, SampleEvent, StreamWriter, Value};
use stitch_transport::{ChannelProvider, RequestSender, Transport, TransportEvent, TransportNotice};
use tracing::{debug, info, warn};

use crate::clock::ClockSync;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::AppEvent;
use crate::notify::{Notifier, SubscriptionId};
use crate::role::{Confirmation, Role};
use crate::status::SessionStatus;
use crate::throttle::Throttle;
use crate::{CONNECTED_MESSAGE, DISCONNECTED_MESSAGE, POLL_MESSAGE};

struct Notifications {
    next_id: u64,
    status: Notifier<SessionStatus>,
    event: Notifier<AppEvent>,
    sample: Notifier<SampleEvent>,
    error: Notifier<SessionError>,
}

impl Notifications {
    fn new() -> Self {
        Notifications {
            next_id: 0,
            status: Notifier::new(),
            event: Notifier::new(),
            sample: Notifier::new(),
            error: Notifier::new(),
        }
    }

    fn allocate(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// ホストとコントローラーで共通のセッション
///
/// 時刻はすべて呼び出し側が `now_ms`（単調増加するミリ秒）で渡す。
/// タイマーの期限が来たら `tick` を呼ぶこと。
pub struct Session {
    role: Role,
    config: SessionConfig,
    transport: Transport,
    status: SessionStatus,
    confirmation: Confirmation,
    throttle: Throttle,
    /// ストリーム名 → Writer
    writers: HashMap<String, StreamWriter>,
    next_stream: u64,
    readers: ReaderSet,
    clock: ClockSync,
    notifications: Notifications,
}

impl Session {
    pub fn new(
        role: Role,
        config: SessionConfig,
        sender: Box<dyn RequestSender>,
        provider: Box<dyn ChannelProvider>,
    ) -> Self {
        let transport = Transport::new(config.transport_config(), sender, provider);
        Session {
            role,
            transport,
            status: SessionStatus::Unknown,
            confirmation: Confirmation::for_role(role, config.poll_interval_ms),
            throttle: Throttle::new(config.throttle_ms, config.throttle_idle_timeout_ms),
            writers: HashMap::new(),
            next_stream: 0,
            readers: ReaderSet::new(config.dispatch_lookahead_ms, config.min_reschedule_ms),
            clock: ClockSync::new(config.replay_anchor),
            notifications: Notifications::new(),
            config,
        }
    }

    // ===== 状態の参照 =====

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 現在のセッションキー
    pub fn key(&self) -> Option<&str> {
        self.transport.key()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn readers(&self) -> &ReaderSet {
        &self.readers
    }

    /// 固定済みの時計オフセット
    pub fn clock_offset_ms(&self) -> Option<i64> {
        self.clock.offset_ms()
    }

    /// ストリームに割り当てた短縮 ID（`g0`, `g1`, ...）
    pub fn stream_id(&self, name: &str) -> Option<&str> {
        self.writers.get(name).map(StreamWriter::id)
    }

    /// 最も早いタイマー期限（ポーリング・スロットル・ディスパッチ）
    pub fn next_wakeup(&self) -> Option<u64> {
        [
            self.confirmation.next_due_ms(),
            self.throttle.next_due_ms(),
            self.readers.next_wakeup(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ===== 通知の購読 =====

    pub fn subscribe_status(
        &mut self,
        callback: impl FnMut(&SessionStatus) + 'static,
    ) -> SubscriptionId {
        let id = self.notifications.allocate();
        self.notifications.status.subscribe(id, Box::new(callback));
        id
    }

    pub fn subscribe_event(&mut self, callback: impl FnMut(&AppEvent) + 'static) -> SubscriptionId {
        let id = self.notifications.allocate();
        self.notifications.event.subscribe(id, Box::new(callback));
        id
    }

    pub fn subscribe_sample(
        &mut self,
        callback: impl FnMut(&SampleEvent) + 'static,
    ) -> SubscriptionId {
        let id = self.notifications.allocate();
        self.notifications.sample.subscribe(id, Box::new(callback));
        id
    }

    pub fn subscribe_error(
        &mut self,
        callback: impl FnMut(&SessionError) + 'static,
    ) -> SubscriptionId {
        let id = self.notifications.allocate();
        self.notifications.error.subscribe(id, Box::new(callback));
        id
    }

    /// 購読を解除する
    ///
    /// # 戻り値
    /// 該当する購読があった場合 `true`
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let n = &mut self.notifications;
        n.status.unsubscribe(id)
            || n.event.unsubscribe(id)
            || n.sample.unsubscribe(id)
            || n.error.unsubscribe(id)
    }

    // ===== 操作 =====

    /// 離散イベントを送る
    ///
    /// # エラー
    /// - 接続中でない → `NotConnected`
    pub fn send_event(&mut self, event: &AppEvent) -> Result<(), SessionError> {
        self.require_connected()?;
        let request = self.transport.send(&event.to_json())?;
        debug!(target: "stitch.session", %request, event_type = event.event_type(), "event sent");
        Ok(())
    }

    /// JSON 文字列の離散イベントを検査してから送る
    ///
    /// # エラー
    /// - 接続中でない → `NotConnected`
    /// - `type` を持つ JSON オブジェクトでない → `InvalidEvent`
    pub fn send_event_json(&mut self, json: &str) -> Result<(), SessionError> {
        self.require_connected()?;
        let event = AppEvent::parse(json)?;
        self.send_event(&event)
    }

    /// 連続ストリームにサンプルを書き込む
    ///
    /// 送信はスロットルタイマーの周期でまとめて行う。
    /// タイマーが止まっていた場合はこの呼び出しで即座に送る。
    ///
    /// # 引数
    /// - `name`: ストリーム名（初出時に短縮 ID を割り当てる）
    /// - `data`: 更新するプロパティ
    /// - `edge`: ジェスチャの開始 / 終了
    ///
    /// # エラー
    /// - 接続中でない → `NotConnected`
    /// - 名前・キー・値に `,` を含む → `Codec(InvalidToken)`
    pub fn write_stream<I, K, V>(
        &mut self,
        name: &str,
        data: I,
        edge: Option<EdgeMarker>,
        now_ms: u64,
    ) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.require_connected()?;

        let writer = match self.writers.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let writer = StreamWriter::new(name, format!("g{}", self.next_stream))?;
                self.next_stream += 1;
                debug!(target: "stitch.session", stream = name, id = writer.id(), "stream assigned");
                entry.insert(writer)
            }
        };

        let relative_ms = self.throttle.open_window(now_ms);
        writer.write(data, relative_ms, edge, self.throttle.tokens_mut())?;

        if self.throttle.restart(now_ms) {
            self.flush(now_ms);
        }
        Ok(())
    }

    /// 期限に達したタイマーを処理する
    ///
    /// 順序: 接続確認ポーリング → スロットル → 受信サンプルのディスパッチ
    pub fn tick(&mut self, now_ms: u64) {
        if self.confirmation.poll_due(now_ms) {
            debug!(target: "stitch.session", now_ms, "polling for peer");
            self.post(POLL_MESSAGE);
        }

        if let Some(frame) = self.throttle.on_timer(now_ms) {
            self.post(&frame);
        }

        for sample in self.readers.dispatch_due(now_ms) {
            self.notifications.sample.notify(&sample);
        }
    }

    /// 協調者からの通知を処理する
    pub fn handle_transport_event(&mut self, event: TransportEvent, now_ms: u64) {
        let Some(notice) = self.transport.handle_event(event) else {
            return;
        };

        match notice {
            TransportNotice::Granted { key } => {
                info!(target: "stitch.session", key = %key, "session key granted");
            }
            TransportNotice::GrantFailed(err) => {
                self.set_status(SessionStatus::Unknown, now_ms);
                self.notify_error(SessionError::ConnectionFailed(err));
            }
            TransportNotice::Opened => {
                let status = self.confirmation.status_on_open();
                self.set_status(status, now_ms);
            }
            TransportNotice::Message(data) => self.route(&data, now_ms),
            TransportNotice::Error { code, description } => {
                self.notify_error(SessionError::Channel { code, description });
            }
            TransportNotice::Closed => {
                self.stop_activity();
                self.set_status(SessionStatus::Disconnected, now_ms);
                // チャンネルがないのでポーリングはしない
                self.confirmation.cancel();
            }
            TransportNotice::SendFailed(err) => {
                self.notify_error(SessionError::SendFailed(err));
            }
        }
    }

    /// チャンネルを閉じ、タイマー・バッファ・再生キューを破棄して `Unknown` に戻す
    ///
    /// 以降に届く古いチャンネル・リクエストの通知は無視される。
    pub fn disconnect(&mut self, now_ms: u64) {
        self.transport.disconnect();
        self.stop_activity();
        self.set_status(SessionStatus::Unknown, now_ms);
        info!(target: "stitch.session", "session disconnected");
    }

    // ===== crate 内部 =====

    pub(crate) fn begin_connect(&mut self, key: Option<&str>, now_ms: u64) {
        self.stop_activity();
        self.writers.clear();
        self.next_stream = 0;

        self.set_status(SessionStatus::Contacting, now_ms);
        let request = self.transport.connect(key);
        info!(target: "stitch.session", role = ?self.role, %request, "connecting");
    }

    /// 状態を更新してから通知する（同じ状態なら何もしない）
    pub(crate) fn set_status(&mut self, status: SessionStatus, now_ms: u64) {
        if self.status == status {
            return;
        }
        let previous = self.status;
        self.status = status;
        self.confirmation.on_status(status, now_ms);

        info!(target: "stitch.session", from = %previous, to = %status, "status changed");
        self.notifications.status.notify(&status);
    }

    // ===== Private メソッド =====

    fn require_connected(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Connected => Ok(()),
            status => Err(SessionError::NotConnected(status)),
        }
    }

    fn stop_activity(&mut self) {
        self.throttle.stop();
        self.confirmation.cancel();
        self.readers.clear_pending();
    }

    fn flush(&mut self, now_ms: u64) {
        if let Some(frame) = self.throttle.take_frame(now_ms) {
            self.post(&frame);
        }
    }

    fn post(&mut self, payload: &str) {
        if let Err(err) = self.transport.send(payload) {
            warn!(target: "stitch.session", error = %err, "dropping outbound message");
        }
    }

    fn notify_error(&mut self, err: SessionError) {
        self.notifications.error.notify(&err);
    }

    fn route(&mut self, message: &str, now_ms: u64) {
        match message.as_bytes().first() {
            Some(b'[') => self.receive_frame(message, now_ms),
            Some(b'{') => self.receive_event(message),
            _ => self.receive_control(message, now_ms),
        }
    }

    fn receive_frame(&mut self, message: &str, now_ms: u64) {
        let frame = match split_frame(message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target: "stitch.session", error = %err, "dropping malformed frame");
                return;
            }
        };

        let base_ms = self.clock.base_ms(frame.header.start_ms, now_ms);
        match self.readers.read_frame(&frame.tokens, now_ms, base_ms) {
            Ok(samples) => {
                debug!(target: "stitch.session", samples, base_ms, "frame decoded");
            }
            Err(err) => {
                warn!(target: "stitch.session", error = %err, "stopped decoding frame");
            }
        }
    }

    fn receive_event(&mut self, message: &str) {
        match AppEvent::parse(message) {
            Ok(event) => self.notifications.event.notify(&event),
            Err(err) => {
                warn!(target: "stitch.session", error = %err, "dropping malformed event");
            }
        }
    }

    fn receive_control(&mut self, message: &str, now_ms: u64) {
        match message {
            CONNECTED_MESSAGE => {
                if matches!(
                    self.status,
                    SessionStatus::Connecting | SessionStatus::Disconnected
                ) {
                    // 相手が入れ替わっている可能性があるのでスキーマを送り直す。
                    // 旧 ID で溜まったサンプルは新しい相手には読めないので捨てる
                    self.writers.clear();
                    self.throttle.discard();
                    self.set_status(SessionStatus::Connected, now_ms);
                }
            }
            DISCONNECTED_MESSAGE => {
                if self.status == SessionStatus::Connected {
                    self.set_status(SessionStatus::Disconnected, now_ms);
                }
            }
            other => {
                debug!(target: "stitch.session", message = other, "ignoring control message");
            }
        }
    }
}
