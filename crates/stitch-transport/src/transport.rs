//! トランスポート状態機械
//!
//! セッションキー・トークン・送信先・チャンネルの寿命を管理する。
//! I/O は協調者に委譲し、結果は `handle_event` で受け取る。

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::grant::TokenGrant;
use crate::pool::{OutboundRequest, RequestPool};
use crate::provider::{ChannelId, ChannelProvider, PostFailure, RequestId, RequestSender, TransportEvent};
use crate::{DEFAULT_CONNECT_URI, DEFAULT_REQUEST_POOL_CAPACITY};

/// トランスポートの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// トークン発行の POST 先（末尾は必ず `/`）
    pub connect_uri: String,
    pub request_pool_capacity: usize,
}

impl TransportConfig {
    pub fn new(connect_uri: &str) -> Self {
        let mut uri = connect_uri.to_string();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        TransportConfig {
            connect_uri: uri,
            request_pool_capacity: DEFAULT_REQUEST_POOL_CAPACITY,
        }
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.request_pool_capacity = capacity;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_URI)
    }
}

/// `handle_event` の結果として上位層に知らせる出来事
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotice {
    /// トークンが発行され、チャンネルを開き始めた
    Granted { key: String },
    /// トークン発行に失敗した（キーはクリア済み）
    GrantFailed(TransportError),
    /// チャンネルが開いた
    Opened,
    /// チャンネルからメッセージが届いた
    Message(String),
    /// チャンネルがエラーを報告した
    Error { code: String, description: String },
    /// チャンネルが閉じられた（状態はクリア済み）
    Closed,
    /// メッセージの POST が失敗した
    SendFailed(TransportError),
}

/// プッシュチャンネルのトランスポート
///
/// ## 状態
///
/// ```text
/// idle ──connect──▶ granting ──grant──▶ opening ──opened──▶ open
///   ▲                  │                                     │
///   └──────── disconnect / grant failure / closed ───────────┘
/// ```
pub struct Transport {
    connect_uri: String,
    sender: Box<dyn RequestSender>,
    provider: Box<dyn ChannelProvider>,
    /// セッションキー
    key: Option<String>,
    /// チャンネルトークン（サーバーからの秘密値）
    token: Option<String>,
    /// メッセージの POST 先
    endpoint: Option<String>,
    /// サーバーが割り当てたクライアント ID
    client_id: Option<String>,
    /// 送信 Body の共通接頭辞（`k=<key>&f=<id>&m=`）
    message_base: String,
    /// 開いている（または開きかけの）チャンネル
    channel: Option<ChannelId>,
    /// チャンネルの opened 通知を受け取ったか
    channel_open: bool,
    /// 応答待ちのトークン発行リクエスト
    grant_request: Option<RequestId>,
    /// 完了待ちのリクエスト
    in_flight: HashMap<RequestId, OutboundRequest>,
    pool: RequestPool,
    next_request: u64,
    next_channel: u64,
}

impl Transport {
    pub fn new(
        config: TransportConfig,
        sender: Box<dyn RequestSender>,
        provider: Box<dyn ChannelProvider>,
    ) -> Self {
        Transport {
            connect_uri: config.connect_uri,
            sender,
            provider,
            key: None,
            token: None,
            endpoint: None,
            client_id: None,
            message_base: String::new(),
            channel: None,
            channel_open: false,
            grant_request: None,
            in_flight: HashMap::new(),
            pool: RequestPool::new(config.request_pool_capacity),
            next_request: 1,
            next_channel: 1,
        }
    }

    pub fn connect_uri(&self) -> &str {
        &self.connect_uri
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn is_open(&self) -> bool {
        self.channel_open
    }

    /// トークン発行の応答待ちか
    pub fn is_granting(&self) -> bool {
        self.grant_request.is_some()
    }

    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// サーバーにトークンを要求する
    ///
    /// 既存のチャンネルがあれば先に切断する。
    ///
    /// # 引数
    /// - `key`: 参加するセッションのキー。`None` ならサーバーに新しいキーを生成させる
    pub fn connect(&mut self, key: Option<&str>) -> RequestId {
        if self.channel.is_some() || self.grant_request.is_some() {
            self.disconnect();
        }

        self.key = key.map(str::to_string);
        let uri = match key {
            Some(key) => format!("{}{}", self.connect_uri, key),
            None => self.connect_uri.clone(),
        };

        let request = self.post(&uri, &[]);
        self.grant_request = Some(request);

        info!(target: "stitch.transport", %request, uri = %uri, "requesting channel token");
        request
    }

    /// チャンネル経由で相手にメッセージを送る
    ///
    /// # エラー
    /// - トークン未発行で送信先がない → `NotOpen`
    pub fn send(&mut self, payload: &str) -> Result<RequestId, TransportError> {
        let endpoint = self.endpoint.clone().ok_or(TransportError::NotOpen)?;
        let base = core::mem::take(&mut self.message_base);
        let request = self.post(&endpoint, &[base.as_str(), payload]);
        self.message_base = base;
        Ok(request)
    }

    /// チャンネルを閉じ、キーとトークンを含むすべての接続状態を破棄する
    ///
    /// 応答待ちのリクエストも忘れるので、後から届いた完了通知は無視される。
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.provider.close(channel);
            info!(target: "stitch.transport", %channel, "channel closed locally");
        }
        self.reset();
    }

    /// 協調者からの通知を処理する
    ///
    /// # 戻り値
    /// 上位層に知らせる出来事。古いチャンネル・リクエストの通知なら `None`
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<TransportNotice> {
        match event {
            TransportEvent::PostCompleted { request, outcome } => {
                self.complete_post(request, outcome)
            }
            TransportEvent::ChannelOpened { channel } => {
                self.check_channel(channel)?;
                self.channel_open = true;
                info!(target: "stitch.transport", %channel, "channel opened");
                Some(TransportNotice::Opened)
            }
            TransportEvent::ChannelMessage { channel, data } => {
                self.check_channel(channel)?;
                Some(TransportNotice::Message(data))
            }
            TransportEvent::ChannelError {
                channel,
                code,
                description,
            } => {
                self.check_channel(channel)?;
                warn!(target: "stitch.transport", %channel, %code, %description, "channel error");
                Some(TransportNotice::Error { code, description })
            }
            TransportEvent::ChannelClosed { channel } => {
                self.check_channel(channel)?;
                // プロバイダ側で既に閉じているので close は呼ばない
                self.channel = None;
                self.reset();
                info!(target: "stitch.transport", %channel, "channel closed by provider");
                Some(TransportNotice::Closed)
            }
        }
    }

    // ===== Private メソッド =====

    fn reset(&mut self) {
        self.channel_open = false;
        self.token = None;
        self.key = None;
        self.endpoint = None;
        self.client_id = None;
        self.message_base.clear();
        self.grant_request = None;
        // チャンネルがないのでプールには戻さない
        self.in_flight.clear();
    }

    fn check_channel(&self, channel: ChannelId) -> Option<()> {
        if self.channel == Some(channel) {
            Some(())
        } else {
            debug!(target: "stitch.transport", %channel, "dropping event for stale channel");
            None
        }
    }

    fn post(&mut self, uri: &str, body_parts: &[&str]) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;

        let mut request = self.pool.acquire(id);
        request.fill(uri, body_parts);
        self.sender.post(id, request.uri(), request.body());
        self.in_flight.insert(id, request);
        id
    }

    fn complete_post(
        &mut self,
        request: RequestId,
        outcome: Result<String, PostFailure>,
    ) -> Option<TransportNotice> {
        let Some(finished) = self.in_flight.remove(&request) else {
            debug!(target: "stitch.transport", %request, "dropping completion for forgotten request");
            return None;
        };

        let notice = if self.grant_request == Some(request) {
            self.grant_request = None;
            Some(self.complete_grant(outcome))
        } else {
            match outcome {
                Ok(_) => None,
                Err(failure) => {
                    warn!(target: "stitch.transport", %request, %failure, "message post failed");
                    Some(TransportNotice::SendFailed(TransportError::PostFailed(failure)))
                }
            }
        };

        // チャンネルがある間だけプールに戻す
        if self.channel.is_some() {
            self.pool.release(finished);
        }

        notice
    }

    fn complete_grant(&mut self, outcome: Result<String, PostFailure>) -> TransportNotice {
        let grant = outcome
            .map_err(TransportError::PostFailed)
            .and_then(|body| TokenGrant::parse(&body))
            .and_then(|grant| match &self.key {
                Some(requested) if *requested != grant.key => Err(TransportError::KeyMismatch {
                    requested: requested.clone(),
                    granted: grant.key,
                }),
                _ => Ok(grant),
            });

        match grant {
            Ok(grant) => {
                let key = grant.key.clone();
                self.open_channel(grant);
                TransportNotice::Granted { key }
            }
            Err(err) => {
                warn!(target: "stitch.transport", error = %err, "token grant failed");
                self.key = None;
                TransportNotice::GrantFailed(err)
            }
        }
    }

    fn open_channel(&mut self, grant: TokenGrant) {
        let mut base = format!("k={}", grant.key);
        if let Some(id) = &grant.id {
            base.push_str("&f=");
            base.push_str(id);
        }
        base.push_str("&m=");

        let channel = ChannelId(self.next_channel);
        self.next_channel += 1;

        self.message_base = base;
        self.key = Some(grant.key);
        self.endpoint = Some(grant.endpoint);
        self.client_id = grant.id;
        self.channel = Some(channel);
        self.provider.open(channel, &grant.token);
        self.token = Some(grant.token);

        info!(
            target: "stitch.transport",
            %channel,
            key = self.key.as_deref().unwrap_or_default(),
            "token granted, opening channel"
        );
    }
}
