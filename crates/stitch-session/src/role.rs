//! ホスト / コントローラーの役割
//!
//! 共通の `Session` を包み、接続確認の方針（受け身で待つ / ポーリングする）と
//! `connect` のキーの扱いだけを差し替える。

use core::ops::{Deref, DerefMut};

use stitch_transport::{ChannelProvider, RequestSender};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::Session;
use crate::status::SessionStatus;
use crate::timer::IntervalTimer;

/// セッションの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// 大画面側。セッションキーを発行して相手を待つ
    Host,
    /// 手元の端末側。キーを指定して参加し、相手の存在をポーリングで確かめる
    Controller,
}

/// 接続確認の方針
#[derive(Debug, Clone)]
pub(crate) enum Confirmation {
    /// 相手からの `connected` を待つだけ
    Passive,
    /// `Connecting` / `Disconnected` の間 `_poll` を送り続ける
    ///
    /// 制約のある端末では配信確認のプッシュ通知が届かないことがあるため。
    Poll(IntervalTimer),
}

impl Confirmation {
    pub(crate) fn for_role(role: Role, poll_interval_ms: u64) -> Self {
        match role {
            Role::Host => Confirmation::Passive,
            Role::Controller => Confirmation::Poll(IntervalTimer::new(poll_interval_ms)),
        }
    }

    /// チャンネルが開いたときの状態
    pub(crate) fn status_on_open(&self) -> SessionStatus {
        match self {
            Confirmation::Passive => SessionStatus::Disconnected,
            Confirmation::Poll(_) => SessionStatus::Connecting,
        }
    }

    /// 状態変化に合わせてポーリングを開始・停止する
    pub(crate) fn on_status(&mut self, status: SessionStatus, now_ms: u64) {
        let Confirmation::Poll(timer) = self else {
            return;
        };
        match status {
            SessionStatus::Connecting | SessionStatus::Disconnected => {
                if timer.start(now_ms) {
                    debug!(target: "stitch.session", now_ms, "poll timer started");
                }
            }
            SessionStatus::Connected | SessionStatus::Contacting | SessionStatus::Unknown => {
                timer.stop();
            }
        }
    }

    /// ポーリングを送る時刻に達したか
    pub(crate) fn poll_due(&mut self, now_ms: u64) -> bool {
        match self {
            Confirmation::Passive => false,
            Confirmation::Poll(timer) => timer.fire(now_ms),
        }
    }

    pub(crate) fn next_due_ms(&self) -> Option<u64> {
        match self {
            Confirmation::Passive => None,
            Confirmation::Poll(timer) => timer.next_due_ms(),
        }
    }

    pub(crate) fn cancel(&mut self) {
        if let Confirmation::Poll(timer) = self {
            timer.stop();
        }
    }
}

/// ホスト側のセッション
pub struct Host {
    session: Session,
}

impl Host {
    pub fn new(
        config: SessionConfig,
        sender: Box<dyn RequestSender>,
        provider: Box<dyn ChannelProvider>,
    ) -> Self {
        Host {
            session: Session::new(Role::Host, config, sender, provider),
        }
    }

    /// セッションを開始する
    ///
    /// # 引数
    /// - `key`: 使うセッションキー。`None` ならサーバーに生成させる
    pub fn connect(&mut self, key: Option<&str>, now_ms: u64) {
        self.session.begin_connect(key, now_ms);
    }

    /// 相手を待つ状態（`Disconnected`）から `Connecting` に進める
    ///
    /// # 戻り値
    /// 状態が変わった場合 `true`
    pub fn wait_for_client(&mut self, now_ms: u64) -> bool {
        if self.session.status() != SessionStatus::Disconnected {
            return false;
        }
        self.session.set_status(SessionStatus::Connecting, now_ms);
        true
    }

    /// 現在のセッションキー（コントローラーに伝える番号）
    pub fn code(&self) -> Option<&str> {
        self.session.key()
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

impl Deref for Host {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for Host {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// コントローラー側のセッション
pub struct Controller {
    session: Session,
}

impl Controller {
    pub fn new(
        config: SessionConfig,
        sender: Box<dyn RequestSender>,
        provider: Box<dyn ChannelProvider>,
    ) -> Self {
        Controller {
            session: Session::new(Role::Controller, config, sender, provider),
        }
    }

    /// セッションに参加する
    ///
    /// # 引数
    /// - `key`: 参加するセッションキー。`None` なら設定の `key` を使う
    ///
    /// # エラー
    /// どちらにもキーがなければ `MissingKey`（状態は変わらない）
    pub fn connect(&mut self, key: Option<&str>, now_ms: u64) -> Result<(), SessionError> {
        let key = key
            .map(str::to_string)
            .or_else(|| self.session.config().key.clone())
            .ok_or(SessionError::MissingKey)?;
        self.session.begin_connect(Some(&key), now_ms);
        Ok(())
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

impl Deref for Controller {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for Controller {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
