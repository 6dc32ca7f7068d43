//! 連続ストリームの送信スロットリング
//!
//! サンプルは共有バッファに溜め、タイマーの周期ごとに 1 フレームにまとめて送る。
//! バッファが空のまま一定時間過ぎるとタイマーを止め、
//! 止まっている間に書き込みがあれば即座に送ってからタイマーを再開する。
//!
//! ```text
//! write ──(timer stopped)──▶ restart + flush now
//! write ──(timer running)──▶ buffer
//! timer ──▶ flush if non-empty / stop if idle > timeout
//! ```

use stitch_codec::{encode_frame, FrameHeader};
use tracing::debug;

use crate::timer::IntervalTimer;

/// 送信バッファとスロットルタイマー
#[derive(Debug, Clone)]
pub struct Throttle {
    /// 全ストリーム共有のトークンバッファ
    tokens: Vec<String>,
    /// 現在のウィンドウ開始時刻（最初の書き込み時刻）
    window_start_ms: u64,
    /// ウィンドウ開始から最後の書き込みまで
    duration_ms: u64,
    timer: IntervalTimer,
    idle_timeout_ms: u64,
    last_flush_ms: u64,
}

impl Throttle {
    pub fn new(period_ms: u64, idle_timeout_ms: u64) -> Self {
        Throttle {
            tokens: Vec::new(),
            window_start_ms: 0,
            duration_ms: 0,
            timer: IntervalTimer::new(period_ms),
            idle_timeout_ms,
            last_flush_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.timer.next_due_ms()
    }

    pub fn buffered_tokens(&self) -> &[String] {
        &self.tokens
    }

    /// 書き込み直前に呼び、ウィンドウ開始からの相対時刻を返す
    ///
    /// バッファが空なら `now_ms` から新しいウィンドウを始める。
    pub fn open_window(&mut self, now_ms: u64) -> u64 {
        if self.tokens.is_empty() {
            self.window_start_ms = now_ms;
        }
        self.duration_ms = now_ms.saturating_sub(self.window_start_ms);
        self.duration_ms
    }

    pub fn tokens_mut(&mut self) -> &mut Vec<String> {
        &mut self.tokens
    }

    /// タイマーが止まっていれば再開する
    ///
    /// # 戻り値
    /// 再開した場合 `true`（呼び出し側はすぐに `take_frame` で送る）
    pub fn restart(&mut self, now_ms: u64) -> bool {
        let started = self.timer.start(now_ms);
        if started {
            debug!(target: "stitch.session", now_ms, "throttle timer started");
        }
        started
    }

    /// バッファをフレームにして空にする
    pub fn take_frame(&mut self, now_ms: u64) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }

        let header = FrameHeader {
            start_ms: self.window_start_ms,
            duration_ms: self.duration_ms,
        };
        let frame = encode_frame(header, &self.tokens);
        self.tokens.clear();
        self.duration_ms = 0;
        self.last_flush_ms = now_ms;
        Some(frame)
    }

    /// タイマー期限の処理
    ///
    /// # 戻り値
    /// 送るべきフレーム。期限前・バッファが空の場合は `None`
    pub fn on_timer(&mut self, now_ms: u64) -> Option<String> {
        if !self.timer.fire(now_ms) {
            return None;
        }

        let frame = self.take_frame(now_ms);
        if frame.is_none() && now_ms.saturating_sub(self.last_flush_ms) > self.idle_timeout_ms {
            self.timer.stop();
            debug!(target: "stitch.session", now_ms, "throttle timer stopped (idle)");
        }
        frame
    }

    /// 未送信のサンプルを捨てる（タイマーはそのまま）
    pub fn discard(&mut self) {
        self.tokens.clear();
        self.duration_ms = 0;
    }

    /// タイマーを止め、未送信のサンプルを捨てる
    pub fn stop(&mut self) {
        self.timer.stop();
        self.discard();
    }
}
