//! 周期タイマー
//!
//! 実時間は持たず、次の期限だけを覚えておく。
//! 埋め込み側が `tick` で現在時刻を渡したときに期限を判定する。

/// 一定間隔で発火するタイマー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalTimer {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl IntervalTimer {
    pub fn new(period_ms: u64) -> Self {
        IntervalTimer {
            period_ms,
            next_due_ms: None,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.next_due_ms
    }

    /// 停止中なら開始する。最初の発火は 1 周期後
    ///
    /// # 戻り値
    /// このタイマーを新たに開始した場合 `true`
    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.is_running() {
            return false;
        }
        self.next_due_ms = Some(now_ms + self.period_ms);
        true
    }

    pub fn stop(&mut self) {
        self.next_due_ms = None;
    }

    /// 期限に達していれば次の期限を設定して `true` を返す
    ///
    /// 何周期分遅れていても発火は 1 回にまとめる。
    pub fn fire(&mut self, now_ms: u64) -> bool {
        match self.next_due_ms {
            Some(due) if due <= now_ms => {
                self.next_due_ms = Some(now_ms + self.period_ms);
                true
            }
            _ => false,
        }
    }
}
