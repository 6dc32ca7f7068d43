//! 送信側と受信側の時計合わせ

use crate::config::ReplayAnchor;

/// 受信フレームの基準時刻を決める
///
/// 最初に受信したフレームで `offset = 受信時刻 - フレーム開始時刻` を一度だけ求め、
/// 以降は固定する（切断をまたいでも再計算しない）。
/// 1 本目のフレームの遅延がそのまま基準になるので、遅延の揺れは吸収しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSync {
    anchor: ReplayAnchor,
    offset_ms: Option<i64>,
}

impl ClockSync {
    pub fn new(anchor: ReplayAnchor) -> Self {
        ClockSync {
            anchor,
            offset_ms: None,
        }
    }

    pub fn anchor(&self) -> ReplayAnchor {
        self.anchor
    }

    /// 固定済みのオフセット（まだフレームを受信していなければ `None`）
    pub fn offset_ms(&self) -> Option<i64> {
        self.offset_ms
    }

    /// フレームの基準時刻（受信側の時計）を返す
    ///
    /// # 引数
    /// - `sender_start_ms`: フレームヘッダーのウィンドウ開始時刻
    /// - `now_ms`: 受信時刻
    pub fn base_ms(&mut self, sender_start_ms: u64, now_ms: u64) -> u64 {
        // ヘッダーの開始時刻は相手側の任意の値なので i128 で計算して丸める
        let offset = *self.offset_ms.get_or_insert_with(|| {
            (i128::from(now_ms) - i128::from(sender_start_ms))
                .clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
        });

        match self.anchor {
            ReplayAnchor::Sender => (i128::from(sender_start_ms) + i128::from(offset))
                .clamp(0, i128::from(u64::MAX)) as u64,
            ReplayAnchor::Arrival => now_ms,
        }
    }
}
