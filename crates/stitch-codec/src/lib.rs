//! # stitch-codec
//!
//! 連続ストリーム（加速度・タッチ座標など）のコーデック。
//!
//! 名前付きストリームを共有フレーム上に多重化し、受信側で相対時刻を
//! 保ったまま再生するための Writer / Reader を提供する。
//! ネットワーク I/O は一切行わない（純粋なトークン列の変換のみ）。
//!
//! ## フレームの Wire Format
//!
//! ```text
//! [startTimeMs,durationMs,token,token,...]
//!
//! token:
//!   _reg,<name>,<id>,<count>,<prop1>,...,<propN>   スキーマ登録ブロック
//!   <id>                                           サンプルの先頭（短縮 ID）
//!   _start | _end                                  エッジマーカー（省略可）
//!   <value>                                        プロパティ値（スキーマ順）
//! ```
//!
//! ## 例
//!
//! ```text
//! {x:1,y:2} @0ms, {x:1,y:3} @50ms
//!   → _reg,accel,g0,3,_time,x,y,g0,0,1,2,g0,50,1,3
//! ```

pub mod error;
pub mod frame;
pub mod reader;
pub mod token;
pub mod writer;

pub use error::CodecError;
pub use frame::{encode_frame, split_frame, DecodedFrame, FrameHeader};
pub use reader::{ReaderSet, SampleEvent, StreamReader};
pub use token::{EdgeMarker, SampleKind, Value};
pub use writer::StreamWriter;

/// スキーマ登録ブロックの先頭タグ
pub const REGISTER_TAG: &str = "_reg";

/// ジェスチャ開始マーカー
pub const START_TAG: &str = "_start";

/// ジェスチャ終了マーカー
pub const END_TAG: &str = "_end";

/// 各サンプルに必ず含まれる相対時刻プロパティ
pub const TIME_PROPERTY: &str = "_time";

/// ディスパッチパスの先読み幅（ミリ秒）
/// スケジューラのジッタを吸収するための固定値
pub const DISPATCH_LOOKAHEAD_MS: u64 = 15;

/// ディスパッチパス再スケジュールの最小間隔（ミリ秒）
pub const MIN_RESCHEDULE_MS: u64 = 5;
