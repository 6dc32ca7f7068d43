//! テスト用ヘルパー（記録する協調者は stitch-transport と共有）

pub(crate) use stitch_transport::testing::{recorder, Log};

pub(crate) const GRANT_4821: &str =
    r#"{"key":"4821","token":"tok","endpoint":"/message/4821","id":"48212"}"#;

pub(crate) fn grant_body(key: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!(
            r#"{{"key":"{key}","token":"tok-{key}","endpoint":"/message/{key}","id":"{id}"}}"#
        ),
        None => format!(r#"{{"key":"{key}","token":"tok-{key}","endpoint":"/message/{key}"}}"#),
    }
}

/// テスト中のログを cargo test の出力に流す
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("stitch=debug")
        .try_init();
}
