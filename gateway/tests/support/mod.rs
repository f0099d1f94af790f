//! 統合テスト共通ユーティリティ

pub mod gateway;
pub mod http;
pub mod runner;
