//! DMR Gateway Common Library
//!
//! ゲートウェイ本体とテストで共有する型・設定・エラー定義

#![warn(missing_docs)]

/// ランナー設定（バックエンド一覧・個別設定）
pub mod config;

/// エラー型定義
pub mod error;

/// Ollama互換APIのリクエストフォーム
pub mod protocol;

/// モデルカタログ・バックエンド型
pub mod types;
