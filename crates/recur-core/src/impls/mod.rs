//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryPatternStore**: pattern の正本（条件付き update 付き）
//! - **InMemoryTaskStore**: 生成済み Task（occurrence 単位で一意）
//!
//! # 本番用実装
//! ドキュメントストア等の実装は別クレートに置き、同じ trait を実装します。

pub mod inmem_store;

// 主要な型を再エクスポート
pub use self::inmem_store::{InMemoryPatternStore, InMemoryTaskStore};
