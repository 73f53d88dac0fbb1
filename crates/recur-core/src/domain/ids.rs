//! 型付き ID
//!
//! pattern・Task・skip date の ID はすべて ULID を包んだ `Id<T>`。
//! `T` は値を持たないマーカー型なので、`remove_skip_date(pattern_id, task_id)`
//! のような取り違えはコンパイル時に弾かれる。
//!
//! # 表現
//! - 保存形式（serde）は素の ULID 文字列
//! - 表示形式（Display / FromStr）は `pattern-01HV...` のように種類の接頭辞付き。
//!   ログや CLI 出力からそのまま貼り戻せる
//!
//! ULID は生成時刻順に並ぶので、ストアは ID 順の一覧をそのまま作成順として返せる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

pub trait IdMarker: Send + Sync + 'static {
    /// 表示用の接頭辞（"pattern-" など）
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// A displayed id that could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("expected an id starting with {expected:?}, got {input:?}")]
    WrongKind { expected: &'static str, input: String },

    #[error("malformed ulid in {input:?}: {source}")]
    Ulid {
        input: String,
        #[source]
        source: ulid::DecodeError,
    },
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// Accepts the displayed form only; a bare ULID carries no kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(T::prefix()).ok_or_else(|| IdParseError::WrongKind {
            expected: T::prefix(),
            input: s.to_owned(),
        })?;
        Ulid::from_string(body)
            .map(Self::from_ulid)
            .map_err(|source| IdParseError::Ulid {
                input: s.to_owned(),
                source,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pattern {}

impl IdMarker for Pattern {
    fn prefix() -> &'static str {
        "pattern-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipDate {}

impl IdMarker for SkipDate {
    fn prefix() -> &'static str {
        "skip-"
    }
}

/// Identifier of a recurring task pattern.
pub type PatternId = Id<Pattern>;

/// Identifier of a materialized task instance.
pub type TaskId = Id<Task>;

/// Identifier of one skip-date entry on a pattern.
pub type SkipDateId = Id<SkipDate>;
