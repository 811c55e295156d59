//! Units of flow.

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct TokenId(Uuid);

impl TokenId {
    /// Creates a new time-ordered token ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a token represents.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    /// The primary thread of execution through a workplan.
    Main,
    /// A forked copy of `original` travelling a parallel path.
    Split {
        /// Token that was forked.
        original: Box<Token>,
    },
}

/// A unit of flow held by exactly one place or transition at a time.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Token {
    /// Identity of this token.
    pub id: TokenId,
    /// What the token represents.
    #[serde(flatten)]
    pub kind: TokenKind,
}

impl Token {
    /// Creates a new main token.
    pub fn main() -> Self {
        Self {
            id: TokenId::new(),
            kind: TokenKind::Main,
        }
    }

    /// Creates a new split token forked from `original`.
    pub fn split(original: &Token) -> Self {
        Self {
            id: TokenId::new(),
            kind: TokenKind::Split {
                original: Box::new(original.clone()),
            },
        }
    }

    /// Returns whether this is a main token.
    pub fn is_main(&self) -> bool {
        matches!(self.kind, TokenKind::Main)
    }

    /// Returns the token this one was forked from, if any.
    pub fn original(&self) -> Option<&Token> {
        match &self.kind {
            TokenKind::Main => None,
            TokenKind::Split { original } => Some(original),
        }
    }
}
