//! Bookmarkable browsing state.
//!
//! A session token is the JSON object `{"constraints", "hash", "seed"}`
//! percent-encoded the way `encodeURIComponent` does it, so a token can sit
//! in a URL fragment. The ordering itself is never stored: it is rebuilt
//! from the constraint and the seed.

use crate::catalog::CatalogData;
use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::query;
use crate::shuffle;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "constraints")]
    pub constraint: Constraint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<f64>,
}

impl SessionState {
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(utf8_percent_encode(&json, URI_COMPONENT).to_string())
    }

    /// Accepts the token with or without the leading `#` of a URL fragment.
    pub fn decode(token: &str) -> Result<Self> {
        let token = token.strip_prefix('#').unwrap_or(token);
        let json = percent_decode_str(token)
            .decode_utf8()
            .map_err(|e| Error::State(format!("token is not UTF-8: {e}")))?;
        serde_json::from_str(&json).map_err(|e| Error::State(format!("malformed token: {e}")))
    }
}

/// What a client is looking at: the result of one constraint, possibly
/// shuffled, and a position in it.
///
/// Every navigation returns a new value; nothing is changed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    constraint: Constraint,
    base: Vec<String>,
    order: Vec<String>,
    position: usize,
    seed: Option<f64>,
}

impl ViewState {
    /// Evaluates `constraint` against `snapshot`, shuffles when `seed` is
    /// given, and positions on `current` (or the start if it is absent).
    pub fn new(
        snapshot: &CatalogData,
        constraint: Constraint,
        current: Option<&str>,
        seed: Option<f64>,
    ) -> Result<Self> {
        let base = query::evaluate(snapshot, &constraint)?;
        let (order, seed) = match seed {
            Some(seed) => {
                let (order, seed) = shuffle::shuffled(base.clone(), Some(seed));
                (order, Some(seed))
            }
            None => (base.clone(), None),
        };
        let position = current.map_or(0, |hash| index_of(&order, hash));
        Ok(Self {
            constraint,
            base,
            order,
            position,
            seed,
        })
    }

    pub fn from_session(snapshot: &CatalogData, state: &SessionState) -> Result<Self> {
        Self::new(
            snapshot,
            state.constraint.clone(),
            state.hash.as_deref(),
            state.seed,
        )
    }

    /// Rebuilds the view a token describes. A token that cannot be decoded
    /// or evaluated falls back to `fallback`, freshly shuffled.
    pub fn restore(snapshot: &CatalogData, token: &str, fallback: &Constraint) -> Result<Self> {
        let restored =
            SessionState::decode(token).and_then(|state| Self::from_session(snapshot, &state));
        match restored {
            Ok(view) => Ok(view),
            Err(e) => {
                log::warn!("Could not restore session, using default constraint: {e}");
                Self::new(snapshot, fallback.clone(), None, Some(shuffle::fresh_seed()))
            }
        }
    }

    /// A new search. The current media stays in view if it is still part of
    /// the result; the order starts unshuffled.
    pub fn search(&self, snapshot: &CatalogData, constraint: Constraint) -> Result<Self> {
        Self::new(snapshot, constraint, self.current(), None)
    }

    pub fn current(&self) -> Option<&str> {
        self.order.get(self.position).map(String::as_str)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn seed(&self) -> Option<f64> {
        self.seed
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn next(&self) -> Self {
        self.at(match self.len() {
            0 => 0,
            len => (self.position + 1) % len,
        })
    }

    pub fn previous(&self) -> Self {
        self.at(match self.len() {
            0 => 0,
            len => (self.position + len - 1) % len,
        })
    }

    /// Jumps to a hash in the order, or failing that to a 1-based index.
    pub fn goto(&self, reference: &str) -> Option<Self> {
        if let Some(idx) = self.order.iter().position(|hash| hash == reference) {
            return Some(self.at(idx));
        }
        match reference.trim().parse::<usize>() {
            Ok(n) if (1..=self.len()).contains(&n) => Some(self.at(n - 1)),
            _ => None,
        }
    }

    /// Reorders with `seed` (or a fresh one), keeping the current media in view.
    pub fn shuffle(&self, seed: Option<f64>) -> Self {
        let (order, seed) = shuffle::shuffled(self.base.clone(), seed);
        self.reordered(order, Some(seed))
    }

    pub fn unshuffle(&self) -> Self {
        self.reordered(self.base.clone(), None)
    }

    /// Drops a media that has just been removed. The view stays on the item
    /// that took its place, or returns to the start past the end.
    pub fn without(&self, hash: &str) -> Self {
        let mut next = self.clone();
        next.base.retain(|h| h != hash);
        if let Some(idx) = next.order.iter().position(|h| h == hash) {
            next.order.remove(idx);
            if idx < next.position {
                next.position -= 1;
            }
        }
        if next.position >= next.order.len() {
            next.position = 0;
        }
        next
    }

    pub fn session(&self) -> SessionState {
        SessionState {
            constraint: self.constraint.clone(),
            hash: self.current().map(str::to_string),
            seed: self.seed,
        }
    }

    pub fn to_token(&self) -> Result<String> {
        self.session().encode()
    }

    fn at(&self, position: usize) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    fn reordered(&self, order: Vec<String>, seed: Option<f64>) -> Self {
        let position = self.current().map_or(0, |hash| index_of(&order, hash));
        Self {
            constraint: self.constraint.clone(),
            base: self.base.clone(),
            order,
            position,
            seed,
        }
    }
}

fn index_of(order: &[String], hash: &str) -> usize {
    order.iter().position(|h| h == hash).unwrap_or(0)
}
