//! The keys of one tick, and the outcomes handed back to its callers.

use std::collections::hash_map::{Entry, HashMap};
use std::hash::Hash;
use std::mem;

/// Identifies one unique key within a [`KeySet`]. Tokens are assigned in
/// arrival order, so the first key requested in a tick has the lowest token.
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Token(usize);

impl Token {
    fn duplicate(&self) -> Self {
        Token(self.0)
    }
}

/// Every unique key requested during one tick. Identical keys requested by
/// several callers appear once; the set remembers how many callers are
/// waiting on each, so their outcomes can be cloned out of the [`ValueSet`].
///
/// The only way to build a [`ValueSet`] is [`into_values`][KeySet::into_values],
/// which guarantees every key gets exactly one outcome.
#[derive(Debug)]
pub struct KeySet<Key: Eq + Hash> {
    // Each key maps to its token. The token maps to the number of callers
    // waiting on it *past the first*, which is the number of clones its
    // outcome will need. A key whose callers all dropped out loses its entry
    // in `tokens` but keeps its entry in `keys`, so that token numbering
    // never repeats.
    keys: HashMap<Key, Token>,
    tokens: HashMap<Token, usize>,
}

impl<Key: Eq + Hash> KeySet<Key> {
    pub(crate) fn new() -> Self {
        Self {
            keys: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The number of unique keys still wanted by at least one caller.
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// The unique keys, in the order they were first requested.
    pub fn keys(&self) -> Vec<&Key> {
        let mut keys: Vec<(&Key, &Token)> = self
            .keys
            .iter()
            .filter(|(_key, token)| self.tokens.contains_key(*token))
            .collect();

        keys.sort_unstable_by(|(_, lhs), (_, rhs)| lhs.cmp(rhs));
        keys.into_iter().map(|(key, _token)| key).collect()
    }

    /// Pair every key with its outcome.
    pub fn into_values<Value>(self, mut get_value: impl FnMut(&Key) -> Value) -> ValueSet<Value> {
        let KeySet { keys, tokens } = self;

        let values = keys
            .into_iter()
            .filter_map(|(key, token)| {
                let count = *tokens.get(&token)?;
                Some((token, ValueSetEntry {
                    value: get_value(&key),
                    count,
                }))
            })
            .collect();

        ValueSet { values }
    }

    /// Add a caller's key and return the token its outcome will be filed
    /// under.
    pub(crate) fn add_key(&mut self, key: Key) -> Token {
        let new_token = Token(self.keys.len());
        let token = self.keys.entry(key).or_insert(new_token).duplicate();

        self.tokens
            .entry(token.duplicate())
            .and_modify(|count| *count += 1)
            .or_insert(0);

        token
    }

    /// Forget one caller of a key. Once no caller is left, the key is no
    /// longer sent upstream.
    pub(crate) fn discard_token(&mut self, token: Token) {
        match self.tokens.entry(token) {
            Entry::Occupied(entry) if *entry.get() == 0 => {
                entry.remove();
            }
            Entry::Occupied(mut entry) => {
                *entry.get_mut() -= 1;
            }
            Entry::Vacant(_) => panic!("Attempted to remove nonexistent token from KeySet"),
        }
    }

    /// Move the keys out, leaving an empty set behind. Used when a tick stops
    /// buffering.
    pub(crate) fn take(&mut self) -> Self {
        Self {
            keys: mem::take(&mut self.keys),
            tokens: mem::take(&mut self.tokens),
        }
    }
}

#[derive(Debug)]
struct ValueSetEntry<Value> {
    count: usize,
    value: Value,
}

/// The outcomes of one tick, filed by token. Built by
/// [`KeySet::into_values`].
#[derive(Debug)]
pub struct ValueSet<Value> {
    values: HashMap<Token, ValueSetEntry<Value>>,
}

impl<Value> ValueSet<Value> {
    /// Forget one caller of a token without taking its value.
    pub(crate) fn discard(&mut self, token: Token) {
        match self.values.entry(token) {
            Entry::Vacant(..) => {}
            Entry::Occupied(entry) if entry.get().count == 0 => {
                entry.remove();
            }
            Entry::Occupied(mut entry) => {
                entry.get_mut().count -= 1;
            }
        }
    }
}

impl<Value: Clone> ValueSet<Value> {
    /// Take one caller's value. The last caller of a token gets the value
    /// itself; earlier callers get clones.
    pub(crate) fn take(&mut self, token: Token) -> Option<Value> {
        match self.values.entry(token) {
            Entry::Vacant(..) => None,
            Entry::Occupied(entry) if entry.get().count == 0 => Some(entry.remove().value),
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                entry.count -= 1;
                Some(entry.value.clone())
            }
        }
    }
}
