//! Composed characters - multi-codepoint grapheme clusters stored out of band
//!
//! A grid cell holds a single codepoint. When a combining character arrives
//! for a cell that already has content, the whole cluster is interned here
//! and the cell stores the pseudo-codepoint `CELL_COMB_CHARS_LO + key`.
//!
//! Keys are derived with a rolling hash so the key of a cluster of length
//! `n + 1` follows from the key of its length `n` prefix. Collisions are
//! resolved by linear probing over the key space.

use log::debug;
use unicode_width::UnicodeWidthStr;

use crate::error::{LinkModeError, Result};

/// First pseudo-codepoint reserved for composed characters.
pub const CELL_COMB_CHARS_LO: u32 = 0x0020_0000;
/// Last pseudo-codepoint reserved for composed characters.
pub const CELL_COMB_CHARS_HI: u32 = CELL_COMB_CHARS_LO + 0x3fff_ffff;
/// Marks the trailing half of a double-width character.
pub const CELL_SPACER: u32 = CELL_COMB_CHARS_HI + 1;

/// Mask keeping a key inside the composed key space.
pub const KEY_MASK: u32 = CELL_COMB_CHARS_HI - CELL_COMB_CHARS_LO;
const KEY_BITS: u32 = u32::BITS - KEY_MASK.leading_zeros();
const KEY_SPACE: usize = KEY_MASK as usize + 1;
const HASH_MULTIPLIER: u32 = 2_654_435_761;

pub const DEFAULT_COMPOSED_CAPACITY: usize = 1 << 18;

/// Key of a whole cluster, folded left to right.
pub fn key_from_chars(chars: &[char]) -> u32 {
    let Some((first, rest)) = chars.split_first() else {
        return 0;
    };

    rest.iter()
        .fold(*first as u32, |key, &next| key_from_key(key, next))
}

/// Extend the key of a prefix with one more character.
pub fn key_from_key(prev_key: u32, next: char) -> u32 {
    let rotated = (prev_key << 8) | (prev_key >> (KEY_BITS - 8));
    (rotated ^ next as u32).wrapping_mul(HASH_MULTIPLIER) & KEY_MASK
}

/// Is `wc` a pseudo-codepoint referring to a composed character?
pub fn is_composed(wc: u32) -> bool {
    (CELL_COMB_CHARS_LO..=CELL_COMB_CHARS_HI).contains(&wc)
}

/// A grapheme cluster of two or more codepoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composed {
    pub chars: Vec<char>,
    pub width: u8,
    pub forced_width: Option<u8>,
    pub key: u32,
}

impl Composed {
    pub fn new(key: u32, chars: Vec<char>, forced_width: Option<u8>) -> Self {
        let width = forced_width.unwrap_or_else(|| {
            let text: String = chars.iter().collect();
            text.width().min(u8::MAX as usize) as u8
        });

        Composed {
            chars,
            width,
            forced_width,
            key: key & KEY_MASK,
        }
    }

    pub fn count(&self) -> usize {
        self.chars.len()
    }

    /// The pseudo-codepoint a cell stores to reference this entry.
    pub fn pseudo_codepoint(&self) -> u32 {
        CELL_COMB_CHARS_LO + self.key
    }

    fn is_cluster(&self, prefix: &[char], next: char, forced_width: Option<u8>) -> bool {
        self.chars.len() == prefix.len() + 1
            && self.forced_width == forced_width
            && self.chars.last() == Some(&next)
            && self.chars[..prefix.len()] == *prefix
    }
}

/// Outcome of probing the store for a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot<'a> {
    /// The cluster is already interned.
    Occupied(&'a Composed),
    /// The cluster is unknown; this key is free and may be inserted.
    Vacant(u32),
}

#[derive(Clone, Debug)]
struct Node {
    entry: Composed,
    left: Option<u32>,
    right: Option<u32>,
}

/// Binary search tree of composed characters, keyed by `Composed::key`.
///
/// Nodes live in an arena and link to each other by index.
#[derive(Clone, Debug)]
pub struct ComposedStore {
    nodes: Vec<Node>,
    root: Option<u32>,
    capacity: usize,
}

impl Default for ComposedStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_COMPOSED_CAPACITY)
    }
}

impl ComposedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `capacity` clusters (never more than the key space).
    pub fn with_capacity(capacity: usize) -> Self {
        ComposedStore {
            nodes: Vec::new(),
            root: None,
            capacity: capacity.clamp(1, KEY_SPACE),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Composed> {
        self.nodes.iter().map(|node| &node.entry)
    }

    fn find(&self, key: u32) -> Option<usize> {
        let mut current = self.root;
        while let Some(index) = current {
            let node = &self.nodes[index as usize];
            if key == node.entry.key {
                return Some(index as usize);
            }
            current = if key < node.entry.key {
                node.left
            } else {
                node.right
            };
        }
        None
    }

    pub fn lookup(&self, key: u32) -> Option<&Composed> {
        self.find(key).map(|index| &self.nodes[index].entry)
    }

    /// Resolve a cell's pseudo-codepoint.
    pub fn resolve(&self, wc: u32) -> Option<&Composed> {
        if !is_composed(wc) {
            return None;
        }
        self.lookup(wc - CELL_COMB_CHARS_LO)
    }

    /// Probe from `key` for the cluster `prefix + next`.
    ///
    /// Occupied slots holding a different cluster are skipped. Every run of
    /// occupied slots is at most `len()` long, so `len() + 1` probes always
    /// settle unless the whole key space is taken.
    pub fn lookup_matching(
        &self,
        key: u32,
        prefix: &[char],
        next: char,
        forced_width: Option<u8>,
    ) -> Result<Slot<'_>> {
        let mut key = key & KEY_MASK;
        let probes = (self.nodes.len() + 1).min(KEY_SPACE);

        for _ in 0..probes {
            match self.lookup(key) {
                None if self.nodes.len() >= self.capacity => break,
                None => return Ok(Slot::Vacant(key)),
                Some(entry) if entry.is_cluster(prefix, next, forced_width) => {
                    return Ok(Slot::Occupied(entry))
                }
                Some(_) => key = key.wrapping_add(1) & KEY_MASK,
            }
        }

        Err(LinkModeError::TableExhausted {
            capacity: self.capacity,
        })
    }

    /// Insert a new entry. Callers find a free key with `lookup_matching` first.
    pub fn insert(&mut self, entry: Composed) -> Result<()> {
        if self.nodes.len() >= self.capacity {
            return Err(LinkModeError::TableExhausted {
                capacity: self.capacity,
            });
        }

        let key = entry.key;
        let index = self.nodes.len() as u32;
        let node = Node {
            entry,
            left: None,
            right: None,
        };

        let Some(mut parent) = self.root else {
            self.nodes.push(node);
            self.root = Some(index);
            return Ok(());
        };

        loop {
            let current = &self.nodes[parent as usize];
            if current.entry.key == key {
                return Err(LinkModeError::invariant(format!(
                    "composed key {key:#x} inserted twice"
                )));
            }
            let child = if key < current.entry.key {
                current.left
            } else {
                current.right
            };
            match child {
                Some(child) => parent = child,
                None => break,
            }
        }

        self.nodes.push(node);
        let parent = &mut self.nodes[parent as usize];
        if key < parent.entry.key {
            parent.left = Some(index);
        } else {
            parent.right = Some(index);
        }
        Ok(())
    }

    /// Fold `next` into the cluster `prefix`, interning it if needed.
    ///
    /// Returns the key of the resulting cluster; the cell stores
    /// `CELL_COMB_CHARS_LO + key`.
    pub fn compose(&mut self, prefix: &[char], next: char, forced_width: Option<u8>) -> Result<u32> {
        if prefix.is_empty() {
            return Err(LinkModeError::invariant(
                "a composed character needs a base character",
            ));
        }

        let key = key_from_key(key_from_chars(prefix), next);
        let key = match self.lookup_matching(key, prefix, next, forced_width)? {
            Slot::Occupied(existing) => return Ok(existing.key),
            Slot::Vacant(key) => key,
        };

        let mut chars = Vec::with_capacity(prefix.len() + 1);
        chars.extend_from_slice(prefix);
        chars.push(next);
        debug!("interning composed character {chars:?} at key {key:#x}");

        self.insert(Composed::new(key, chars, forced_width))?;
        Ok(key)
    }

    /// Release every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_composed, key_from_chars, key_from_key, Composed, ComposedStore, Slot,
        CELL_COMB_CHARS_LO, CELL_SPACER, KEY_MASK,
    };
    use crate::error::LinkModeError;

    #[test]
    fn incremental_key_matches_whole_cluster_key() {
        let chars: Vec<char> = "abcdef".chars().collect();

        let k1 = key_from_key(chars[0] as u32, chars[1]);
        assert_eq!(k1, key_from_chars(&chars[..2]));

        let k2 = key_from_key(k1, chars[2]);
        assert_eq!(k2, key_from_chars(&chars[..3]));
    }

    #[test]
    fn key_is_order_dependent_and_in_range() {
        let ab = key_from_chars(&['a', '\u{301}', '\u{302}']);
        let ba = key_from_chars(&['a', '\u{302}', '\u{301}']);
        assert_ne!(ab, ba);
        assert!(ab <= KEY_MASK);
        assert!(ba <= KEY_MASK);
    }

    #[test]
    fn lookup_returns_inserted_entry() {
        let mut store = ComposedStore::new();
        for (key, base) in [(50, 'a'), (10, 'b'), (90, 'c'), (30, 'd')] {
            store
                .insert(Composed::new(key, vec![base, '\u{301}'], None))
                .expect("insert");
        }

        assert_eq!(store.len(), 4);
        assert_eq!(store.lookup(30).map(|c| c.chars[0]), Some('d'));
        assert_eq!(store.lookup(90).map(|c| c.chars[0]), Some('c'));
        assert!(store.lookup(31).is_none());
    }

    #[test]
    fn duplicate_insert_is_an_invariant_violation() {
        let mut store = ComposedStore::new();
        store
            .insert(Composed::new(7, vec!['a', '\u{301}'], None))
            .expect("first insert");

        let err = store
            .insert(Composed::new(7, vec!['b', '\u{301}'], None))
            .unwrap_err();
        assert!(matches!(err, LinkModeError::InvariantViolation(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(7).map(|c| c.chars[0]), Some('a'));
    }

    #[test]
    fn compose_reuses_existing_cluster() {
        let mut store = ComposedStore::new();
        let first = store.compose(&['e'], '\u{301}', None).expect("compose");
        let second = store.compose(&['e'], '\u{301}', None).expect("compose");

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn compose_extends_existing_cluster_incrementally() {
        let mut store = ComposedStore::new();
        let two = store.compose(&['e'], '\u{301}', None).expect("compose");
        let three = store
            .compose(&['e', '\u{301}'], '\u{323}', None)
            .expect("compose");

        assert_ne!(two, three);
        assert_eq!(
            store.lookup(three).map(|c| c.chars.clone()),
            Some(vec!['e', '\u{301}', '\u{323}'])
        );
    }

    #[test]
    fn colliding_cluster_probes_to_next_free_key() {
        let mut store = ComposedStore::new();
        let hashed = key_from_key(key_from_chars(&['e']), '\u{301}');
        store
            .insert(Composed::new(hashed, vec!['x', '\u{302}'], None))
            .expect("insert colliding entry");

        let key = store.compose(&['e'], '\u{301}', None).expect("compose");
        assert_eq!(key, (hashed + 1) & KEY_MASK);
        assert_eq!(
            store.lookup(key).map(|c| c.chars.clone()),
            Some(vec!['e', '\u{301}'])
        );
    }

    #[test]
    fn probing_wraps_around_the_key_space() {
        let mut store = ComposedStore::new();
        store
            .insert(Composed::new(KEY_MASK, vec!['x', '\u{302}'], None))
            .expect("insert");

        let slot = store
            .lookup_matching(KEY_MASK, &['a'], '\u{301}', None)
            .expect("probe");
        assert_eq!(slot, Slot::Vacant(0));
    }

    #[test]
    fn forced_width_is_part_of_the_cluster_identity() {
        let mut store = ComposedStore::new();
        let natural = store.compose(&['a'], '\u{301}', None).expect("compose");
        let forced = store.compose(&['a'], '\u{301}', Some(2)).expect("compose");

        assert_ne!(natural, forced);
        assert_eq!(store.lookup(natural).map(|c| c.width), Some(1));
        assert_eq!(store.lookup(forced).map(|c| c.width), Some(2));
    }

    #[test]
    fn full_store_reports_table_exhausted() {
        let mut store = ComposedStore::with_capacity(2);
        store.compose(&['a'], '\u{301}', None).expect("compose");
        store.compose(&['b'], '\u{301}', None).expect("compose");

        let err = store.compose(&['c'], '\u{301}', None).unwrap_err();
        assert!(matches!(
            err,
            LinkModeError::TableExhausted { capacity: 2 }
        ));

        // Known clusters are still found when the table is full.
        assert!(store.compose(&['a'], '\u{301}', None).is_ok());
    }

    #[test]
    fn compose_without_base_character_is_rejected() {
        let mut store = ComposedStore::new();
        assert!(matches!(
            store.compose(&[], '\u{301}', None),
            Err(LinkModeError::InvariantViolation(_))
        ));
    }

    #[test]
    fn resolve_only_accepts_composed_pseudo_codepoints() {
        let mut store = ComposedStore::new();
        let key = store.compose(&['n'], '\u{303}', None).expect("compose");
        let wc = CELL_COMB_CHARS_LO + key;

        assert!(is_composed(wc));
        assert!(!is_composed('n' as u32));
        assert!(!is_composed(CELL_SPACER));
        assert_eq!(store.resolve(wc).map(|c| c.count()), Some(2));
        assert!(store.resolve('n' as u32).is_none());
    }

    #[test]
    fn clear_releases_every_entry() {
        let mut store = ComposedStore::new();
        let key = store.compose(&['o'], '\u{308}', None).expect("compose");
        store.clear();

        assert!(store.is_empty());
        assert!(store.lookup(key).is_none());
    }
}
