//! Hint labels - the key sequences typed to pick a target

use std::collections::VecDeque;

use itertools::Itertools;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{LinkModeError, Result};
use crate::url_collect::Target;

pub const DEFAULT_LABEL_LETTERS: &str = "sadfjklewcmpgh";

/// Generate `count` prefix-free labels over `alphabet`.
///
/// Labels are grown breadth first by prepending letters to the oldest
/// unconsumed label, which yields the shortest codes possible. The picked
/// labels are then reversed and sorted.
pub fn generate_labels(alphabet: &[char], count: usize) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let letters: Vec<char> = alphabet
        .iter()
        .copied()
        .unique_by(|c| c.to_lowercase().collect::<String>())
        .collect();
    if letters.is_empty() || (letters.len() < 2 && count > 1) {
        return Err(LinkModeError::InvalidAlphabet {
            alphabet: alphabet.iter().collect(),
            count,
        });
    }

    // Labels are stored reversed while growing, so "prepend" is a push.
    let mut pool: VecDeque<Vec<char>> = VecDeque::from([Vec::new()]);
    loop {
        let Some(prefix) = pool.pop_front() else {
            break;
        };
        for &letter in &letters {
            let mut label = prefix.clone();
            label.push(letter);
            pool.push_back(label);
        }
        if pool.len() >= count {
            break;
        }
    }

    let labels = pool
        .into_iter()
        .take(count)
        .map(|label| label.into_iter().collect::<String>())
        .sorted()
        .collect::<Vec<_>>();

    debug!("generated {} labels over {:?}", labels.len(), letters);
    Ok(labels)
}

/// Give every target a hint label, in collection order.
///
/// A target repeating an earlier `(id, text)` pair gets no label; one
/// repeating only the text shares the earlier target's label.
pub fn assign_hints(alphabet: &[char], targets: &mut [Target]) -> Result<()> {
    let mut labels = generate_labels(alphabet, targets.len())?.into_iter();
    let mut seen: FxHashSet<(u64, String)> = FxHashSet::default();
    let mut by_text: FxHashMap<String, String> = FxHashMap::default();

    for target in targets.iter_mut() {
        if !seen.insert((target.id, target.text.clone())) {
            target.hint = None;
            continue;
        }

        if let Some(label) = by_text.get(&target.text) {
            target.hint = Some(label.clone());
            continue;
        }

        let Some(label) = labels.next() else {
            return Err(LinkModeError::invariant(format!(
                "ran out of labels at {:?}",
                target.text
            )));
        };
        by_text.insert(target.text.clone(), label.clone());
        target.hint = Some(label);
    }

    Ok(())
}
