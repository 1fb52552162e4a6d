//! Condition normalization, deduplication and indexing.
//!
//! Every condition slot in the working realm list is registered once, up
//! front, via `ConditionSet::add`. Conditions are deduplicated by slot (a slot
//! added twice maps to the same index) and by normalized value (two slots with
//! the same attribute and value set share an index). After `finalize`, the
//! hot per-binding path looks conditions up by slot only and never touches
//! condition values again.

use ahash::AHashMap;

use crate::error::{ExpandError, Result};
use crate::types::{CondIdx, Condition, ConditionRef, NormalizedCondition};

/// Accepts conditions until finalized.
#[derive(Debug, Default)]
pub struct ConditionSet {
    /// Normalized condition -> index in first-seen order.
    normalized: AHashMap<NormalizedCondition, CondIdx>,
    /// Slot -> first-seen index.
    mapping: AHashMap<ConditionRef, CondIdx>,
}

/// A finalized `ConditionSet`. Indexes refer to the list returned by
/// `ConditionSet::finalize`.
#[derive(Debug, Default)]
pub struct ConditionIndex {
    mapping: AHashMap<ConditionRef, CondIdx>,
}

/// Normalize a config condition: sorted, deduplicated values.
pub fn normalize(slot: ConditionRef, cond: &Condition) -> Result<NormalizedCondition> {
    match &cond.restrict {
        Some(restrict) => {
            let mut values = restrict.values.clone();
            values.sort_unstable();
            values.dedup();
            Ok(NormalizedCondition {
                attribute: restrict.attribute.clone(),
                values,
            })
        }
        None => Err(ExpandError::EmptyCondition(slot)),
    }
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the condition stored at `slot`. Returns its (pre-finalize)
    /// index. Adding the same slot again is a no-op.
    pub fn add(&mut self, slot: ConditionRef, cond: &Condition) -> Result<CondIdx> {
        if let Some(&idx) = self.mapping.get(&slot) {
            return Ok(idx);
        }
        let norm = normalize(slot, cond)?;
        let next = self.normalized.len() as CondIdx;
        let idx = *self.normalized.entry(norm).or_insert(next);
        self.mapping.insert(slot, idx);
        Ok(idx)
    }

    /// Number of distinct normalized conditions.
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Sort conditions into their final order and relabel all slots.
    ///
    /// Conditions are ordered by `(attribute, values)`.
    pub fn finalize(self) -> (ConditionIndex, Vec<NormalizedCondition>) {
        let mut conds: Vec<(NormalizedCondition, CondIdx)> = self.normalized.into_iter().collect();
        conds.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut old_to_new = vec![0 as CondIdx; conds.len()];
        for (new_idx, (_, old_idx)) in conds.iter().enumerate() {
            old_to_new[*old_idx as usize] = new_idx as CondIdx;
        }

        let mapping = self
            .mapping
            .into_iter()
            .map(|(slot, old)| (slot, old_to_new[old as usize]))
            .collect();

        (
            ConditionIndex { mapping },
            conds.into_iter().map(|(cond, _)| cond).collect(),
        )
    }
}

impl ConditionIndex {
    /// Final index of a single slot.
    pub fn index(&self, slot: ConditionRef) -> Result<CondIdx> {
        self.mapping
            .get(&slot)
            .copied()
            .ok_or(ExpandError::UnknownCondition(slot))
    }

    /// Sorted, deduplicated indexes of the given slots: a compact encoding of
    /// the AND of all of them. Every slot must have been added before
    /// finalizing.
    pub fn indexes(&self, slots: &[ConditionRef]) -> Result<Vec<CondIdx>> {
        match slots {
            [] => Ok(Vec::new()),
            [single] => Ok(vec![self.index(*single)?]),
            _ => {
                let mut out = slots
                    .iter()
                    .map(|&slot| self.index(slot))
                    .collect::<Result<Vec<_>>>()?;
                out.sort_unstable();
                out.dedup();
                Ok(out)
            }
        }
    }
}
