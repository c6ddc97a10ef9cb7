// Variable-order context table and the model builder.
//
// The table maps a context (the 1..=order most recent rounded events,
// oldest first) to the list of events observed right after it, each with
// an occurrence count. Training records every suffix window of every
// position, not just the longest one: a sequence ABCD at order 3 records
// ABC:D, BC:D and C:D. This guarantees that the generator can always fall
// back to a length-1 context for any event it has emitted.
//
// Entries are stored in first-insertion order with a hash index next to
// them. Insertion order makes seed selection (uniform over distinct
// contexts, see generator.rs) an explicit draw over a list, and keeps
// every run with the same input and seed reproducible.
//
// The table is built once (`build`/`absorb`/`merge`) and then only read by
// the generator.

use crate::error::ModelError;
use crate::event::{Event, RoundedEvent, Rounding};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// An ordered window of rounded events, most recent last.
///
/// Contexts of different lengths are different keys even when one is a
/// suffix of the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context(SmallVec<[RoundedEvent; 4]>);

impl Context {
    /// Round each event of `window` into a context.
    pub fn from_events(window: &[Event], rounding: &Rounding) -> Self {
        Context(window.iter().map(|e| e.rounded(rounding)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[RoundedEvent] {
        &self.0
    }
}

/// What may follow a context: another event, or the end of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    Event(Event),
    End,
}

/// A successor with its observed occurrence count (always >= 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightedSuccessor {
    pub successor: Successor,
    pub weight: u32,
}

/// One table row: a context and its successors in first-seen order.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub context: Context,
    pub successors: Vec<WeightedSuccessor>,
}

/// Weighted transition table keyed by variable-length contexts.
#[derive(Debug, Clone)]
pub struct ContextTable {
    order: usize,
    rounding: Rounding,
    entries: Vec<ContextEntry>,
    index: FxHashMap<Context, usize>,
}

impl ContextTable {
    /// Create an empty table.
    ///
    /// Panics if `order == 0`.
    pub fn new(order: usize, rounding: Rounding) -> Self {
        assert!(order >= 1, "ContextTable::new: order must be at least 1");
        ContextTable {
            order,
            rounding,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Build a table from a single training sequence.
    pub fn build(sequence: &[Event], order: usize, rounding: Rounding) -> Self {
        let mut table = ContextTable::new(order, rounding);
        table.absorb(sequence);
        table
    }

    /// Add every suffix window of `sequence` to the table.
    ///
    /// Each call is an independent sequence: nothing links its first event
    /// to the last event of a previously absorbed sequence.
    pub fn absorb(&mut self, sequence: &[Event]) {
        for i in 0..sequence.len() {
            let successor = match sequence.get(i + 1) {
                Some(next) => Successor::Event(*next),
                None => Successor::End,
            };
            for len in 1..=self.order.min(i + 1) {
                let context = Context::from_events(&sequence[i + 1 - len..=i], &self.rounding);
                self.record(context, successor, 1);
            }
        }
    }

    /// Accumulate the counts of an independently built table into this one.
    ///
    /// Contexts and successors unknown to `self` are appended in `other`'s
    /// order. Counts only ever grow; nothing in `self` is replaced.
    pub fn merge(&mut self, other: &ContextTable) -> Result<(), ModelError> {
        if self.order != other.order || self.rounding != other.rounding {
            return Err(ModelError::OrderMismatch);
        }
        for entry in &other.entries {
            for ws in &entry.successors {
                self.record(entry.context.clone(), ws.successor, ws.weight);
            }
        }
        Ok(())
    }

    fn record(&mut self, context: Context, successor: Successor, weight: u32) {
        let slot = match self.index.get(&context) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(context.clone(), slot);
                self.entries.push(ContextEntry {
                    context,
                    successors: Vec::new(),
                });
                slot
            }
        };
        let successors = &mut self.entries[slot].successors;
        match successors.iter_mut().find(|ws| ws.successor == successor) {
            Some(ws) => ws.weight = ws.weight.saturating_add(weight),
            None => successors.push(WeightedSuccessor { successor, weight }),
        }
    }

    /// Successors of an exact context, if the context was observed.
    pub fn get(&self, context: &Context) -> Option<&[WeightedSuccessor]> {
        self.index
            .get(context)
            .map(|&slot| self.entries[slot].successors.as_slice())
    }

    /// Round `window` with this table's rounding and look it up.
    pub fn lookup(&self, window: &[Event]) -> Option<&[WeightedSuccessor]> {
        self.get(&self.context_of(window))
    }

    pub fn context_of(&self, window: &[Event]) -> Context {
        Context::from_events(window, &self.rounding)
    }

    /// Sum of successor weights for `context`, 0 if absent.
    pub fn total_weight(&self, context: &Context) -> u64 {
        self.get(context)
            .map(|s| s.iter().map(|ws| u64::from(ws.weight)).sum())
            .unwrap_or(0)
    }

    /// All rows, in first-insertion order.
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Number of distinct contexts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn rounding(&self) -> &Rounding {
        &self.rounding
    }
}
