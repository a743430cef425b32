use std::collections::{HashSet, VecDeque};

/// Round-robin order over tracked event ids.
///
/// Only used to produce a fairness-rotated display order; it does not drive
/// fetching.
#[derive(Debug, Default, Clone)]
pub struct RotationQueue {
    ids: VecDeque<String>,
}

impl RotationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue content with `ids`, keeping their order.
    pub fn populate<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
    }

    /// Move the front id to the back and return the new order.
    /// An empty queue stays empty.
    pub fn rotate(&mut self) -> Vec<String> {
        if let Some(front) = self.ids.pop_front() {
            self.ids.push_back(front);
        }
        self.order()
    }

    pub fn order(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append known ids that are not queued yet, in the order given. With
    /// `drop_completed`, completed ids are removed and never re-added.
    /// Returns how many ids were added and removed.
    pub fn sync<'a>(
        &mut self,
        known: impl IntoIterator<Item = &'a str>,
        completed: impl IntoIterator<Item = &'a str>,
        drop_completed: bool,
    ) -> (usize, usize) {
        let done: HashSet<&str> = if drop_completed {
            completed.into_iter().collect()
        } else {
            HashSet::new()
        };

        let before = self.ids.len();
        self.ids.retain(|id| !done.contains(id.as_str()));
        let removed = before - self.ids.len();

        let mut queued: HashSet<String> = self.ids.iter().cloned().collect();
        let mut added = 0;
        for id in known {
            if !done.contains(id) && queued.insert(id.to_string()) {
                self.ids.push_back(id.to_string());
                added += 1;
            }
        }
        (added, removed)
    }
}
