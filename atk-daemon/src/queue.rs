//! Playback queue model
//!
//! An ordered list of track paths, a current index, a shuffle order, and a
//! repeat mode. Pure data structure owned by the session: no I/O, never
//! touched by the audio thread.
//!
//! Invariants kept by every operation:
//! - `current` is in `[0, len)` whenever the queue is non-empty
//! - with shuffle on and a non-empty queue, `shuffle_order` is a permutation
//!   of the queue's index set

use atk_common::types::RepeatMode;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of removing a track, for the session to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub uri: String,
    /// The removed track was the current one
    pub was_current: bool,
    /// A track now occupies the old current index (false when the removal
    /// emptied the queue or removed its last entry)
    pub current_still_valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Queue {
    tracks: Vec<String>,
    current: usize,
    shuffle: bool,
    shuffle_order: Vec<usize>,
    repeat: RepeatMode,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from persisted parts, sanitising the index range.
    pub fn from_parts(
        tracks: Vec<String>,
        current: usize,
        shuffle: bool,
        shuffle_order: Vec<usize>,
        repeat: RepeatMode,
    ) -> Self {
        let current = if tracks.is_empty() {
            0
        } else {
            current.min(tracks.len() - 1)
        };
        let shuffle_order = if shuffle {
            shuffle_order
                .into_iter()
                .filter(|&i| i < tracks.len())
                .collect()
        } else {
            Vec::new()
        };
        Self {
            tracks,
            current,
            shuffle,
            shuffle_order,
            repeat,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_track(&self) -> Option<&str> {
        self.tracks.get(self.current).map(String::as_str)
    }

    pub fn track_at(&self, index: usize) -> Option<&str> {
        self.tracks.get(index).map(String::as_str)
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle
    }

    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle_order
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    /// Append a track. With shuffle on, the new index is inserted into the
    /// shuffle order at a random position strictly after the current track's
    /// shuffle position.
    pub fn add(&mut self, uri: String) -> usize {
        self.tracks.push(uri);
        let new_index = self.tracks.len() - 1;

        if self.shuffle {
            let mut rng = rand::thread_rng();
            let insert_pos = if self.shuffle_order.is_empty() {
                0
            } else {
                match self.shuffle_order.iter().position(|&i| i == self.current) {
                    Some(current_pos) => rng.gen_range(current_pos + 1..=self.shuffle_order.len()),
                    None => self.shuffle_order.len(),
                }
            };
            self.shuffle_order.insert(insert_pos, new_index);
        }

        self.tracks.len()
    }

    /// Jump the current index to `index` (which must be in range).
    pub fn jump(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current = index;
        true
    }

    /// Remove the track at `index`, adjusting the current index and
    /// renumbering the shuffle order.
    pub fn remove(&mut self, index: usize) -> Option<RemoveOutcome> {
        if index >= self.tracks.len() {
            return None;
        }

        let uri = self.tracks.remove(index);
        let was_current = index == self.current;

        if index < self.current {
            self.current -= 1;
        }

        // Renumber shuffle entries past the removed index
        if !self.shuffle_order.is_empty() {
            self.shuffle_order.retain(|&i| i != index);
            for entry in self.shuffle_order.iter_mut() {
                if *entry > index {
                    *entry -= 1;
                }
            }
        }

        let current_still_valid = was_current && self.current < self.tracks.len();

        // Keep the index invariant when the removal landed at or past the end
        if !self.tracks.is_empty() && self.current >= self.tracks.len() {
            self.current = self.tracks.len() - 1;
        } else if self.tracks.is_empty() {
            self.current = 0;
        }

        Some(RemoveOutcome {
            uri,
            was_current,
            current_still_valid,
        })
    }

    /// Move a track from `from` to `to`, adjusting the current index:
    /// moving the current track carries the index along; moving a track
    /// across the current shifts it by one.
    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return false;
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if from == self.current {
            self.current = to;
        } else if from < self.current && self.current <= to {
            self.current -= 1;
        } else if to <= self.current && self.current < from {
            self.current += 1;
        }
        true
    }

    /// Clear everything and stop pointing anywhere.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = 0;
        self.shuffle_order.clear();
    }

    /// Advance to the next track. Returns false when the queue is exhausted
    /// (repeat=none at the end).
    pub fn advance(&mut self) -> bool {
        if self.tracks.is_empty() {
            return false;
        }

        if self.shuffle {
            let Some(pos) = self.shuffle_order.iter().position(|&i| i == self.current) else {
                warn!("Queue position not in shuffle order, falling back to linear");
                return self.advance_linear();
            };

            let mut next = pos + 1;
            if next >= self.shuffle_order.len() {
                if self.repeat == RepeatMode::Queue {
                    self.regenerate_shuffle();
                    next = 0;
                } else {
                    return false;
                }
            }
            self.current = self.shuffle_order[next];
            true
        } else {
            self.advance_linear()
        }
    }

    fn advance_linear(&mut self) -> bool {
        let next = self.current + 1;
        if next >= self.tracks.len() {
            if self.repeat == RepeatMode::Queue {
                self.current = 0;
                return true;
            }
            return false;
        }
        self.current = next;
        true
    }

    /// Step back to the previous track. Returns false at the start with
    /// repeat=none.
    pub fn previous(&mut self) -> bool {
        if self.tracks.is_empty() {
            return false;
        }

        if self.shuffle {
            let Some(pos) = self.shuffle_order.iter().position(|&i| i == self.current) else {
                warn!("Queue position not in shuffle order, falling back to linear");
                return self.previous_linear();
            };

            if pos == 0 {
                if self.repeat == RepeatMode::Queue {
                    self.current = self.shuffle_order[self.shuffle_order.len() - 1];
                    return true;
                }
                return false;
            }
            self.current = self.shuffle_order[pos - 1];
            true
        } else {
            self.previous_linear()
        }
    }

    fn previous_linear(&mut self) -> bool {
        if self.current == 0 {
            if self.repeat == RepeatMode::Queue && !self.tracks.is_empty() {
                self.current = self.tracks.len() - 1;
                return true;
            }
            return false;
        }
        self.current -= 1;
        true
    }

    /// Enable or disable shuffle. Enabling generates a fresh permutation
    /// with the current track moved to the front (it has conceptually just
    /// been played); disabling empties the order.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
        if enabled {
            self.regenerate_shuffle();
            if let Some(pos) = self.shuffle_order.iter().position(|&i| i == self.current) {
                self.shuffle_order.remove(pos);
                self.shuffle_order.insert(0, self.current);
            }
        } else {
            self.shuffle_order.clear();
        }
    }

    fn regenerate_shuffle(&mut self) {
        self.shuffle_order = (0..self.tracks.len()).collect();
        self.shuffle_order.shuffle(&mut rand::thread_rng());
    }
}
