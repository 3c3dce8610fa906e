use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Problem classification a player can queue for. `Random` is the wildcard
/// meaning no preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Graph,
    Tree,
    Array,
    Random,
}

impl Category {
    /// Fixed scan order used when pairing a wildcard player with a
    /// specific-category one. First eligible queue wins.
    pub const CONCRETE: [Category; 3] = [Category::Graph, Category::Tree, Category::Array];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "graph" => Some(Category::Graph),
            "tree" => Some(Category::Tree),
            "array" => Some(Category::Array),
            "random" => Some(Category::Random),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Graph => "graph",
            Category::Tree => "tree",
            Category::Array => "array",
            Category::Random => "random",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct QueuedPlayer {
    pub session_id: String,
    pub player_id: String,
    pub name: String,
}

/// One FIFO waiting queue per category. Insertion order is meaningful: the
/// two earliest joiners of a queue are always paired first.
#[derive(Default)]
pub struct WaitingQueues {
    graph: VecDeque<QueuedPlayer>,
    tree: VecDeque<QueuedPlayer>,
    array: VecDeque<QueuedPlayer>,
    random: VecDeque<QueuedPlayer>,
}

impl WaitingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, category: Category) -> &mut VecDeque<QueuedPlayer> {
        match category {
            Category::Graph => &mut self.graph,
            Category::Tree => &mut self.tree,
            Category::Array => &mut self.array,
            Category::Random => &mut self.random,
        }
    }

    fn queue(&self, category: Category) -> &VecDeque<QueuedPlayer> {
        match category {
            Category::Graph => &self.graph,
            Category::Tree => &self.tree,
            Category::Array => &self.array,
            Category::Random => &self.random,
        }
    }

    pub fn enqueue(&mut self, player: QueuedPlayer, category: Category) {
        self.queue_mut(category).push_back(player);
    }

    /// Removes the session from whichever queue currently holds it. Safe to
    /// call for sessions that are not queued at all.
    pub fn remove(&mut self, session_id: &str) {
        for queue in [
            &mut self.graph,
            &mut self.tree,
            &mut self.array,
            &mut self.random,
        ] {
            queue.retain(|p| p.session_id != session_id);
        }
    }

    pub fn waiting(&self, category: Category) -> usize {
        self.queue(category).len()
    }

    /// Attempts to pair two waiting players for `category`.
    ///
    /// A wildcard request first scans the concrete categories in their fixed
    /// priority order, pairing the head of the first non-empty concrete queue
    /// with the head of the random queue and resolving to that concrete
    /// category. Failing that, two wildcard players pair with each other.
    /// A concrete request only ever pairs within its own queue.
    pub fn find_match(
        &mut self,
        category: Category,
    ) -> Option<(QueuedPlayer, QueuedPlayer, Category)> {
        match category {
            Category::Random => {
                for concrete in Category::CONCRETE {
                    if self.queue(concrete).is_empty() || self.random.is_empty() {
                        continue;
                    }
                    if let (Some(specific), Some(wildcard)) =
                        (self.queue_mut(concrete).pop_front(), self.random.pop_front())
                    {
                        return Some((specific, wildcard, concrete));
                    }
                }
                if self.random.len() >= 2 {
                    if let (Some(first), Some(second)) =
                        (self.random.pop_front(), self.random.pop_front())
                    {
                        return Some((first, second, Category::Random));
                    }
                }
                None
            }
            concrete => {
                let queue = self.queue_mut(concrete);
                if queue.len() >= 2 {
                    if let (Some(first), Some(second)) = (queue.pop_front(), queue.pop_front()) {
                        return Some((first, second, concrete));
                    }
                }
                None
            }
        }
    }
}
