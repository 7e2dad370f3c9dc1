//! Recency ordering for the evicting cache.
//!
//! A doubly linked list stored in an arena. Slots `0` and `1` are permanent
//! head/tail sentinels, so linking and unlinking never special-case the ends.
//! Released slots go on a free list and are reused by later insertions.

/// Index of a node inside the arena.
pub(crate) type NodeId = usize;

const HEAD: NodeId = 0;
const TAIL: NodeId = 1;

#[derive(Debug)]
struct Node<K> {
    /// `None` for sentinels and free slots.
    key: Option<K>,
    prev: NodeId,
    next: NodeId,
}

/// Arena-backed LRU list. The front is the most recently used end.
#[derive(Debug)]
pub(crate) struct LruList<K> {
    nodes: Vec<Node<K>>,
    free: Vec<NodeId>,
    len: usize,
}

impl<K> LruList<K> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![
                Node {
                    key: None,
                    prev: HEAD,
                    next: TAIL,
                },
                Node {
                    key: None,
                    prev: HEAD,
                    next: TAIL,
                },
            ],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of linked (non-sentinel) nodes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert `key` at the most recently used end.
    pub(crate) fn push_front(&mut self, key: K) -> NodeId {
        let id = self.allocate(key);
        self.link_after(HEAD, id);
        id
    }

    /// Insert `key` at the least recently used end.
    #[cfg(test)]
    pub(crate) fn push_back(&mut self, key: K) -> NodeId {
        let id = self.allocate(key);
        let before_tail = self.nodes[TAIL].prev;
        self.link_after(before_tail, id);
        id
    }

    /// Move a linked node to the front. Returns `false` if `id` is not a live node.
    pub(crate) fn move_to_front(&mut self, id: NodeId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        if self.nodes[HEAD].next != id {
            self.unlink(id);
            self.link_after(HEAD, id);
        }
        true
    }

    /// Unlink and release a node, returning its key. Sentinels and free slots are ignored.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<K> {
        if !self.is_live(id) {
            return None;
        }
        self.unlink(id);
        self.free.push(id);
        self.len -= 1;
        self.nodes[id].key.take()
    }

    /// The least recently used node, if any.
    pub(crate) fn back(&self) -> Option<NodeId> {
        let id = self.nodes[TAIL].prev;
        (id != HEAD).then_some(id)
    }

    /// Key stored at a live node.
    pub(crate) fn key(&self, id: NodeId) -> Option<&K> {
        if self.is_live(id) {
            self.nodes[id].key.as_ref()
        } else {
            None
        }
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.free.clear();
        self.len = 0;
    }

    /// Keys from most to least recently used.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> {
        let mut cursor = self.nodes[HEAD].next;
        std::iter::from_fn(move || {
            if cursor == TAIL {
                return None;
            }
            let node = &self.nodes[cursor];
            cursor = node.next;
            node.key.as_ref()
        })
    }

    fn is_live(&self, id: NodeId) -> bool {
        id > TAIL && id < self.nodes.len() && self.nodes[id].key.is_some()
    }

    fn allocate(&mut self, key: K) -> NodeId {
        self.len += 1;
        match self.free.pop() {
            Some(id) => {
                self.nodes[id].key = Some(key);
                id
            }
            None => {
                self.nodes.push(Node {
                    key: Some(key),
                    prev: HEAD,
                    next: TAIL,
                });
                self.nodes.len() - 1
            }
        }
    }

    fn link_after(&mut self, anchor: NodeId, id: NodeId) {
        let next = self.nodes[anchor].next;
        self.nodes[id].prev = anchor;
        self.nodes[id].next = next;
        self.nodes[anchor].next = id;
        self.nodes[next].prev = id;
    }

    fn unlink(&mut self, id: NodeId) {
        let prev = self.nodes[id].prev;
        let next = self.nodes[id].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }
}
