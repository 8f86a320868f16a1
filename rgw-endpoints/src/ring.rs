//! Sorted circular list of live endpoints.
//!
//! Nodes live in a slot arena and link to each other by index, so unlinking
//! is O(1) once a slot is known and caller-held positions stay cheap to
//! validate: a slot plus a handle-identity check either still names the same
//! endpoint or it does not.

use crate::endpoint::Endpoint;

#[derive(Debug)]
struct Node {
    endpoint: Endpoint,
    next: usize,
    prev: usize,
}

/// Circular doubly-linked sequence ordered ascending by `host:port`.
#[derive(Debug, Default)]
pub(crate) struct Ring {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl Ring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head_slot(&self) -> Option<usize> {
        self.head
    }

    pub fn get(&self, slot: usize) -> Option<&Endpoint> {
        self.slots
            .get(slot)
            .and_then(|node| node.as_ref())
            .map(|node| &node.endpoint)
    }

    /// Successor slot, wrapping at the tail. `None` for a vacant slot.
    pub fn next_slot(&self, slot: usize) -> Option<usize> {
        self.slots
            .get(slot)
            .and_then(|node| node.as_ref())
            .map(|node| node.next)
    }

    /// Whether `slot` is occupied by this exact endpoint record.
    pub fn holds(&self, slot: usize, endpoint: &Endpoint) -> bool {
        self.get(slot)
            .is_some_and(|occupant| occupant.same_record(endpoint))
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.iter().any(|endpoint| endpoint.url() == url)
    }

    /// One full cycle starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.head.into_iter().flat_map(move |head| self.iter_from(head))
    }

    /// One full cycle starting at `slot`; empty when the slot is vacant.
    pub fn iter_from(&self, slot: usize) -> impl Iterator<Item = &Endpoint> + '_ {
        let mut at = self.get(slot).map(|_| slot);
        let mut remaining = if at.is_some() { self.len } else { 0 };
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let slot = at?;
            let node = self.slots.get(slot)?.as_ref()?;
            at = Some(node.next);
            Some(&node.endpoint)
        })
    }

    /// Splice the endpoint in before the first node whose key is greater or
    /// equal, keeping the ring sorted. Returns the slot it now occupies.
    pub fn insert_sorted(&mut self, endpoint: Endpoint) -> usize {
        let slot = self.alloc(Node {
            endpoint,
            next: 0,
            prev: 0,
        });
        match self.head {
            None => {
                let node = self.node_mut(slot);
                node.next = slot;
                node.prev = slot;
                self.head = Some(slot);
            }
            Some(head) => {
                let key = self.node(slot).endpoint.host_and_port().to_owned();
                if key.as_str() < self.node(head).endpoint.host_and_port() {
                    self.splice_before(slot, head);
                    self.head = Some(slot);
                } else {
                    let mut at = self.node(head).next;
                    while at != head && key.as_str() > self.node(at).endpoint.host_and_port() {
                        at = self.node(at).next;
                    }
                    self.splice_before(slot, at);
                }
            }
        }
        self.len += 1;
        slot
    }

    /// Remove the node at `slot`, repairing the adjacent links. The head
    /// advances to its successor when it is the one unlinked, and is cleared
    /// when the ring empties.
    pub fn unlink(&mut self, slot: usize) -> Option<Endpoint> {
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.len -= 1;
        if self.len == 0 {
            self.head = None;
        } else {
            self.node_mut(node.prev).next = node.next;
            self.node_mut(node.next).prev = node.prev;
            if self.head == Some(slot) {
                self.head = Some(node.next);
            }
        }
        Some(node.endpoint)
    }

    /// Drop every node and reset the arena.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.len = 0;
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn splice_before(&mut self, slot: usize, at: usize) {
        let prev = self.node(at).prev;
        {
            let node = self.node_mut(slot);
            node.next = at;
            node.prev = prev;
        }
        self.node_mut(prev).next = slot;
        self.node_mut(at).prev = slot;
    }

    fn node(&self, slot: usize) -> &Node {
        self.slots[slot].as_ref().expect("ring slot is occupied")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.slots[slot].as_mut().expect("ring slot is occupied")
    }
}
