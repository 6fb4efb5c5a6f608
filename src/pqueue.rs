//! Indexed binary min-heap over externally stored items.
//!
//! The heap stores plain item ids; the items themselves live in an arena
//! owned by the caller (a `Vec` of nodes, edges, ...) and a mutable slice of
//! that arena is passed to every operation. Each contained item records its
//! own heap position through the [`QueueItem`] contract, which makes removal
//! of an arbitrary item and priority-change notification O(log n), and
//! membership checks O(1).

/// Heap position of an item that is not in any queue.
pub const NO_POSITION: usize = usize::MAX;

/// Contract for anything placed in an [`IndexedPriorityQueue`].
pub trait QueueItem {
    /// Current position in the heap array, or [`NO_POSITION`].
    fn heap_index(&self) -> usize;
    fn set_heap_index(&mut self, position: usize);
    /// Strict ordering: `true` if `self` must be popped before `other`.
    /// Two items tie when neither is before the other.
    fn before(&self, other: &Self) -> bool;
}

#[derive(Debug, Default, Clone)]
pub struct IndexedPriorityQueue {
    heap: Vec<usize>,
}

impl IndexedPriorityQueue {
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// O(1) membership test. An item can belong to several queues' arenas but
    /// to at most one queue at a time, so the position check is exact.
    pub fn contains<T: QueueItem>(&self, items: &[T], id: usize) -> bool {
        let pos = items[id].heap_index();
        pos < self.heap.len() && self.heap[pos] == id
    }

    pub fn add<T: QueueItem>(&mut self, items: &mut [T], id: usize) {
        debug_assert!(!self.contains(items, id));
        let pos = self.heap.len();
        self.heap.push(id);
        items[id].set_heap_index(pos);
        self.sift_up(items, pos);
    }

    /// Removes an arbitrary contained item.
    pub fn remove<T: QueueItem>(&mut self, items: &mut [T], id: usize) {
        debug_assert!(self.contains(items, id));
        let pos = items[id].heap_index();
        let moved = self.heap.pop().unwrap();
        items[id].set_heap_index(NO_POSITION);
        if pos < self.heap.len() {
            self.heap[pos] = moved;
            items[moved].set_heap_index(pos);
            self.restore(items, pos);
        }
    }

    /// Re-establishes the heap invariant after the caller changed the
    /// priority of a contained item in place.
    pub fn note_changed_priority<T: QueueItem>(&mut self, items: &mut [T], id: usize) {
        debug_assert!(self.contains(items, id));
        let pos = items[id].heap_index();
        self.restore(items, pos);
    }

    /// Id of the minimum item, if any.
    pub fn top(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    pub fn pop<T: QueueItem>(&mut self, items: &mut [T]) -> Option<usize> {
        let id = self.top()?;
        self.remove(items, id);
        Some(id)
    }

    /// Appends to `out` every item tied with the minimum. Ties can only sit
    /// in subtrees whose root already ties, so the walk stays proportional to
    /// the answer size.
    pub fn all_top<T: QueueItem>(&self, items: &[T], out: &mut Vec<usize>) {
        let Some(min_id) = self.top() else {
            return;
        };
        let mut stack = vec![0usize];
        while let Some(pos) = stack.pop() {
            let id = self.heap[pos];
            if items[id].before(&items[min_id]) || items[min_id].before(&items[id]) {
                continue;
            }
            out.push(id);
            let left = 2 * pos + 1;
            if left < self.heap.len() {
                stack.push(left);
            }
            let right = 2 * pos + 2;
            if right < self.heap.len() {
                stack.push(right);
            }
        }
    }

    fn restore<T: QueueItem>(&mut self, items: &mut [T], pos: usize) {
        let pos = self.sift_up(items, pos);
        self.sift_down(items, pos);
    }

    fn sift_up<T: QueueItem>(&mut self, items: &mut [T], mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !items[self.heap[pos]].before(&items[self.heap[parent]]) {
                break;
            }
            self.swap(items, pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down<T: QueueItem>(&mut self, items: &mut [T], mut pos: usize) {
        loop {
            let mut best = pos;
            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < self.heap.len()
                    && items[self.heap[child]].before(&items[self.heap[best]])
                {
                    best = child;
                }
            }
            if best == pos {
                return;
            }
            self.swap(items, pos, best);
            pos = best;
        }
    }

    fn swap<T: QueueItem>(&mut self, items: &mut [T], a: usize, b: usize) {
        self.heap.swap(a, b);
        items[self.heap[a]].set_heap_index(a);
        items[self.heap[b]].set_heap_index(b);
    }
}
