use std::fmt;

/// Which end of the value range a [`BoundedExtremeQueue`] retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Keep the `limit` largest values seen.
    Max,
    /// Keep the `limit` smallest values seen.
    Min,
}

/// A bounded binary heap that keeps the `limit` most extreme values it has been given.
///
/// The root of the heap is always the *weakest* retained value: the smallest one for
/// [`Orientation::Max`], the largest one for [`Orientation::Min`]. Evicting the weakest
/// value is therefore a single O(log n) root removal.
///
/// Two layers of API are exposed:
///
/// * [`push`](Self::push) / [`pop`](Self::pop) / [`peek`](Self::peek) are raw heap
///   operations and ignore `limit`.
/// * [`add`](Self::add) / [`shrink`](Self::shrink) enforce `limit` on top of them.
///
/// Lowering the limit with [`set_limit`](Self::set_limit) does not evict anything by
/// itself. The queue converges back under the limit either at once through `shrink`, or
/// one element per `add`.
///
/// The queue is not synchronized. Give every producer its own instance, or wrap a shared
/// one in a lock.
#[derive(Clone)]
pub struct BoundedExtremeQueue<T> {
    heap: Vec<T>,
    limit: usize,
    orientation: Orientation,
}

impl<T: Ord> BoundedExtremeQueue<T> {
    pub fn new(limit: usize, orientation: Orientation) -> Self {
        Self {
            // one extra slot for the element that `add` pushes before evicting
            heap: Vec::with_capacity(limit.saturating_add(1)),
            limit,
            orientation,
        }
    }

    /// Queue retaining the `limit` largest values.
    pub fn max(limit: usize) -> Self {
        Self::new(limit, Orientation::Max)
    }

    /// Queue retaining the `limit` smallest values.
    pub fn min(limit: usize) -> Self {
        Self::new(limit, Orientation::Min)
    }

    /// Builds a queue from an existing collection, restoring heap order once.
    ///
    /// The limit is *not* enforced here; call [`shrink`](Self::shrink) afterwards if
    /// `items` may hold more than `limit` elements.
    pub fn from_vec(items: Vec<T>, limit: usize, orientation: Orientation) -> Self {
        let mut queue = Self {
            heap: items,
            limit,
            orientation,
        };
        queue.heapify();
        queue
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Changes the target size. Never evicts; see [`shrink`](Self::shrink).
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Raw insert. Restores heap order but ignores the limit.
    pub fn push(&mut self, value: T) {
        self.heap.push(value);
        let pos = self.heap.len() - 1;
        self.sift_up(pos);
    }

    /// Removes and returns the weakest retained value, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        let last = self.heap.len().checked_sub(1)?;
        self.heap.swap(0, last);
        let root = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        root
    }

    /// Returns the weakest retained value without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Capacity-aware insert: a `push` followed by an eviction if the queue went over
    /// its limit.
    ///
    /// If the queue was already over the limit before the call (after `set_limit` or raw
    /// pushes) one further excess element is evicted, so repeated adds walk the size down
    /// to the limit one step at a time. With a limit of zero every value is pushed and
    /// immediately evicted again.
    pub fn add(&mut self, value: T) {
        self.push(value);
        if self.heap.len() > self.limit {
            self.pop();
            if self.heap.len() > self.limit {
                self.pop();
            }
        }
    }

    /// Evicts weakest values until the queue is back within its limit.
    pub fn shrink(&mut self) {
        while self.heap.len() > self.limit {
            self.pop();
        }
    }

    /// Retained values in unspecified (heap array) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter()
    }

    /// Consumes the queue, returning its values strongest first: descending for
    /// [`Orientation::Max`], ascending for [`Orientation::Min`].
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut sorted = Vec::with_capacity(self.heap.len());
        while let Some(value) = self.pop() {
            sorted.push(value);
        }
        sorted.reverse();
        sorted
    }

    // Binary heap helper methods (0-based indexing)
    fn parent(i: usize) -> usize { (i - 1) >> 1 }
    fn left(i: usize) -> usize { 2 * i + 1 }
    fn right(i: usize) -> usize { 2 * i + 2 }

    /// `true` if `a` would be evicted before `b`.
    #[inline]
    fn is_weaker(&self, a: &T, b: &T) -> bool {
        match self.orientation {
            Orientation::Max => a < b,
            Orientation::Min => a > b,
        }
    }

    fn heapify(&mut self) {
        for pos in (0..self.heap.len() / 2).rev() {
            self.sift_down(pos);
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = Self::parent(pos);
            if self.is_weaker(&self.heap[pos], &self.heap[parent]) {
                self.heap.swap(parent, pos);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let mut weakest = pos;
            let left = Self::left(pos);
            let right = Self::right(pos);

            if left < self.heap.len() && self.is_weaker(&self.heap[left], &self.heap[weakest]) {
                weakest = left;
            }
            if right < self.heap.len() && self.is_weaker(&self.heap[right], &self.heap[weakest]) {
                weakest = right;
            }

            if weakest == pos {
                break;
            }

            self.heap.swap(pos, weakest);
            pos = weakest;
        }
    }
}

impl<T: Ord> Extend<T> for BoundedExtremeQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BoundedExtremeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedExtremeQueue")
            .field("orientation", &self.orientation)
            .field("limit", &self.limit)
            .field("len", &self.heap.len())
            .field("root", &self.heap.first())
            .finish()
    }
}
