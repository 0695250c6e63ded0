//! Priority-Ordered List
//!
//! Vec-backed list kept in priority-descending order. Items of equal priority
//! keep their insertion order, which is what hook dispatch relies on.

#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    items: Vec<(i32, T)>, // (priority, item)
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert after every existing item of the same or higher priority
    pub fn push(&mut self, priority: i32, item: T) {
        let pos = self.items.partition_point(|(p, _)| *p >= priority);
        self.items.insert(pos, (priority, item));
    }

    /// Remove the first item matching the predicate
    pub fn remove_by<F>(&mut self, predicate: F) -> Option<(i32, T)>
    where
        F: Fn(&T) -> bool,
    {
        let pos = self.items.iter().position(|(_, item)| predicate(item))?;
        Some(self.items.remove(pos))
    }

    /// Keep only the items matching the predicate, returning how many were dropped
    pub fn retain<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.items.len();
        self.items.retain(|(_, item)| predicate(item));
        before - self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i32, T)> {
        self.items.iter()
    }

    pub fn find<F>(&self, predicate: F) -> Option<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.items.iter().find(|(_, item)| predicate(item)).map(|(_, item)| item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T: Clone> PriorityQueue<T> {
    /// Copy of the items in dispatch order
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().map(|(_, item)| item.clone()).collect()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_descending_order() {
        let mut pq = PriorityQueue::new();
        pq.push(5, "medium");
        pq.push(10, "high");
        pq.push(1, "low");
        assert_eq!(pq.snapshot(), vec!["high", "medium", "low"]);
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let mut pq = PriorityQueue::new();
        pq.push(10, "first");
        pq.push(0, "tail");
        pq.push(10, "second");
        pq.push(10, "third");
        pq.push(-5, "negative");
        assert_eq!(pq.snapshot(), vec!["first", "second", "third", "tail", "negative"]);
    }

    #[test]
    fn test_remove_and_retain() {
        let mut pq = PriorityQueue::new();
        pq.push(3, "a");
        pq.push(2, "b");
        pq.push(1, "c");

        assert_eq!(pq.remove_by(|item| *item == "b"), Some((2, "b")));
        assert!(pq.remove_by(|item| *item == "b").is_none());
        assert_eq!(pq.len(), 2);

        assert_eq!(pq.retain(|item| *item != "a"), 1);
        assert_eq!(pq.snapshot(), vec!["c"]);
        assert!(pq.find(|item| *item == "c").is_some());

        pq.retain(|_| false);
        assert!(pq.is_empty());
    }
}
