use std::collections::vec_deque::{IntoIter, Iter, IterMut};
use std::collections::VecDeque;

/// An owned, ordered list used for redirection chains and the simple
/// commands of a compound command.
///
/// Supports cheap insertion at both ends: the parser builds compound
/// commands from the right, so `prepend` is the common operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct List<T> {
    items: VecDeque<T>,
}

impl<T> List<T> {
    /// Creates a new, empty list.
    pub fn new() -> Self {
        List {
            items: VecDeque::new(),
        }
    }

    /// Creates a list holding exactly one element.
    pub fn single(head: T) -> Self {
        let mut list = List::new();
        list.push(head);
        list
    }

    /// Inserts an element in front of the current head.
    pub fn prepend(&mut self, head: T) {
        self.items.push_front(head);
    }

    /// Appends an element after the current last element.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        List {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for List<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut List<T> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_puts_element_first() {
        let mut list = List::single(2);
        list.prepend(1);
        list.push(3);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&3));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_empty_list() {
        let list: List<String> = List::new();
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }
}
