//! Lazy Cartesian products over borrowed lists
//!
//! Tuples are produced in odometer order: the last source varies fastest.
//! Source order is preserved and nothing is deduplicated. A product with an
//! empty source, or with no sources at all, has no tuples.

/// A set of sources whose Cartesian product can be iterated any number of
/// times
#[derive(Debug)]
pub struct Tuples<'a, T> {
    sources: Vec<&'a [T]>,
}

impl<'a, T> Default for Tuples<'a, T> {
    fn default() -> Self {
        Self { sources: Vec::new() }
    }
}

impl<'a, T> Tuples<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source; it becomes the fastest varying position
    pub fn add(&mut self, source: &'a [T]) {
        self.sources.push(source);
    }

    pub fn width(&self) -> usize {
        self.sources.len()
    }

    /// Number of tuples the product yields
    pub fn count(&self) -> usize {
        if self.sources.is_empty() {
            return 0;
        }
        self.sources.iter().map(|s| s.len()).product()
    }

    /// A fresh iterator from the first tuple
    pub fn iter(&self) -> TupleIter<'a, T> {
        let done = self.sources.is_empty() || self.sources.iter().any(|s| s.is_empty());
        TupleIter {
            sources: self.sources.clone(),
            positions: vec![0; self.sources.len()],
            done,
        }
    }
}

/// Iterator over the tuples of a [`Tuples`] product
#[derive(Debug)]
pub struct TupleIter<'a, T> {
    sources: Vec<&'a [T]>,
    positions: Vec<usize>,
    done: bool,
}

impl<'a, T> Iterator for TupleIter<'a, T> {
    type Item = Vec<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tuple = self
            .sources
            .iter()
            .zip(&self.positions)
            .map(|(&source, &i)| &source[i])
            .collect();

        // Advance the odometer from the last position
        let mut carry = true;
        for (pos, source) in self.positions.iter_mut().zip(&self.sources).rev() {
            *pos += 1;
            if *pos < source.len() {
                carry = false;
                break;
            }
            *pos = 0;
        }
        self.done = carry;
        Some(tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odometer_order() {
        let a = vec!["1", "2"];
        let b = vec!["x", "y", "z"];
        let mut t = Tuples::new();
        t.add(&a);
        t.add(&b);
        let rendered: Vec<String> = t.iter().map(|tuple| format!("{}{}", tuple[0], tuple[1])).collect();
        assert_eq!(rendered, vec!["1x", "1y", "1z", "2x", "2y", "2z"]);
        assert_eq!(t.count(), 6);
    }

    #[test]
    fn test_single_source() {
        let a = vec![1, 2, 3];
        let mut t = Tuples::new();
        t.add(&a);
        let out: Vec<i32> = t.iter().map(|tuple| *tuple[0]).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let a = vec![1, 2];
        let b: Vec<i32> = Vec::new();
        let mut t = Tuples::new();
        t.add(&a);
        t.add(&b);
        assert_eq!(t.iter().count(), 0);
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn test_no_sources_yields_nothing() {
        let t: Tuples<'_, i32> = Tuples::new();
        assert_eq!(t.iter().next(), None);
    }

    #[test]
    fn test_restartable_and_not_deduplicated() {
        let a = vec![7, 7];
        let b = vec![1];
        let mut t = Tuples::new();
        t.add(&a);
        t.add(&b);
        let first: Vec<Vec<&i32>> = t.iter().collect();
        let second: Vec<Vec<&i32>> = t.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
