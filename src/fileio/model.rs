use std::fmt;

// ---------------------------------------------------------------------------
// OrderedMap – name-keyed entries that remember insertion order
// ---------------------------------------------------------------------------

/// A small map from names to values that iterates in insertion order.
///
/// The file formats are order-sensitive (layers and columns are written in
/// the order they were added), and the maps involved hold a handful of
/// entries, so a linear scan over a `Vec` is all the lookup we need.
#[derive(Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.position(name).map(|i| &mut self.entries[i].1)
    }

    /// Return the entry for `name`, appending a default value if absent.
    pub fn get_or_insert_default(&mut self, name: &str) -> &mut V
    where
        V: Default,
    {
        let i = match self.position(name) {
            Some(i) => i,
            None => {
                self.entries.push((name.to_string(), V::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

impl<V: fmt::Debug> fmt::Debug for OrderedMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> std::ops::Index<&str> for OrderedMap<V> {
    type Output = V;

    /// Panics if `name` is absent, like `HashMap`'s `Index`.
    fn index(&self, name: &str) -> &V {
        match self.get(name) {
            Some(v) => v,
            None => panic!("no entry named '{name}'"),
        }
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_position() {
        let mut map: OrderedMap<i32> = [("fc1", 1), ("conv1", 2)].into_iter().collect();
        assert_eq!(map.insert("fc1", 3), Some(1));
        assert_eq!(map.names().collect::<Vec<_>>(), ["fc1", "conv1"]);
        assert_eq!(map.get("fc1"), Some(&3));
    }

    #[test]
    fn get_or_insert_default_appends_once() {
        let mut map: OrderedMap<Vec<u8>> = OrderedMap::new();
        map.get_or_insert_default("conv5").push(1);
        map.get_or_insert_default("conv5").push(2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("conv5"), Some(&vec![1, 2]));
    }
}
