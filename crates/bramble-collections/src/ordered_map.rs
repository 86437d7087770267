use std::borrow::Borrow;

/// Map with ascending key order and deterministic enumeration.
///
/// Insertion keeps the backing vector sorted, so iteration order is the
/// key order regardless of the order entries arrived in. Duplicate keys
/// are rejected rather than replaced; callers that want the existing
/// entry look it up after a failed insert.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
}

impl<K: Ord, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the key-ordered position. Returns the pair unchanged if
    /// the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), (K, V)> {
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(_) => Err((key, value)),
            Err(idx) => {
                self.entries.insert(idx, (key, value));
                Ok(())
            }
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.index_of(key).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.index_of(key).map(|idx| &mut self.entries[idx].1)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.index_of(key).is_some()
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.index_of(key).map(|idx| self.entries.remove(idx).1)
    }

    /// Ascending-key iteration.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Keep only the entries the predicate accepts.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.entries.retain(|(k, v)| f(k, v));
    }

    /// First entry satisfying the predicate, in key order.
    pub fn find<F>(&self, mut f: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.entries.iter().find(|(k, v)| f(k, v)).map(|(k, v)| (k, v))
    }

    fn index_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries
            .binary_search_by(|(k, _)| k.borrow().cmp(key))
            .ok()
    }
}

impl<K: Ord, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            // last duplicate loses, matching insert semantics
            let _ = map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_key_order() {
        let mut map = OrderedMap::new();
        for key in ["/dev/storage", "/dev/manager", "/dev/iomem"] {
            map.insert(key.to_string(), ()).unwrap();
        }
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["/dev/iomem", "/dev/manager", "/dev/storage"]);
    }

    #[test]
    fn duplicate_insert_returns_pair() {
        let mut map = OrderedMap::new();
        map.insert("a", 1).unwrap();
        assert_eq!(map.insert("a", 2), Err(("a", 2)));
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn remove_missing_is_none() {
        let mut map: OrderedMap<&str, u32> = OrderedMap::new();
        assert_eq!(map.remove("nope"), None);
    }
}
