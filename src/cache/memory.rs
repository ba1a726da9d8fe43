//! Bounded in-memory tier with least-recently-used eviction.

use linked_hash_map::LinkedHashMap;

use super::traits::{CacheEntry, CacheKey};

/// In-memory cache table ordered by recency.
///
/// The front of the map is the least recently used key. Both `get` and `put`
/// count as an access and move the key to the back.
#[derive(Debug)]
pub struct MemoryStore {
  entries: LinkedHashMap<CacheKey, CacheEntry>,
  max_size: usize,
}

impl MemoryStore {
  /// `max_size` is clamped to at least one entry.
  pub fn new(max_size: usize) -> Self {
    Self {
      entries: LinkedHashMap::new(),
      max_size: max_size.max(1),
    }
  }

  pub fn max_size(&self) -> usize {
    self.max_size
  }

  /// Look up a key, marking it most recently used.
  pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
    self.entries.get_refresh(key).map(|entry| &*entry)
  }

  /// Look up a key without touching recency.
  pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry> {
    self.entries.get(key)
  }

  /// Insert or overwrite, marking the key most recently used.
  ///
  /// Returns the evicted least-recently-used entry when the insert pushed the
  /// table over capacity.
  pub fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Option<(CacheKey, CacheEntry)> {
    // Remove first so an overwrite always lands at the back.
    self.entries.remove(&key);
    self.entries.insert(key, entry);

    if self.entries.len() > self.max_size {
      self.entries.pop_front()
    } else {
      None
    }
  }

  pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
    self.entries.remove(key)
  }

  /// Remove every entry whose resource id matches `predicate`.
  pub fn remove_where<P>(&mut self, mut predicate: P) -> Vec<CacheKey>
  where
    P: FnMut(&str) -> bool,
  {
    let doomed: Vec<CacheKey> = self
      .entries
      .keys()
      .filter(|key| predicate(key.resource_id()))
      .cloned()
      .collect();

    for key in &doomed {
      self.entries.remove(key);
    }

    doomed
  }

  /// Drop everything, returning how many entries were removed.
  pub fn clear(&mut self) -> usize {
    let count = self.entries.len();
    self.entries.clear();
    count
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries from least to most recently used.
  pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry)> {
    self.entries.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn entry(tag: &str) -> CacheEntry {
    let mut record = serde_json::Map::new();
    record.insert("tag".into(), tag.into());
    CacheEntry::new(vec![record], Utc::now())
  }

  fn key(id: &str) -> CacheKey {
    CacheKey::new(id, "Sheet1")
  }

  fn order(store: &MemoryStore) -> Vec<String> {
    store.iter().map(|(k, _)| k.resource_id().to_string()).collect()
  }

  #[test]
  fn test_put_evicts_least_recently_used() {
    let mut store = MemoryStore::new(2);
    assert!(store.put(key("a"), entry("a")).is_none());
    assert!(store.put(key("b"), entry("b")).is_none());

    let (evicted, _) = store.put(key("c"), entry("c")).unwrap();
    assert_eq!(evicted, key("a"));
    assert_eq!(store.len(), 2);
    assert_eq!(order(&store), vec!["b", "c"]);
  }

  #[test]
  fn test_get_refreshes_recency() {
    let mut store = MemoryStore::new(2);
    store.put(key("a"), entry("a"));
    store.put(key("b"), entry("b"));

    assert!(store.get(&key("a")).is_some());
    let (evicted, _) = store.put(key("c"), entry("c")).unwrap();
    assert_eq!(evicted, key("b"));
  }

  #[test]
  fn test_peek_does_not_refresh() {
    let mut store = MemoryStore::new(2);
    store.put(key("a"), entry("a"));
    store.put(key("b"), entry("b"));

    assert!(store.peek(&key("a")).is_some());
    let (evicted, _) = store.put(key("c"), entry("c")).unwrap();
    assert_eq!(evicted, key("a"));
  }

  #[test]
  fn test_overwrite_moves_to_back_without_growing() {
    let mut store = MemoryStore::new(3);
    store.put(key("a"), entry("a1"));
    store.put(key("b"), entry("b"));
    assert!(store.put(key("a"), entry("a2")).is_none());

    assert_eq!(store.len(), 2);
    assert_eq!(order(&store), vec!["b", "a"]);
    assert_eq!(store.peek(&key("a")).unwrap().value[0]["tag"], "a2");
  }

  #[test]
  fn test_remove_where_only_matching_resource() {
    let mut store = MemoryStore::new(10);
    store.put(CacheKey::new("r1", "A"), entry("1"));
    store.put(CacheKey::new("r2", "A"), entry("2"));
    store.put(CacheKey::new("r1", "B"), entry("3"));

    let removed = store.remove_where(|id| id == "r1");
    assert_eq!(removed.len(), 2);
    assert_eq!(store.len(), 1);
    assert!(store.peek(&CacheKey::new("r2", "A")).is_some());
  }

  #[test]
  fn test_zero_capacity_is_clamped() {
    let mut store = MemoryStore::new(0);
    assert_eq!(store.max_size(), 1);
    store.put(key("a"), entry("a"));
    store.put(key("b"), entry("b"));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_clear_reports_count() {
    let mut store = MemoryStore::new(4);
    store.put(key("a"), entry("a"));
    store.put(key("b"), entry("b"));
    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());
  }
}
