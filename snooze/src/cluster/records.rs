use linked_hash_map::LinkedHashMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct PeerRecord<V> {
  pub value: V,
  pub last: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
  Inserted,
  Updated,
  /// Older than what the table already holds. Nothing changed.
  Stale,
  /// Not in the table, and the operation does not insert.
  Unknown,
}

/// Soft-state records of peers keyed by host, each stamped with its last heartbeat.
///
/// Iteration follows insertion order, which is also the round-robin order used by elections.
/// Writes are last-write-wins by timestamp, so a record's timestamp never moves backwards no
/// matter what order heartbeats arrive in.
#[derive(Clone, Debug)]
pub struct PeerTable<V> {
  peers: LinkedHashMap<String, PeerRecord<V>>,
}
impl<V> Default for PeerTable<V> {
  fn default() -> Self {
    PeerTable {
      peers: LinkedHashMap::new(),
    }
  }
}
impl<V> PeerTable<V> {
  pub fn new() -> PeerTable<V> {
    PeerTable::default()
  }

  pub fn len(&self) -> usize {
    self.peers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.peers.is_empty()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.peers.contains_key(id)
  }

  pub fn get(&self, id: &str) -> Option<&PeerRecord<V>> {
    self.peers.get(id)
  }

  pub fn get_mut(&mut self, id: &str) -> Option<&mut PeerRecord<V>> {
    self.peers.get_mut(id)
  }

  pub fn remove(&mut self, id: &str) -> Option<PeerRecord<V>> {
    self.peers.remove(id)
  }

  pub fn keys(&self) -> impl Iterator<Item = &String> {
    self.peers.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &PeerRecord<V>)> {
    self.peers.iter()
  }

  /// The key at `index` in insertion order, wrapping around.
  pub fn nth_wrapped(&self, index: usize) -> Option<&String> {
    if self.peers.is_empty() {
      None
    } else {
      self.peers.keys().nth(index % self.peers.len())
    }
  }

  /// Inserts the record, or overwrites it if `at` is not older than what is held. An existing
  /// record keeps its place in the iteration order.
  pub fn upsert(&mut self, id: &str, value: V, at: Duration) -> Upsert {
    match self.update(id, value, at) {
      Err(value) => {
        self.peers.insert(
          id.to_string(),
          PeerRecord {
            value: value,
            last: at,
          },
        );
        Upsert::Inserted
      }
      Ok(res) => res,
    }
  }

  /// Like [`upsert`](PeerTable::upsert), but unknown peers are left out and get
  /// [`Upsert::Unknown`].
  pub fn refresh(&mut self, id: &str, value: V, at: Duration) -> Upsert {
    self.update(id, value, at).unwrap_or(Upsert::Unknown)
  }

  fn update(&mut self, id: &str, value: V, at: Duration) -> Result<Upsert, V> {
    match self.peers.get_mut(id) {
      Some(rec) if at < rec.last => Ok(Upsert::Stale),
      Some(rec) => {
        rec.value = value;
        rec.last = at;
        Ok(Upsert::Updated)
      }
      None => Err(value),
    }
  }

  /// Moves the timestamp forward without touching the value.
  pub fn touch(&mut self, id: &str, at: Duration) -> Upsert {
    match self.peers.get_mut(id) {
      Some(rec) if at < rec.last => Upsert::Stale,
      Some(rec) => {
        rec.last = at;
        Upsert::Updated
      }
      None => Upsert::Unknown,
    }
  }

  /// Removes and returns every record with `now - last > timeout`.
  pub fn sweep(&mut self, now: Duration, timeout: Duration) -> Vec<(String, PeerRecord<V>)> {
    self.sweep_where(now, timeout, |_| true)
  }

  /// Like [`sweep`](PeerTable::sweep), but only records whose value satisfies `pred` expire.
  pub fn sweep_where<F>(
    &mut self,
    now: Duration,
    timeout: Duration,
    pred: F,
  ) -> Vec<(String, PeerRecord<V>)>
  where
    F: Fn(&V) -> bool,
  {
    let dead = self
      .peers
      .iter()
      .filter(|(_, rec)| pred(&rec.value))
      .filter(|(_, rec)| now.checked_sub(rec.last).map(|age| age > timeout).unwrap_or(false))
      .map(|(id, _)| id.clone())
      .collect::<Vec<_>>();
    dead
      .into_iter()
      .filter_map(|id| self.peers.remove(&id).map(|rec| (id, rec)))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::SmallRng;
  use rand::seq::SliceRandom;
  use rand::SeedableRng;

  fn ms(x: u64) -> Duration {
    Duration::from_millis(x)
  }

  #[test]
  fn out_of_order_heartbeats_never_rewind() {
    let mut rng = SmallRng::seed_from_u64(17);
    for _ in 0..20 {
      let mut stamps = (0..50u64).collect::<Vec<_>>();
      stamps.shuffle(&mut rng);
      let mut table = PeerTable::new();
      let mut max = 0;
      for s in stamps {
        table.upsert("lc-1", s, ms(s));
        let rec = table.get("lc-1").unwrap();
        max = max.max(s);
        assert_eq!(rec.last, ms(max));
        assert_eq!(rec.value, max);
      }
    }
  }

  #[test]
  fn stale_writes_are_reported() {
    let mut table = PeerTable::new();
    assert_eq!(table.upsert("gm", 1, ms(10)), Upsert::Inserted);
    assert_eq!(table.upsert("gm", 2, ms(5)), Upsert::Stale);
    assert_eq!(table.upsert("gm", 3, ms(10)), Upsert::Updated);
    assert_eq!(table.get("gm").unwrap().value, 3);
    assert_eq!(table.refresh("other", 4, ms(20)), Upsert::Unknown);
    assert!(!table.contains("other"));
    assert_eq!(table.touch("gm", ms(30)), Upsert::Updated);
    assert_eq!(table.get("gm").unwrap().last, ms(30));
  }

  #[test]
  fn sweep_removes_exactly_the_expired() {
    let timeout = ms(100);
    let mut table = PeerTable::new();
    table.upsert("a", (), ms(0));
    table.upsert("b", (), ms(50));
    table.upsert("c", (), ms(100));

    // a's age is exactly the timeout, which is not yet dead
    assert!(table.sweep(ms(100), timeout).is_empty());
    let dead = table.sweep(ms(101), timeout);
    assert_eq!(dead.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["a"]);
    let dead = table.sweep(ms(151), timeout);
    assert_eq!(dead.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(table.keys().collect::<Vec<_>>(), vec!["c"]);
  }

  #[test]
  fn filtered_sweep_spares_the_rest() {
    let timeout = ms(100);
    let mut table = PeerTable::new();
    table.upsert("lc-1", "joining", ms(0));
    table.upsert("lc-2", "attached", ms(0));
    table.upsert("lc-3", "joining", ms(90));

    let dead = table.sweep_where(ms(150), timeout, |v| *v == "joining");
    assert_eq!(dead.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["lc-1"]);
    assert_eq!(table.keys().collect::<Vec<_>>(), vec!["lc-2", "lc-3"]);
  }

  #[test]
  fn updates_keep_insertion_order() {
    let mut table = PeerTable::new();
    table.upsert("gm-1", (), ms(1));
    table.upsert("gm-2", (), ms(2));
    table.upsert("gm-3", (), ms(3));
    table.upsert("gm-1", (), ms(4));
    assert_eq!(table.nth_wrapped(0).map(|x| x.as_str()), Some("gm-1"));
    assert_eq!(table.nth_wrapped(4).map(|x| x.as_str()), Some("gm-2"));
  }
}
