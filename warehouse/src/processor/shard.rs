//! A sharded, in-memory collection of records.
//!
//! Shards are processed in parallel with rayon. Map and filter stay inside a
//! shard; `shuffle` is the only operation that moves records between shards
//! and is what `distinct`, `reduce_by_key` and `join` are built on. Record
//! order is deterministic: shards keep their order, and a shuffle appends
//! records to their target shard in source-shard order.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sharded<T> {
    shards: Vec<Vec<T>>,
}

/// Hash with fixed keys so that shard assignment is stable across runs.
fn stable_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<T: Send> Sharded<T> {
    pub fn from_shards(shards: Vec<Vec<T>>) -> Self {
        if shards.is_empty() {
            return Self { shards: vec![Vec::new()] };
        }
        Self { shards }
    }

    /// Splits `items` into `shard_count` contiguous shards of near-equal size.
    pub fn from_vec(items: Vec<T>, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = items.len().div_ceil(shard_count).max(1);

        let mut shards: Vec<Vec<T>> = Vec::with_capacity(shard_count);
        let mut items = items.into_iter();
        while shards.len() < shard_count {
            shards.push(items.by_ref().take(per_shard).collect());
        }
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Vec::is_empty)
    }

    pub fn shards(&self) -> &[Vec<T>] {
        &self.shards
    }

    pub fn into_vec(self) -> Vec<T> {
        self.shards.into_iter().flatten().collect()
    }

    /// Runs `f` over every shard in parallel, passing the shard index.
    pub fn map_shards<U, F>(self, f: F) -> Sharded<U>
    where
        U: Send,
        F: Fn(usize, Vec<T>) -> Vec<U> + Sync + Send,
    {
        let shards = self
            .shards
            .into_par_iter()
            .enumerate()
            .map(|(idx, shard)| f(idx, shard))
            .collect();
        Sharded { shards }
    }

    pub fn map<U, F>(self, f: F) -> Sharded<U>
    where
        U: Send,
        F: Fn(T) -> U + Sync + Send,
    {
        self.map_shards(|_, shard| shard.into_iter().map(&f).collect())
    }

    pub fn filter<F>(self, f: F) -> Sharded<T>
    where
        F: Fn(&T) -> bool + Sync + Send,
    {
        self.map_shards(|_, shard| shard.into_iter().filter(|item| f(item)).collect())
    }

    pub fn filter_map<U, F>(self, f: F) -> Sharded<U>
    where
        U: Send,
        F: Fn(T) -> Option<U> + Sync + Send,
    {
        self.map_shards(|_, shard| shard.into_iter().filter_map(&f).collect())
    }

    /// Redistributes records into `shard_count` shards so that records with
    /// equal keys land in the same shard.
    pub fn shuffle<K, F>(self, shard_count: usize, key: F) -> Sharded<T>
    where
        K: Hash,
        F: Fn(&T) -> K + Sync + Send,
    {
        let shard_count = shard_count.max(1);

        let buckets: Vec<Vec<Vec<T>>> = self
            .shards
            .into_par_iter()
            .map(|shard| {
                let mut buckets: Vec<Vec<T>> = (0..shard_count).map(|_| Vec::new()).collect();
                for item in shard {
                    let target = (stable_hash(&key(&item)) % shard_count as u64) as usize;
                    buckets[target].push(item);
                }
                buckets
            })
            .collect();

        let mut shards: Vec<Vec<T>> = (0..shard_count).map(|_| Vec::new()).collect();
        for source in buckets {
            for (target, bucket) in source.into_iter().enumerate() {
                shards[target].extend(bucket);
            }
        }
        Sharded { shards }
    }

    /// Keeps one record per key. `prefer(candidate, current)` returns true when
    /// the candidate should replace the record kept so far.
    pub fn reduce_by_key<K, F, P>(self, shard_count: usize, key: F, prefer: P) -> Sharded<T>
    where
        K: Hash + Eq,
        F: Fn(&T) -> K + Sync + Send,
        P: Fn(&T, &T) -> bool + Sync + Send,
    {
        self.shuffle(shard_count, &key).map_shards(|_, shard| {
            let mut slots: HashMap<K, usize> = HashMap::with_capacity(shard.len());
            let mut kept: Vec<T> = Vec::with_capacity(shard.len());
            for item in shard {
                let k = key(&item);
                match slots.get(&k).copied() {
                    Some(idx) => {
                        if prefer(&item, &kept[idx]) {
                            kept[idx] = item;
                        }
                    }
                    None => {
                        slots.insert(k, kept.len());
                        kept.push(item);
                    }
                }
            }
            kept
        })
    }

    /// Joins every record with the records of `right` sharing its key.
    ///
    /// Records whose key is `None` never match. With [`JoinKind::LeftOuter`]
    /// an unmatched left record is combined with `None`; with
    /// [`JoinKind::Inner`] it is dropped. A left record matching several
    /// right records is emitted once per match.
    pub fn join<R, K, FL, FR, C, O>(
        self,
        right: Sharded<R>,
        shard_count: usize,
        kind: JoinKind,
        left_key: FL,
        right_key: FR,
        combine: C,
    ) -> Sharded<O>
    where
        T: Clone,
        R: Send + Sync,
        K: Hash + Eq,
        O: Send,
        FL: Fn(&T) -> Option<K> + Sync + Send,
        FR: Fn(&R) -> Option<K> + Sync + Send,
        C: Fn(T, Option<&R>) -> O + Sync + Send,
    {
        let shard_count = shard_count.max(1);
        let left = self.shuffle(shard_count, &left_key);
        let right = right.shuffle(shard_count, &right_key);

        let shards = left
            .shards
            .into_par_iter()
            .zip(right.shards.into_par_iter())
            .map(|(left_shard, right_shard)| {
                let mut index: HashMap<K, Vec<usize>> = HashMap::with_capacity(right_shard.len());
                for (idx, record) in right_shard.iter().enumerate() {
                    if let Some(k) = right_key(record) {
                        index.entry(k).or_default().push(idx);
                    }
                }

                let mut out = Vec::with_capacity(left_shard.len());
                for record in left_shard {
                    let matches = left_key(&record).and_then(|k| index.get(&k));
                    match matches {
                        Some(positions) => {
                            let (last, rest) = match positions.split_last() {
                                Some(split) => split,
                                None => continue,
                            };
                            for &pos in rest {
                                out.push(combine(record.clone(), Some(&right_shard[pos])));
                            }
                            out.push(combine(record, Some(&right_shard[*last])));
                        }
                        None if kind == JoinKind::LeftOuter => out.push(combine(record, None)),
                        None => {}
                    }
                }
                out
            })
            .collect();

        Sharded { shards }
    }
}

impl<T: Send + Hash + Eq> Sharded<T> {
    /// Removes exact duplicates, keeping the first occurrence.
    pub fn distinct(self, shard_count: usize) -> Sharded<T> {
        self.shuffle(shard_count, |item| stable_hash(item))
            .map_shards(|_, shard| {
                let keep: Vec<bool> = {
                    let mut seen = HashSet::with_capacity(shard.len());
                    shard.iter().map(|item| seen.insert(item)).collect()
                };
                shard
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(item, keep)| keep.then_some(item))
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_spreads_records() {
        let sharded = Sharded::from_vec((0..10).collect(), 3);
        assert_eq!(sharded.shard_count(), 3);
        assert_eq!(sharded.len(), 10);
        assert_eq!(sharded.shards()[0], vec![0, 1, 2, 3]);
        assert_eq!(sharded.into_vec(), (0..10).collect::<Vec<_>>());

        let empty: Sharded<i32> = Sharded::from_vec(Vec::new(), 4);
        assert_eq!(empty.shard_count(), 4);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_map_filter_keep_order() {
        let out = Sharded::from_vec((1..=6).collect(), 2)
            .map(|x| x * 10)
            .filter(|x| *x != 30)
            .filter_map(|x| (x < 60).then_some(x + 1))
            .into_vec();
        assert_eq!(out, vec![11, 21, 41, 51]);
    }

    #[test]
    fn test_shuffle_groups_equal_keys() {
        let shuffled = Sharded::from_vec((0..100).collect::<Vec<i32>>(), 4).shuffle(5, |x| x % 7);
        assert_eq!(shuffled.shard_count(), 5);
        assert_eq!(shuffled.len(), 100);

        for key in 0..7 {
            let holders = shuffled
                .shards()
                .iter()
                .filter(|shard| shard.iter().any(|x| x % 7 == key))
                .count();
            assert_eq!(holders, 1, "key {} split across shards", key);
        }
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let run = || {
            Sharded::from_vec((0..50).map(|i| format!("k{}", i % 9)).collect::<Vec<_>>(), 3)
                .shuffle(4, |s| s.clone())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let out = Sharded::from_vec(vec!["b", "a", "b", "c", "a", "b"], 3).distinct(2);
        let mut values = out.into_vec();
        values.sort();
        assert_eq!(values, vec!["a", "b", "c"]);

        let single = Sharded::from_vec(vec![3, 1, 3, 2, 1], 1).distinct(1).into_vec();
        assert_eq!(single, vec![3, 1, 2]);
    }

    #[test]
    fn test_reduce_by_key_prefers_candidate() {
        let records = vec![("u1", 10), ("u2", 5), ("u1", 30), ("u1", 20), ("u2", 1)];
        let mut out = Sharded::from_vec(records, 2)
            .reduce_by_key(3, |r| r.0, |candidate, current| candidate.1 > current.1)
            .into_vec();
        out.sort();
        assert_eq!(out, vec![("u1", 30), ("u2", 5)]);
    }

    #[test]
    fn test_left_outer_join_keeps_unmatched() {
        let left = Sharded::from_vec(vec![(1, "a"), (2, "b"), (3, "c")], 2);
        let right = Sharded::from_vec(vec![(1, "x"), (3, "y"), (3, "z")], 2);

        let mut out = left
            .join(
                right,
                3,
                JoinKind::LeftOuter,
                |l| Some(l.0),
                |r| Some(r.0),
                |l, r| (l.1, r.map(|r| r.1)),
            )
            .into_vec();
        out.sort();
        assert_eq!(
            out,
            vec![("a", Some("x")), ("b", None), ("c", Some("y")), ("c", Some("z"))]
        );
    }

    #[test]
    fn test_inner_join_and_null_keys() {
        let left = Sharded::from_vec(vec![(Some(1), "a"), (None, "b"), (Some(2), "c")], 2);
        let right = Sharded::from_vec(vec![(Some(1), "x"), (None, "y")], 1);

        let inner = left
            .clone()
            .join(right.clone(), 2, JoinKind::Inner, |l| l.0, |r| r.0, |l, r| (l.1, r.map(|r| r.1)))
            .into_vec();
        assert_eq!(inner, vec![("a", Some("x"))]);

        let mut outer = left
            .join(right, 2, JoinKind::LeftOuter, |l| l.0, |r| r.0, |l, r| (l.1, r.map(|r| r.1)))
            .into_vec();
        outer.sort();
        assert_eq!(outer, vec![("a", Some("x")), ("b", None), ("c", None)]);
    }

    #[test]
    fn test_map_shards_sees_index() {
        let out = Sharded::from_vec(vec![0; 6], 3)
            .map_shards(|idx, shard| shard.into_iter().map(|_| idx).collect())
            .into_vec();
        assert_eq!(out, vec![0, 0, 1, 1, 2, 2]);
    }
}
