use bramble_collections::{OrderedMap, SplayTree};
use std::collections::BTreeMap;

struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        ((x.wrapping_mul(0x2545F4914F6CDD1D)) >> 32) as u32
    }

    fn gen_range(&mut self, max_exclusive: u32) -> u32 {
        if max_exclusive == 0 {
            return 0;
        }
        self.next_u32() % max_exclusive
    }
}

#[test]
fn splay_tree_matches_btreemap_model() {
    let mut tree: SplayTree<u32, u32> = SplayTree::new();
    let mut model: BTreeMap<u32, u32> = BTreeMap::new();

    // small key space to force collisions, removals of present keys and
    // lookups of absent ones
    let mut rng = Rng::new(0xB01D_FACE_CAFE_F00D);
    for i in 0..50_000 {
        let key = rng.gen_range(256);
        match rng.gen_range(4) {
            0 => {
                let inserted = tree.insert(key, i).is_ok();
                let model_inserted = !model.contains_key(&key);
                assert_eq!(inserted, model_inserted, "insert({key})");
                model.entry(key).or_insert(i);
            }
            1 => {
                assert_eq!(tree.remove(&key), model.remove(&key), "remove({key})");
            }
            2 => {
                assert_eq!(tree.get(&key), model.get(&key), "get({key})");
            }
            _ => {
                assert_eq!(tree.peek(&key), model.get(&key), "peek({key})");
            }
        }
        assert_eq!(tree.len(), model.len());
    }

    let tree_entries: Vec<_> = tree.iter().map(|(k, v)| (*k, *v)).collect();
    let model_entries: Vec<_> = model.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(tree_entries, model_entries);
}

#[test]
fn splay_min_is_smallest_live_key() {
    let mut tree = SplayTree::new();
    let mut rng = Rng::new(42);
    for _ in 0..1_000 {
        let _ = tree.insert(rng.gen_range(1000), ());
    }
    let smallest = *tree.keys().next().unwrap();
    assert_eq!(tree.min().map(|(k, _)| *k), Some(smallest));
}

#[test]
fn ordered_map_matches_btreemap_model() {
    let mut map: OrderedMap<u32, u32> = OrderedMap::new();
    let mut model: BTreeMap<u32, u32> = BTreeMap::new();

    let mut rng = Rng::new(0x1234_5678_9ABC_DEF0);
    for i in 0..20_000 {
        let key = rng.gen_range(128);
        match rng.gen_range(3) {
            0 => {
                let inserted = map.insert(key, i).is_ok();
                assert_eq!(inserted, !model.contains_key(&key));
                model.entry(key).or_insert(i);
            }
            1 => {
                assert_eq!(map.remove(&key), model.remove(&key));
            }
            _ => {
                assert_eq!(map.get(&key), model.get(&key));
            }
        }
    }

    let map_keys: Vec<_> = map.keys().copied().collect();
    let model_keys: Vec<_> = model.keys().copied().collect();
    assert_eq!(map_keys, model_keys);
}
