use super::sample_tree;
use crate::cache::{CacheStats, HandleCache};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_hit_within_ttl_and_miss_after() {
    let tree = sample_tree();
    let window = tree.find("AXWindow", None).unwrap();
    let mut cache = HandleCache::new(Duration::from_millis(2000), 16);

    cache.put("window", tree.handle(window));
    tokio::time::advance(Duration::from_millis(1500)).await;
    assert!(cache.get("window").is_some());

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(cache.get("window").is_none());
    assert!(!cache.contains_key("window"));
    assert_eq!(
        cache.stats(),
        CacheStats {
            hits: 1,
            misses: 1,
            evictions: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_dead_handle_is_evicted_on_lookup() {
    let tree = sample_tree();
    let plain = tree.find("AXButton", Some("Plain")).unwrap();
    let mut cache = HandleCache::new(Duration::from_secs(60), 16);
    cache.put("plain", tree.handle(plain));

    tree.remove(plain);
    assert!(cache.get("plain").is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_over_capacity_drops_oldest_half() {
    let tree = sample_tree();
    let handle = tree.handle(tree.root());
    let mut cache = HandleCache::new(Duration::from_secs(60), 4);

    for key in ["a", "b", "c", "d", "e"] {
        cache.put(key, handle.clone());
        tokio::time::advance(Duration::from_millis(1)).await;
    }

    // Five entries over a limit of four: the two oldest go.
    assert_eq!(cache.len(), 3);
    assert!(!cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
    for key in ["c", "d", "e"] {
        assert!(cache.contains_key(key), "{key} should survive");
    }
    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn test_invalidate_and_clear() {
    let tree = sample_tree();
    let mut cache = HandleCache::new(Duration::from_secs(60), 16);
    cache.put("one", tree.handle(tree.root()));
    cache.put("two", tree.handle(tree.root()));

    assert!(cache.invalidate("one"));
    assert!(!cache.invalidate("one"));
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 2);
    assert!(cache.get("two").is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_put_replaces_existing_key() {
    let tree = sample_tree();
    let close = tree.find("AXButton", Some("Close")).unwrap();
    let plain = tree.find("AXButton", Some("Plain")).unwrap();
    let mut cache = HandleCache::new(Duration::from_secs(60), 16);

    cache.put("button", tree.handle(close));
    cache.put("button", tree.handle(plain));
    assert_eq!(cache.len(), 1);
    let cached = cache.get("button").unwrap();
    assert_eq!(cached, tree.handle(plain));
}
