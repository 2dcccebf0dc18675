//! In-process pod backend.
//!
//! Authoritative within the process lifetime: a `put` is immediately
//! visible to `get` and `list`. Keys live in a single sorted map, so
//! listings are lexicographic for free.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use super::{Pod, PodError, PodResult};

#[derive(Debug)]
struct Entry {
    data: Bytes,
    modified: SystemTime,
}

#[derive(Debug, Default)]
pub struct MemoryPod {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryPod {
    pub fn new() -> Self {
        Self::default()
    }

    fn prefix_bounds(prefix: &str) -> (String, String) {
        if prefix.is_empty() {
            (String::new(), "\u{10FFFF}".to_string())
        } else {
            // '/' + 1 == '0': everything strictly under "prefix/".
            (format!("{prefix}/"), format!("{prefix}0"))
        }
    }
}

#[async_trait]
impl Pod for MemoryPod {
    fn uri(&self) -> String {
        "memory://".to_string()
    }

    async fn get(&self, key: &str) -> PodResult<Bytes> {
        tracing::debug!(pod = "memory", key, "READ");
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .map(|e| e.data.clone())
            .ok_or_else(|| PodError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> PodResult<()> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(key) {
            tracing::debug!(pod = "memory", key, "SKIP-WRITE");
            return Ok(());
        }
        tracing::debug!(pod = "memory", key, "WRITE");
        entries.insert(
            key.to_string(),
            Entry {
                data,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> PodResult<Vec<String>> {
        tracing::debug!(pod = "memory", prefix, "LIST");
        let (lo, hi) = Self::prefix_bounds(prefix);
        let entries = self.entries.read().unwrap();
        let mut names = BTreeSet::new();
        for key in entries.range(lo.clone()..hi).map(|(k, _)| k) {
            let rest = &key[lo.len()..];
            let name = rest.split('/').next().unwrap_or(rest);
            names.insert(name.to_string());
        }
        Ok(names.into_iter().collect())
    }

    async fn walk(&self, prefix: &str) -> PodResult<Vec<String>> {
        let (lo, hi) = Self::prefix_bounds(prefix);
        let entries = self.entries.read().unwrap();
        Ok(entries.range(lo..hi).map(|(k, _)| k.clone()).collect())
    }

    async fn delete(&self, key: &str) -> PodResult<()> {
        tracing::debug!(pod = "memory", key, "REMOVE");
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn modified(&self, key: &str) -> PodResult<Option<SystemTime>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).map(|e| e.modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_read_back_written_blob() {
        // given
        let pod = MemoryPod::new();

        // when
        pod.put("aa/bb/cc", Bytes::from("payload")).await.unwrap();

        // then
        assert_eq!(pod.get("aa/bb/cc").await.unwrap(), Bytes::from("payload"));
    }

    #[tokio::test]
    async fn should_return_not_found_for_missing_key() {
        let pod = MemoryPod::new();
        let err = pod.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn should_keep_first_content_on_rewrite() {
        // given
        let pod = MemoryPod::new();
        pod.put("key", Bytes::from("first")).await.unwrap();

        // when - digest-named keys never legitimately change content
        pod.put("key", Bytes::from("second")).await.unwrap();

        // then
        assert_eq!(pod.get("key").await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn should_list_immediate_children_sorted() {
        // given
        let pod = MemoryPod::new();
        pod.put("aa/zz/1", Bytes::from("x")).await.unwrap();
        pod.put("aa/bb/2", Bytes::from("x")).await.unwrap();
        pod.put("aa/bb/3", Bytes::from("x")).await.unwrap();
        pod.put("bb/cc/4", Bytes::from("x")).await.unwrap();

        // when
        let root = pod.list("").await.unwrap();
        let children = pod.list("aa").await.unwrap();

        // then
        assert_eq!(root, vec!["aa", "bb"]);
        assert_eq!(children, vec!["bb", "zz"]);
    }

    #[tokio::test]
    async fn should_list_empty_for_missing_prefix() {
        let pod = MemoryPod::new();
        assert!(pod.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_not_confuse_sibling_prefixes() {
        // given - "aa" and "aab" share a textual prefix
        let pod = MemoryPod::new();
        pod.put("aa/1", Bytes::from("x")).await.unwrap();
        pod.put("aab/2", Bytes::from("x")).await.unwrap();

        // when
        let children = pod.list("aa").await.unwrap();

        // then
        assert_eq!(children, vec!["1"]);
    }

    #[tokio::test]
    async fn should_walk_all_keys_under_prefix() {
        // given
        let pod = MemoryPod::new();
        pod.put("aa/bb/1", Bytes::from("x")).await.unwrap();
        pod.put("aa/bb/cc/2", Bytes::from("x")).await.unwrap();
        pod.put("zz/3", Bytes::from("x")).await.unwrap();

        // when
        let keys = pod.walk("aa").await.unwrap();

        // then
        assert_eq!(keys, vec!["aa/bb/1", "aa/bb/cc/2"]);
    }

    #[tokio::test]
    async fn should_delete_and_tolerate_missing_keys() {
        // given
        let pod = MemoryPod::new();
        pod.put("key", Bytes::from("x")).await.unwrap();

        // when
        pod.delete("key").await.unwrap();
        pod.delete("key").await.unwrap();

        // then
        assert!(pod.get("key").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn should_report_modified_time() {
        let pod = MemoryPod::new();
        pod.put("key", Bytes::from("x")).await.unwrap();
        assert!(pod.modified("key").await.unwrap().is_some());
        assert!(pod.modified("absent").await.unwrap().is_none());
    }
}
