//! Registry plumbing shared by collections and repos.
//!
//! A registry is just a series with the fixed schema
//! `{label*, digest, meta}`: each row maps a unicode label to a stable
//! identity digest plus an opaque meta payload (the schema dump for
//! collections, empty for series). Creates, deletes and renames are
//! ordinary commits over label ranges; last-write-wins resolution does
//! the rest.

use std::collections::HashSet;

use common::Digest;

use crate::error::{Error, Result};
use crate::frame::{Array, Frame};
use crate::schema::{IndexKey, Schema, Value};
use crate::series::{ReadOptions, Series};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub label: String,
    pub digest: Digest,
    pub meta: Vec<u8>,
}

pub(crate) fn validate_label(label: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(Error::InvalidLabel("empty label".into()));
    }
    Ok(label.to_string())
}

fn label_key(label: &str) -> IndexKey {
    vec![Value::Str(label.to_string())]
}

fn to_frame(mut entries: Vec<Entry>) -> Result<Frame> {
    entries.sort_by(|a, b| a.label.cmp(&b.label));
    let labels = entries.iter().map(|e| e.label.clone()).collect();
    let digests = entries.iter().map(|e| e.digest.as_bytes().to_vec()).collect();
    let metas = entries.into_iter().map(|e| e.meta).collect();
    Frame::new(
        Schema::registry(),
        vec![Array::Str(labels), Array::Bytes(digests), Array::Bytes(metas)],
    )
}

fn from_frame(frame: &Frame) -> Result<Vec<Entry>> {
    let (labels, digests, metas) = match (frame.array(0), frame.array(1), frame.array(2)) {
        (Array::Str(labels), Array::Bytes(digests), Array::Bytes(metas)) => {
            (labels, digests, metas)
        }
        _ => return Err(Error::corrupt("malformed registry frame")),
    };
    labels
        .iter()
        .zip(digests)
        .zip(metas)
        .map(|((label, digest), meta)| {
            let digest = Digest::from_slice(digest)
                .ok_or_else(|| Error::corrupt(format!("bad identity digest for {label}")))?;
            Ok(Entry {
                label: label.clone(),
                digest,
                meta: meta.clone(),
            })
        })
        .collect()
}

/// All registered entries, in label order.
pub(crate) async fn entries(registry: &Series) -> Result<Vec<Entry>> {
    let frame = registry.read(ReadOptions::default()).await?;
    from_frame(&frame)
}

/// The entry for one label, if registered.
pub(crate) async fn get(registry: &Series, label: &str) -> Result<Option<Entry>> {
    let frame = registry
        .read(ReadOptions::between(label_key(label), label_key(label)))
        .await?;
    Ok(from_frame(&frame)?.pop())
}

/// Registers or overwrites one label.
pub(crate) async fn insert(
    registry: &Series,
    label: &str,
    digest: Digest,
    meta: Vec<u8>,
) -> Result<()> {
    let frame = to_frame(vec![Entry {
        label: label.to_string(),
        digest,
        meta,
    }])?;
    registry.write(frame).await?;
    Ok(())
}

/// Unregisters one label by overwriting its range with zero rows.
pub(crate) async fn remove(registry: &Series, label: &str) -> Result<()> {
    if get(registry, label).await?.is_none() {
        return Ok(());
    }
    registry
        .write_at(
            Frame::empty(Schema::registry()),
            label_key(label),
            label_key(label),
        )
        .await?;
    Ok(())
}

/// Renames a label in place: the whole registry view is rewritten in one
/// commit covering both the old and the new range.
pub(crate) async fn rename(registry: &Series, from: &str, to: &str) -> Result<()> {
    let mut all = entries(registry).await?;
    if !all.iter().any(|e| e.label == from) {
        return Err(Error::LabelNotFound(from.to_string()));
    }
    if all.iter().any(|e| e.label == to) {
        return Err(Error::LabelExists(to.to_string()));
    }
    let labels: HashSet<String> = all
        .iter()
        .map(|e| e.label.clone())
        .chain([from.to_string(), to.to_string()])
        .collect();
    let start = label_key(labels.iter().min().map(String::as_str).unwrap_or(from));
    let stop = label_key(labels.iter().max().map(String::as_str).unwrap_or(to));
    for entry in &mut all {
        if entry.label == from {
            entry.label = to.to_string();
        }
    }
    registry.write_at(to_frame(all)?, start, stop).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::pod::MemoryPod;
    use std::sync::Arc;

    fn registry() -> Series {
        Series::new(
            "registry",
            Schema::registry(),
            Arc::new(MemoryPod::new()),
            Digest::ZERO.pod_path(),
        )
    }

    #[tokio::test]
    async fn should_register_and_look_up_labels() {
        // given
        let reg = registry();
        let identity = Digest::random();

        // when
        insert(&reg, "temperature", identity, b"meta".to_vec())
            .await
            .unwrap();

        // then
        let entry = get(&reg, "temperature").await.unwrap().unwrap();
        assert_eq!(entry.digest, identity);
        assert_eq!(entry.meta, b"meta");
        assert!(get(&reg, "pressure").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_list_entries_in_label_order() {
        // given
        let reg = registry();
        insert(&reg, "zulu", Digest::random(), vec![]).await.unwrap();
        insert(&reg, "alpha", Digest::random(), vec![]).await.unwrap();

        // when
        let all = entries(&reg).await.unwrap();

        // then
        let labels: Vec<_> = all.iter().map(|e| e.label.clone()).collect();
        assert_eq!(labels, vec!["alpha", "zulu"]);
    }

    #[tokio::test]
    async fn should_remove_labels() {
        // given
        let reg = registry();
        insert(&reg, "a", Digest::random(), vec![]).await.unwrap();
        insert(&reg, "b", Digest::random(), vec![]).await.unwrap();

        // when
        remove(&reg, "a").await.unwrap();

        // then
        assert!(get(&reg, "a").await.unwrap().is_none());
        assert!(get(&reg, "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_remove_last_label() {
        // given - removing the only entry leaves an empty registry
        let reg = registry();
        insert(&reg, "only", Digest::random(), vec![]).await.unwrap();

        // when
        remove(&reg, "only").await.unwrap();

        // then
        assert!(entries(&reg).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_ignore_removal_of_unknown_label() {
        let reg = registry();
        remove(&reg, "ghost").await.unwrap();
        assert!(entries(&reg).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_rename_label_and_keep_identity() {
        // given
        let reg = registry();
        let identity = Digest::random();
        insert(&reg, "old", identity, b"m".to_vec()).await.unwrap();

        // when
        rename(&reg, "old", "new").await.unwrap();

        // then
        assert!(get(&reg, "old").await.unwrap().is_none());
        let entry = get(&reg, "new").await.unwrap().unwrap();
        assert_eq!(entry.digest, identity);
        assert_eq!(entry.meta, b"m");
    }

    #[tokio::test]
    async fn should_reject_rename_of_missing_or_colliding_labels() {
        // given
        let reg = registry();
        insert(&reg, "a", Digest::random(), vec![]).await.unwrap();
        insert(&reg, "b", Digest::random(), vec![]).await.unwrap();

        // then
        assert!(matches!(
            rename(&reg, "ghost", "c").await,
            Err(Error::LabelNotFound(_))
        ));
        assert!(matches!(
            rename(&reg, "a", "b").await,
            Err(Error::LabelExists(_))
        ));
    }

    #[test]
    fn should_validate_labels() {
        assert!(validate_label("  ").is_err());
        assert_eq!(validate_label(" ok ").unwrap(), "ok");
    }
}
