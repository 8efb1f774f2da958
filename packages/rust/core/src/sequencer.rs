//! Durable sequence assignment.
//!
//! Every admitted candidate becomes an [`Item`] here. The in-process mutex
//! orders callers within one run; the `BEGIN IMMEDIATE` transaction orders
//! runs in separate processes. Nothing in this module touches the network.
//!
//! Slots are created before the transaction commits. A crash in between
//! leaves a slot with no registry row; later assignments skip its id, so
//! the sequence has a gap instead of a reused id.

use std::sync::LazyLock;

use errorpress_shared::{Candidate, Item, PressError, Result, slot_name};
use errorpress_storage::{NewItemRow, SequenceTx, Storage};
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::lifecycle;
use crate::slots::SlotStore;

/// Longest slug derived from error text.
const MAX_SLUG_LEN: usize = 50;

/// How an item enters the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Through discovery, dedup and selection. Starts in Discovered.
    Selected,
    /// Injected by hand. Skips the fingerprint check and starts in Collecting.
    Injected,
}

pub struct Sequencer<'a> {
    storage: &'a Storage,
    slots: SlotStore,
    lock: Mutex<()>,
}

impl<'a> Sequencer<'a> {
    pub fn new(storage: &'a Storage, slots: SlotStore) -> Self {
        Self {
            storage,
            slots,
            lock: Mutex::new(()),
        }
    }

    /// Assign the next sequence id, create the slot and register the item.
    ///
    /// Returns `None` when a selected candidate's fingerprint was indexed
    /// after this run loaded the dedup index.
    #[instrument(skip_all, fields(fingerprint = %candidate.fingerprint))]
    pub async fn assign(&self, candidate: Candidate, admission: Admission) -> Result<Option<Item>> {
        let _guard = self.lock.lock().await;
        let tx = self.storage.begin_sequence_tx().await?;

        match self.assign_in(&tx, candidate, admission).await {
            Ok(Some(item)) => {
                if let Err(e) = tx.commit().await {
                    self.slots.discard(item.sequence_id, &item.slug);
                    return Err(e);
                }
                info!(
                    sequence_id = item.sequence_id,
                    slug = %item.slug,
                    state = %item.state,
                    "item sequenced"
                );
                Ok(Some(item))
            }
            Ok(None) => {
                tx.rollback().await?;
                Ok(None)
            }
            Err(e) => {
                // dropping the connection rolls back if this fails too
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn assign_in(
        &self,
        tx: &SequenceTx,
        candidate: Candidate,
        admission: Admission,
    ) -> Result<Option<Item>> {
        let marker = tx.marker().await?;
        let registered = tx.max_item_sequence().await?;
        if registered > marker {
            return Err(PressError::DuplicateSequenceAssignment {
                sequence_id: registered,
                detail: format!("item registry reaches {registered} but the marker is {marker}"),
            });
        }

        if admission == Admission::Selected && tx.fingerprint_indexed(&candidate.fingerprint).await? {
            info!("fingerprint indexed by another run, skipping");
            return Ok(None);
        }

        // Ids above the marker have no registry row, so a slot carrying one
        // was left by an assignment that never committed. Leave it and skip
        // the id.
        let mut sequence_id = marker + 1;
        loop {
            let leftover = self.slots.slots_for(sequence_id)?;
            if leftover.is_empty() {
                break;
            }
            warn!(sequence_id, slots = ?leftover, "uncommitted slot found, skipping sequence id");
            sequence_id += 1;
        }

        let slug = unique_slug(tx, &derive_slug(&candidate.raw_text)).await?;

        let mut item = Item::new(sequence_id, slug, candidate);
        if admission == Admission::Injected {
            lifecycle::start_collection(&mut item)?;
        }

        self.slots.create(sequence_id, &item.slug)?;
        if let Err(e) = self.register(tx, &item).await {
            self.slots.discard(sequence_id, &item.slug);
            return Err(e);
        }
        Ok(Some(item))
    }

    async fn register(&self, tx: &SequenceTx, item: &Item) -> Result<()> {
        self.slots.save(item)?;

        let slot_dir = slot_name(item.sequence_id, &item.slug);
        tx.insert_item(&NewItemRow {
            sequence_id: item.sequence_id,
            slug: &item.slug,
            fingerprint: &item.candidate.fingerprint,
            source: item.candidate.source.as_str(),
            state: item.state,
            slot_dir: &slot_dir,
        })
        .await?;
        tx.index_fingerprint(&item.candidate.fingerprint, item.sequence_id)
            .await?;
        tx.set_marker(item.sequence_id).await
    }
}

/// Lowercase ASCII words joined by dashes, at most [`MAX_SLUG_LEN`] chars.
/// Text with no ASCII letters or digits becomes `error`.
pub fn derive_slug(text: &str) -> String {
    static NON_SLUG: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lower = text.to_ascii_lowercase();
    let dashed = NON_SLUG.replace_all(&lower, "-");
    let mut slug: String = dashed.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("error");
    }
    slug
}

async fn unique_slug(tx: &SequenceTx, base: &str) -> Result<String> {
    let mut slug = base.to_string();
    let mut suffix = 2;
    while tx.slug_exists(&slug).await? {
        slug = format!("{base}-{suffix}");
        suffix += 1;
    }
    Ok(slug)
}
