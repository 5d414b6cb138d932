//! Item records persisted as a single JSON document.
//!
//! Every mutation is staged on a copy of the record map, written to a
//! temporary file and renamed over the old one; only then does the copy
//! replace the in-memory map. A failed write leaves both untouched.
//!
//! Sibling orders are kept dense: deletes renumber what is left and opening
//! a store closes any gaps found on disk, so stored orders always match the
//! tree built by [`RecordStore::to_tree`].

use crate::error::TreeError;
use crate::persistence::PersistencePort;
use crate::planner::ChangeSet;
use crate::tree::{Node, NodeId, NodeKind, Tree};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Folders offered by [`RecordStore::lookup_parents`] at most.
pub const PARENT_LOOKUP_LIMIT: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub order: u32,
    pub parent_id: Option<NodeId>,
    pub content: Option<String>,
    pub tags: Option<String>,
    pub resource_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemRecord {
    pub fn to_node(&self) -> Node {
        Node::new(
            self.id.clone(),
            self.parent_id.clone(),
            self.order,
            self.kind,
            self.name.clone(),
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Name of the folder to create in; blank, `#` or unknown means root.
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub resource_link: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent_name: None,
            content: None,
            resource_link: None,
            tags: None,
        }
    }

    pub fn in_folder(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    pub name: String,
    #[serde(default)]
    pub resource_link: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentSuggestion {
    pub id: NodeId,
    pub label: String,
}

pub struct RecordStore {
    items: HashMap<NodeId, ItemRecord>,
    path: PathBuf,
}

impl RecordStore {
    /// Open the store at `path`, creating parent directories. A missing
    /// file is an empty store. Gaps in stored orders are closed in memory
    /// and written back with the next change.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut items = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let records: Vec<ItemRecord> = serde_json::from_str(&data)?;
            records.into_iter().map(|r| (r.id.clone(), r)).collect()
        } else {
            HashMap::new()
        };
        normalize(&mut items);
        debug!(path = %path.display(), "record store opened");
        Ok(Self { items, path })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ItemRecord> {
        self.items.get(id)
    }

    /// All records, ascending by `order`.
    pub fn list(&self) -> Vec<&ItemRecord> {
        let mut records: Vec<&ItemRecord> = self.items.values().collect();
        records.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    pub fn find_folder_by_name(&self, name: &str) -> Option<&ItemRecord> {
        self.list()
            .into_iter()
            .find(|r| r.kind.is_container() && r.name == name)
    }

    /// Folders whose name contains `query`; every folder for an empty query.
    pub fn lookup_parents(&self, query: &str, limit: usize) -> Vec<ParentSuggestion> {
        self.list()
            .into_iter()
            .filter(|r| r.kind.is_container() && r.name.contains(query))
            .take(limit)
            .map(|r| ParentSuggestion {
                id: r.id.clone(),
                label: r.name.clone(),
            })
            .collect()
    }

    /// Create a record as the last child of its resolved parent.
    pub fn create(&mut self, item: NewItem) -> Result<ItemRecord> {
        let name = item.name.trim().to_string();
        if name.is_empty() {
            bail!("name is required");
        }
        let parent_id = match item.parent_name.as_deref().map(str::trim) {
            Some(parent) if !parent.is_empty() && parent != "#" => {
                self.find_folder_by_name(parent).map(|f| f.id.clone())
            }
            _ => None,
        };
        let order = self
            .items
            .values()
            .filter(|r| r.parent_id == parent_id)
            .map(|r| r.order)
            .max()
            .map_or(1, |last| last + 1);

        let now = Utc::now();
        let record = ItemRecord {
            id: NodeId::generate(),
            name,
            kind: item.kind,
            order,
            parent_id,
            content: if item.kind.is_container() {
                None
            } else {
                item.content
            },
            tags: item.tags,
            resource_link: item.resource_link,
            created_at: now,
            updated_at: now,
        };
        let staged = record.clone();
        self.commit(move |items| {
            items.insert(staged.id.clone(), staged);
            Ok(())
        })?;
        info!(id = %record.id, kind = record.kind.as_str(), order, "item created");
        Ok(record)
    }

    pub fn update(&mut self, id: &NodeId, update: ItemUpdate) -> Result<ItemRecord> {
        let name = update.name.trim().to_string();
        if name.is_empty() {
            bail!("name is required");
        }
        let mut updated = None;
        self.commit(|items| {
            let record = items
                .get_mut(id)
                .ok_or_else(|| anyhow!("item {id} not found"))?;
            record.name = name;
            record.resource_link = update.resource_link;
            if !record.kind.is_container() {
                record.content = update.content;
            }
            record.tags = update.tags;
            record.updated_at = Utc::now();
            updated = Some(record.clone());
            Ok(())
        })?;
        debug!(%id, "item updated");
        updated.ok_or_else(|| anyhow!("item {id} not found"))
    }

    /// Delete a record; deleting a folder deletes everything inside it.
    /// Returns every removed id. The remaining siblings are renumbered.
    pub fn delete(&mut self, id: &NodeId) -> Result<Vec<NodeId>> {
        let parent = match self.items.get(id) {
            Some(record) => record.parent_id.clone(),
            None => bail!("item {id} not found"),
        };
        let mut removed = vec![id.clone()];
        let mut cursor = 0;
        while cursor < removed.len() {
            let folder = removed[cursor].clone();
            removed.extend(
                self.items
                    .values()
                    .filter(|r| r.parent_id.as_ref() == Some(&folder))
                    .map(|r| r.id.clone()),
            );
            cursor += 1;
        }
        let doomed = removed.clone();
        self.commit(move |items| {
            for id in &doomed {
                items.remove(id);
            }
            renumber(items, &parent);
            Ok(())
        })?;
        info!(%id, removed = removed.len(), "item deleted");
        Ok(removed)
    }

    /// Apply a move change-set. Every entry is checked first; the batch is
    /// written in full or not at all.
    pub fn apply_moves(&mut self, changes: &ChangeSet) -> Result<()> {
        self.commit(|items| stage_moves(items, changes))?;
        debug!(entries = changes.len(), "moves applied");
        Ok(())
    }

    /// Build the ordered tree the engine works on.
    pub fn to_tree(&self) -> Result<Tree, TreeError> {
        Tree::from_nodes(self.list().into_iter().map(ItemRecord::to_node))
    }

    fn commit<F>(&mut self, stage: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<NodeId, ItemRecord>) -> Result<()>,
    {
        let mut staged = self.items.clone();
        stage(&mut staged)?;
        Self::write(&self.path, &staged)?;
        self.items = staged;
        Ok(())
    }

    fn write(path: &Path, items: &HashMap<NodeId, ItemRecord>) -> Result<()> {
        let mut records: Vec<&ItemRecord> = items.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let data = serde_json::to_vec_pretty(&records)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn stage_moves(items: &mut HashMap<NodeId, ItemRecord>, changes: &ChangeSet) -> Result<()> {
    let now = Utc::now();
    for entry in changes {
        let parent: Option<NodeId> = entry.parent_id.clone().into();
        if let Some(parent) = &parent {
            match items.get(parent) {
                None => bail!("parent {parent} not found"),
                Some(p) if !p.kind.is_container() => bail!("parent {parent} is not a folder"),
                Some(_) => {}
            }
        }
        let record = items
            .get_mut(&entry.id)
            .ok_or_else(|| anyhow!("item {} not found", entry.id))?;
        record.parent_id = parent;
        record.order = entry.order;
        record.updated_at = now;
    }
    Ok(())
}

/// Number the children of `parent` `1..N`, keeping their relative order.
fn renumber(items: &mut HashMap<NodeId, ItemRecord>, parent: &Option<NodeId>) {
    let mut siblings: Vec<(u32, DateTime<Utc>, NodeId)> = items
        .values()
        .filter(|r| &r.parent_id == parent)
        .map(|r| (r.order, r.created_at, r.id.clone()))
        .collect();
    siblings.sort();
    for (position, (_, _, id)) in siblings.into_iter().enumerate() {
        if let Some(record) = items.get_mut(&id) {
            record.order = position as u32 + 1;
        }
    }
}

fn normalize(items: &mut HashMap<NodeId, ItemRecord>) {
    let parents: HashSet<Option<NodeId>> = items.values().map(|r| r.parent_id.clone()).collect();
    for parent in &parents {
        renumber(items, parent);
    }
}

/// Moves arrive from the controller's background task, so the file write
/// runs on the blocking pool.
#[async_trait]
impl PersistencePort for RwLock<RecordStore> {
    async fn submit_moves(&self, changes: &ChangeSet) -> Result<()> {
        let mut store = self.write().await;
        let mut staged = store.items.clone();
        stage_moves(&mut staged, changes)?;
        let path = store.path.clone();
        let staged = tokio::task::spawn_blocking(move || {
            RecordStore::write(&path, &staged).map(|()| staged)
        })
        .await??;
        store.items = staged;
        debug!(entries = changes.len(), "moves submitted");
        Ok(())
    }
}
