//! Reconstructing the group/entry tree from a flat, level-tagged sequence,
//! and flattening it back for serialization.
//!
//! The tree is not an owning structure of boxed nodes: groups and entries
//! live in arenas keyed by their stable ids (the on-disk group id, and the
//! entry UUID), with parent/child links expressed as those ids rather than
//! pointers. This sidesteps reference cycles and makes wiping every secret
//! on drop a matter of draining two maps instead of walking a graph.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::entry::{is_meta_stream, Entry};
use crate::error::DatabaseOpenError;
use crate::group::Group;
use crate::warnings::Warning;

/// A group plus the arena links connecting it to its parent and children.
pub(crate) struct GroupNode {
    pub(crate) group: Group,
    /// `None` means the synthetic root.
    pub(crate) parent: Option<i32>,
    pub(crate) child_groups: Vec<i32>,
    pub(crate) child_entries: Vec<Uuid>,
}

/// An entry plus the id of its owning group.
pub(crate) struct EntryNode {
    pub(crate) entry: Entry,
    pub(crate) parent: i32,
}

/// The assembled tree: an arena of groups, an arena of entries, and the
/// meta-stream entries that were pulled out of the visible tree entirely.
#[derive(Default)]
pub(crate) struct Tree {
    pub(crate) root_children: Vec<i32>,
    pub(crate) groups: HashMap<i32, GroupNode>,
    pub(crate) entries: HashMap<Uuid, EntryNode>,
    pub(crate) meta_streams: Vec<Entry>,
    /// The id of the group most recently seen with the backup flag set
    /// during assembly: "last wins" when multiple groups claim the role.
    pub(crate) backup_group_id: Option<i32>,
}

impl Tree {
    /// An empty tree: just the synthetic root.
    pub(crate) fn empty() -> Self {
        Self::default()
    }
}

/// Reassign a fresh id for a group whose declared id collided with one
/// already in the arena: the successor of the largest id seen so far,
/// linear-probed upward (with wrapping add) past any id already taken.
pub(crate) fn next_free_id(used: &HashSet<i32>) -> i32 {
    let max = used.iter().copied().max().unwrap_or(0);
    let mut candidate = max.wrapping_add(1);
    while used.contains(&candidate) {
        candidate = candidate.wrapping_add(1);
    }
    candidate
}

/// Whether a group's name matches the locale-sensitive "Backup"/"Recycle Bin"
/// naming convention some KDB writers use instead of (or alongside) the
/// `isDeleted` flag to mark the backup group.
fn is_backup_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("Backup") || name.eq_ignore_ascii_case("Recycle Bin")
}

/// Rebuild the tree from the flat `(group, level)` sequence groups were
/// serialized in, plus the flat entry sequence, per the pre-order
/// reconstruction algorithm: each group attaches to the most recently seen
/// group one level shallower than it (or the synthetic root at level 0).
pub(crate) fn assemble(
    groups_with_levels: Vec<(Group, u16)>,
    entries: Vec<Entry>,
) -> Result<(Tree, Vec<Warning>), DatabaseOpenError> {
    let mut tree = Tree::empty();
    let mut warnings = Vec::new();
    let mut used_ids: HashSet<i32> = HashSet::new();
    // stack[i] = id of the still-open ancestor at level i
    let mut stack: Vec<i32> = Vec::new();

    for (mut group, level) in groups_with_levels {
        // a group claiming to be deeper than any currently open ancestor
        // permits is attached at the deepest open level instead of failing
        // the whole load over a single malformed depth.
        let level = (level as usize).min(stack.len());
        stack.truncate(level);

        if used_ids.contains(&group.id) {
            let reassigned = next_free_id(&used_ids);
            warnings.push(Warning::DuplicateGroupId { original: group.id, reassigned });
            group.id = reassigned;
        }
        used_ids.insert(group.id);

        let parent = stack.last().copied();
        match parent {
            Some(parent_id) => {
                #[allow(clippy::unwrap_used)]
                tree.groups.get_mut(&parent_id).unwrap().child_groups.push(group.id);
            }
            None => tree.root_children.push(group.id),
        }

        if group.is_backup() || is_backup_name(&group.name) {
            tree.backup_group_id = Some(group.id);
        }

        let id = group.id;
        tree.groups.insert(
            id,
            GroupNode { group, parent, child_groups: Vec::new(), child_entries: Vec::new() },
        );
        stack.push(id);
    }

    for entry in entries {
        if is_meta_stream(&entry) {
            tree.meta_streams.push(entry);
            continue;
        }

        let group_id = entry.group_id as i32;
        let node = tree
            .groups
            .get_mut(&group_id)
            .ok_or(DatabaseOpenError::OrphanedEntry { group_id: entry.group_id })?;
        node.child_entries.push(entry.uuid);
        tree.entries.insert(entry.uuid, EntryNode { entry, parent: group_id });
    }

    Ok((tree, warnings))
}

/// Flatten the tree back into the `(group, level)` and entry sequences the
/// field codec serializes: a pre-order walk of the groups, each followed by
/// its own entries, with the meta-stream entries appended last.
pub(crate) fn flatten(tree: &Tree) -> (Vec<(Group, u16)>, Vec<Entry>) {
    let mut groups_out = Vec::new();
    let mut entries_out = Vec::new();

    for &root_child in &tree.root_children {
        walk(tree, root_child, 0, &mut groups_out, &mut entries_out);
    }

    entries_out.extend(tree.meta_streams.iter().cloned());
    (groups_out, entries_out)
}

fn walk(tree: &Tree, id: i32, level: u16, groups_out: &mut Vec<(Group, u16)>, entries_out: &mut Vec<Entry>) {
    #[allow(clippy::unwrap_used)]
    let node = tree.groups.get(&id).unwrap();
    groups_out.push((node.group.clone(), level));

    for &entry_id in &node.child_entries {
        #[allow(clippy::unwrap_used)]
        entries_out.push(tree.entries.get(&entry_id).unwrap().entry.clone());
    }

    for &child_id in &node.child_groups {
        walk(tree, child_id, level + 1, groups_out, entries_out);
    }
}
