//! The top-level `Database` facade: the load/save pipeline and the query and
//! mutation surface exposed to callers.

use std::collections::HashSet;

use uuid::Uuid;

use crate::bytes::{ByteReader, ByteWriter};
use crate::config::DatabaseConfig;
use crate::crypt::ciphers::{Aes256Cipher, TwofishCipher};
use crate::crypt::{calculate_sha256, kdf};
use crate::entry::Entry;
use crate::error::{DatabaseKeyError, DatabaseOpenError, DatabaseSaveError, MasterKeyError};
use crate::fields;
use crate::group::{Group, FLAG_BACKUP};
use crate::header::{Header, OuterCipher};
use crate::progress::{weight, Progress};
use crate::secure_bytes::SecureBytes;
use crate::tree::{self, Tree};
use crate::warnings::Warning;

/// A decrypted KDB v1 database: header, tree, and the key material needed to
/// save it again.
pub struct Database {
    header: Header,
    tree: Tree,
    composite_key: SecureBytes,
    master_key: SecureBytes,
}

fn derive_master_key(
    composite_key: &SecureBytes,
    header: &Header,
    progress: &Progress,
    progress_base: u8,
) -> Result<SecureBytes, MasterKeyError> {
    let composite: [u8; 32] = composite_key
        .as_slice()
        .try_into()
        .map_err(|_| DatabaseKeyError::InvalidLength { actual: composite_key.len() })?;
    let transformed = kdf::transform_key(
        &composite,
        &header.transform_seed,
        header.transform_rounds as u64,
        progress,
        progress_base,
        weight::KEY_DERIVATION,
    )?;
    progress.advance_stage(weight::KEY_DERIVATION);
    Ok(SecureBytes::from(calculate_sha256(&[&header.master_seed, &transformed]).to_vec()))
}

fn decrypt_payload(header: &Header, master_key: &SecureBytes, ciphertext: &[u8]) -> Result<Vec<u8>, DatabaseOpenError> {
    let payload = match header.cipher {
        OuterCipher::Aes256 => {
            Aes256Cipher::new(master_key.as_slice(), &header.encryption_iv)?.decrypt(ciphertext)?
        }
        OuterCipher::Twofish => {
            TwofishCipher::new(master_key.as_slice(), &header.encryption_iv)?.decrypt_lenient(ciphertext)?
        }
    };
    Ok(payload)
}

fn encrypt_payload(header: &Header, master_key: &SecureBytes, payload: &[u8]) -> Result<Vec<u8>, DatabaseSaveError> {
    let ciphertext = match header.cipher {
        OuterCipher::Aes256 => Aes256Cipher::new(master_key.as_slice(), &header.encryption_iv)?.encrypt(payload)?,
        OuterCipher::Twofish => TwofishCipher::new(master_key.as_slice(), &header.encryption_iv)?.encrypt(payload)?,
    };
    Ok(ciphertext)
}

fn parse_content(
    header: &Header,
    payload: &[u8],
    progress: &Progress,
) -> Result<(Vec<(Group, u16)>, Vec<Entry>), DatabaseOpenError> {
    let mut r = ByteReader::new(payload);
    let mut groups = Vec::with_capacity(header.num_groups as usize);
    for _ in 0..header.num_groups {
        progress.check_cancelled()?;
        let parsed = fields::parse_group(&mut r)?;
        groups.push((parsed.group, parsed.level));
    }

    let mut entries = Vec::with_capacity(header.num_entries as usize);
    for _ in 0..header.num_entries {
        progress.check_cancelled()?;
        entries.push(fields::parse_entry(&mut r)?);
    }

    Ok((groups, entries))
}

fn pack_content(
    groups: &[(Group, u16)],
    entries: &[Entry],
    progress: &Progress,
) -> Result<Vec<u8>, DatabaseSaveError> {
    let mut w = ByteWriter::new();
    for (group, level) in groups {
        progress.check_cancelled()?;
        fields::write_group(&mut w, group, *level);
    }
    for entry in entries {
        progress.check_cancelled()?;
        fields::write_entry(&mut w, entry);
    }
    Ok(w.into_bytes())
}

impl Database {
    /// Create a new, empty database with a fresh composite key, ready to
    /// have groups and entries added and then be saved.
    pub fn new(config: DatabaseConfig, composite_key: SecureBytes) -> Result<Database, DatabaseSaveError> {
        let mut header = Header {
            cipher: config.outer_cipher,
            master_seed: [0; 16],
            encryption_iv: [0; 16],
            num_groups: 0,
            num_entries: 0,
            content_hash: calculate_sha256(&[]),
            transform_seed: [0; 32],
            transform_rounds: config.transform_rounds,
        };
        header.randomize_seeds()?;

        let progress = Progress::new();
        let master_key = derive_master_key(&composite_key, &header, &progress, 0)?;

        Ok(Database { header, tree: Tree::empty(), composite_key, master_key })
    }

    /// Decrypt and parse a `.kdb` file, given its already-assembled composite key.
    pub fn load(
        data: &[u8],
        composite_key: SecureBytes,
        progress: &Progress,
    ) -> Result<(Database, Vec<Warning>), DatabaseOpenError> {
        let header = Header::read(data)?;
        let ciphertext = data.get(crate::header::HEADER_SIZE..).unwrap_or(&[]);

        let master_key = derive_master_key(&composite_key, &header, progress, 0)?;

        let payload = decrypt_payload(&header, &master_key, ciphertext)?;
        progress.advance_stage(weight::CIPHER);

        let hash = calculate_sha256(&[&payload]);
        if hash != header.content_hash {
            return Err(DatabaseOpenError::InvalidKey);
        }

        let (groups, entries) = parse_content(&header, &payload, progress)?;
        let (tree, warnings) = tree::assemble(groups, entries)?;
        progress.advance_stage(weight::CODEC);

        Ok((Database { header, tree, composite_key, master_key }, warnings))
    }

    /// Serialize, re-encrypt and return the database as `.kdb` file bytes.
    ///
    /// Always randomizes the header's seeds and IV and re-derives the master
    /// key, so every call produces a file indistinguishable from a
    /// freshly-created one even if nothing in the tree changed.
    pub fn save(&mut self, progress: &Progress) -> Result<Vec<u8>, DatabaseSaveError> {
        let (groups, entries) = tree::flatten(&self.tree);
        let payload = pack_content(&groups, &entries, progress)?;
        progress.advance_stage(weight::CODEC);

        self.header.content_hash = calculate_sha256(&[&payload]);
        self.header.num_groups = groups.len() as u32;
        self.header.num_entries = entries.len() as u32;
        self.header.randomize_seeds()?;

        self.master_key = derive_master_key(&self.composite_key, &self.header, progress, weight::CODEC)?;

        let ciphertext = encrypt_payload(&self.header, &self.master_key, &payload)?;
        progress.advance_stage(weight::CIPHER);

        let mut bytes = self.header.write();
        bytes.extend_from_slice(&ciphertext);
        Ok(bytes)
    }

    /// Replace the composite key used for future saves.
    pub fn change_composite_key(&mut self, new_key: SecureBytes) {
        self.composite_key = new_key;
    }

    /// The smallest id greater than every existing group id, wrapping past
    /// `i32::MAX` and linear-probing past any id already taken.
    pub fn create_group_id(&self) -> i32 {
        let used: HashSet<i32> = self.tree.groups.keys().copied().collect();
        tree::next_free_id(&used)
    }

    /// The designated backup (recycle bin) group, if one exists.
    pub fn get_backup_group(&self) -> Option<&Group> {
        self.tree.backup_group_id.and_then(|id| self.tree.groups.get(&id)).map(|n| &n.group)
    }

    /// Return the existing backup group, or create one as a new child of
    /// root if `create_if_missing` is set and none exists yet.
    pub fn backup_group(&mut self, create_if_missing: bool) -> Option<i32> {
        if let Some(id) = self.tree.backup_group_id {
            return Some(id);
        }
        if !create_if_missing {
            return None;
        }

        let id = self.create_group_id();
        let now = crate::bytes::never_expires();
        let group = Group {
            id,
            name: "Backup".to_owned(),
            icon_id: 0,
            created: now,
            last_modified: now,
            last_accessed: now,
            expires: now,
            usage_count: 0,
            flags: FLAG_BACKUP,
        };
        self.create_group(None, group);
        self.tree.backup_group_id = Some(id);
        Some(id)
    }

    /// Insert a new group as a child of `parent` (root if `None`), returning its id.
    pub fn create_group(&mut self, parent: Option<i32>, mut group: Group) -> i32 {
        if group.id == 0 || self.tree.groups.contains_key(&group.id) {
            group.id = self.create_group_id();
        }
        let id = group.id;

        match parent {
            Some(parent_id) => {
                if let Some(node) = self.tree.groups.get_mut(&parent_id) {
                    node.child_groups.push(id);
                }
            }
            None => self.tree.root_children.push(id),
        }

        self.tree.groups.insert(
            id,
            crate::tree::GroupNode { group, parent, child_groups: Vec::new(), child_entries: Vec::new() },
        );
        id
    }

    /// Insert a new entry under `parent`.
    pub fn create_entry(&mut self, parent: i32, entry: Entry) -> Result<(), DatabaseOpenError> {
        let node = self
            .tree
            .groups
            .get_mut(&parent)
            .ok_or(DatabaseOpenError::OrphanedEntry { group_id: parent as u32 })?;
        node.child_entries.push(entry.uuid);
        let uuid = entry.uuid;
        self.tree.entries.insert(uuid, crate::tree::EntryNode { entry, parent });
        Ok(())
    }

    /// Move an entry to a new parent group.
    pub fn move_entry(&mut self, entry_uuid: Uuid, new_parent: i32) -> Result<(), DatabaseOpenError> {
        if !self.tree.groups.contains_key(&new_parent) {
            return Err(DatabaseOpenError::OrphanedEntry { group_id: new_parent as u32 });
        }
        let old_parent = {
            #[allow(clippy::unwrap_used)]
            let node = self.tree.entries.get(&entry_uuid).unwrap();
            node.parent
        };
        if let Some(old_node) = self.tree.groups.get_mut(&old_parent) {
            old_node.child_entries.retain(|id| *id != entry_uuid);
        }
        #[allow(clippy::unwrap_used)]
        self.tree.groups.get_mut(&new_parent).unwrap().child_entries.push(entry_uuid);
        #[allow(clippy::unwrap_used)]
        {
            self.tree.entries.get_mut(&entry_uuid).unwrap().parent = new_parent;
        }
        Ok(())
    }

    /// Delete an entry: the first call moves it into the backup group and
    /// touches its last-accessed time; a second call (once already in
    /// backup) detaches it permanently.
    pub fn delete_entry(&mut self, entry_uuid: Uuid) -> Result<(), DatabaseOpenError> {
        let currently_in_backup = self.tree.backup_group_id == self.tree.entries.get(&entry_uuid).map(|n| n.parent);

        if currently_in_backup {
            let parent = self
                .tree
                .entries
                .get(&entry_uuid)
                .map(|n| n.parent)
                .ok_or(DatabaseOpenError::OrphanedEntry { group_id: 0 })?;
            if let Some(node) = self.tree.groups.get_mut(&parent) {
                node.child_entries.retain(|id| *id != entry_uuid);
            }
            self.tree.entries.remove(&entry_uuid);
            return Ok(());
        }

        let backup_id = self.backup_group(true).ok_or(DatabaseOpenError::OrphanedEntry { group_id: 0 })?;
        self.move_entry(entry_uuid, backup_id)?;
        if let Some(node) = self.tree.entries.get_mut(&entry_uuid) {
            node.entry.last_accessed = chrono::Local::now().naive_local();
        }
        Ok(())
    }

    /// Delete a group: detach it from its parent and relocate every
    /// descendant entry into the backup group.
    pub fn delete_group(&mut self, group_id: i32) -> Result<(), DatabaseOpenError> {
        let backup_id = self.backup_group(true).ok_or(DatabaseOpenError::OrphanedEntry { group_id: 0 })?;
        if group_id == backup_id {
            return Ok(());
        }

        let descendants = self.collect_descendant_entries(group_id);
        let now = chrono::Local::now().naive_local();
        for entry_uuid in descendants {
            self.move_entry(entry_uuid, backup_id)?;
            if let Some(node) = self.tree.entries.get_mut(&entry_uuid) {
                node.entry.last_accessed = now;
            }
        }

        let parent = self.tree.groups.get(&group_id).and_then(|n| n.parent);
        match parent {
            Some(parent_id) => {
                if let Some(node) = self.tree.groups.get_mut(&parent_id) {
                    node.child_groups.retain(|id| *id != group_id);
                }
            }
            None => self.tree.root_children.retain(|id| *id != group_id),
        }
        self.tree.groups.remove(&group_id);
        Ok(())
    }

    fn collect_descendant_entries(&self, group_id: i32) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut stack = vec![group_id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.tree.groups.get(&id) {
                out.extend(node.child_entries.iter().copied());
                stack.extend(node.child_groups.iter().copied());
            }
        }
        out
    }

    /// Wipe every secret (composite key, master key, entry passwords and
    /// attachments) and drop the tree.
    pub fn erase(&mut self) {
        self.composite_key = SecureBytes::from(Vec::new());
        self.master_key = SecureBytes::from(Vec::new());
        self.tree = Tree::empty();
    }

    /// The ids of the top-level groups (children of the synthetic root).
    pub fn root(&self) -> &[i32] {
        &self.tree.root_children
    }

    /// All non-synthetic groups, in no particular order.
    pub fn iter_all_groups(&self) -> impl Iterator<Item = &Group> {
        self.tree.groups.values().map(|n| &n.group)
    }

    /// All non-meta entries, in no particular order.
    pub fn iter_all_entries(&self) -> impl Iterator<Item = &Entry> {
        self.tree.entries.values().map(|n| &n.entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::key::CompositeKey;

    fn fresh_database(rounds: u32) -> Database {
        let header = Header {
            cipher: OuterCipher::Aes256,
            master_seed: [0; 16],
            encryption_iv: [0; 16],
            num_groups: 0,
            num_entries: 0,
            content_hash: [0; 32],
            transform_seed: [0; 32],
            transform_rounds: rounds,
        };
        let composite_key = CompositeKey::new().with_password("password").assemble().unwrap();
        let progress = Progress::new();
        let master_key = derive_master_key(&composite_key, &header, &progress, 0).unwrap();
        Database { header, tree: Tree::empty(), composite_key, master_key }
    }

    #[test]
    fn empty_database_round_trips() {
        let mut db = fresh_database(50);
        let progress = Progress::new();
        let bytes = db.save(&progress).unwrap();

        let composite_key = CompositeKey::new().with_password("password").assemble().unwrap();
        let (loaded, warnings) = Database::load(&bytes, composite_key, &progress).unwrap();
        assert!(warnings.is_empty());
        assert!(loaded.root().is_empty());
        assert_eq!(loaded.iter_all_groups().count(), 0);
        assert_eq!(loaded.iter_all_entries().count(), 0);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let mut db = fresh_database(50);
        let progress = Progress::new();
        let bytes = db.save(&progress).unwrap();

        let wrong_key = CompositeKey::new().with_password("not the password").assemble().unwrap();
        let result = Database::load(&bytes, wrong_key, &progress);
        assert!(matches!(result, Err(DatabaseOpenError::InvalidKey)));
    }

    #[test]
    fn truncated_file_never_panics() {
        let mut db = fresh_database(50);
        let progress = Progress::new();
        let mut bytes = db.save(&progress).unwrap();
        bytes.truncate(bytes.len() - 32);

        let composite_key = CompositeKey::new().with_password("password").assemble().unwrap();
        let result = Database::load(&bytes, composite_key, &progress);
        assert!(result.is_err());
    }

    #[test]
    fn groups_and_entries_round_trip() {
        let mut db = fresh_database(50);
        let general_id = db.create_group(
            None,
            Group {
                id: 0,
                name: "General".to_owned(),
                icon_id: 0,
                created: crate::bytes::never_expires(),
                last_modified: crate::bytes::never_expires(),
                last_accessed: crate::bytes::never_expires(),
                expires: crate::bytes::never_expires(),
                usage_count: 0,
                flags: 0,
            },
        );
        db.create_entry(
            general_id,
            Entry {
                uuid: Uuid::new_v4(),
                group_id: general_id as u32,
                icon_id: 0,
                title: "Sample".to_owned(),
                url: String::new(),
                username: String::new(),
                password: crate::entry::secret_string("pa$$word"),
                notes: String::new(),
                created: crate::bytes::never_expires(),
                last_modified: crate::bytes::never_expires(),
                last_accessed: crate::bytes::never_expires(),
                expires: crate::bytes::never_expires(),
                attachment: None,
            },
        )
        .unwrap();

        let progress = Progress::new();
        let bytes = db.save(&progress).unwrap();

        let composite_key = CompositeKey::new().with_password("password").assemble().unwrap();
        let (loaded, _) = Database::load(&bytes, composite_key, &progress).unwrap();
        assert_eq!(loaded.root().len(), 1);
        assert_eq!(loaded.iter_all_groups().count(), 1);
        assert_eq!(loaded.iter_all_entries().count(), 1);
    }

    #[test]
    fn deletion_moves_entries_into_an_auto_created_backup_group() {
        let mut db = fresh_database(50);
        let group_id = db.create_group(
            None,
            Group {
                id: 0,
                name: "General".to_owned(),
                icon_id: 0,
                created: crate::bytes::never_expires(),
                last_modified: crate::bytes::never_expires(),
                last_accessed: crate::bytes::never_expires(),
                expires: crate::bytes::never_expires(),
                usage_count: 0,
                flags: 0,
            },
        );
        let entry_uuid = Uuid::new_v4();
        db.create_entry(
            group_id,
            Entry {
                uuid: entry_uuid,
                group_id: group_id as u32,
                icon_id: 0,
                title: "E1".to_owned(),
                url: String::new(),
                username: String::new(),
                password: crate::entry::secret_string(""),
                notes: String::new(),
                created: crate::bytes::never_expires(),
                last_modified: crate::bytes::never_expires(),
                last_accessed: crate::bytes::never_expires(),
                expires: crate::bytes::never_expires(),
                attachment: None,
            },
        )
        .unwrap();

        assert!(db.get_backup_group().is_none());
        db.delete_entry(entry_uuid).unwrap();
        let backup_id = db.get_backup_group().unwrap().id;
        assert_eq!(db.tree.entries[&entry_uuid].parent, backup_id);

        db.delete_group(group_id).unwrap();
        assert!(!db.tree.groups.contains_key(&group_id));
    }

    #[test]
    fn create_group_id_wraps_past_i32_max() {
        let mut db = fresh_database(50);
        db.create_group(
            None,
            Group {
                id: i32::MAX,
                name: "Edge".to_owned(),
                icon_id: 0,
                created: crate::bytes::never_expires(),
                last_modified: crate::bytes::never_expires(),
                last_accessed: crate::bytes::never_expires(),
                expires: crate::bytes::never_expires(),
                usage_count: 0,
                flags: 0,
            },
        );
        assert_eq!(db.create_group_id(), i32::MIN);
    }
}
