//! The `Entry` record and the meta-stream predicate that hides
//! format-internal entries from the visible tree.

use chrono::NaiveDateTime;
use secrecy::{ExposeSecret, SecretBox};
use uuid::Uuid;

/// A binary attachment carried by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment file name, as the client set it.
    pub name: String,
    /// Raw attachment bytes.
    pub data: Vec<u8>,
}

/// Wrap a plain string as protected secret material.
pub fn secret_string(s: impl Into<String>) -> SecretBox<String> {
    SecretBox::new(Box::new(s.into()))
}

/// A login record in the database tree.
#[derive(Debug)]
pub struct Entry {
    /// Stable identifier, unique within a file.
    pub uuid: Uuid,
    /// Id of the owning group, matching a [`crate::group::Group::id`].
    pub group_id: u32,
    /// Icon index into the client's icon set.
    pub icon_id: u32,
    /// Display title.
    pub title: String,
    /// Associated URL.
    pub url: String,
    /// Username.
    pub username: String,
    /// Password, held behind [`secrecy::SecretBox`] so it is not accidentally
    /// logged or printed.
    pub password: SecretBox<String>,
    /// Free-form notes.
    pub notes: String,
    /// Creation timestamp.
    pub created: NaiveDateTime,
    /// Last-modified timestamp.
    pub last_modified: NaiveDateTime,
    /// Last-accessed timestamp.
    pub last_accessed: NaiveDateTime,
    /// Expiry timestamp; [`crate::bytes::never_expires`] if the entry never expires.
    pub expires: NaiveDateTime,
    /// Binary attachment, if any.
    pub attachment: Option<Attachment>,
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        Entry {
            uuid: self.uuid,
            group_id: self.group_id,
            icon_id: self.icon_id,
            title: self.title.clone(),
            url: self.url.clone(),
            username: self.username.clone(),
            password: secret_string(self.password.expose_secret().clone()),
            notes: self.notes.clone(),
            created: self.created,
            last_modified: self.last_modified,
            last_accessed: self.last_accessed,
            expires: self.expires,
            attachment: self.attachment.clone(),
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
            && self.group_id == other.group_id
            && self.icon_id == other.icon_id
            && self.title == other.title
            && self.url == other.url
            && self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
            && self.notes == other.notes
            && self.created == other.created
            && self.last_modified == other.last_modified
            && self.last_accessed == other.last_accessed
            && self.expires == other.expires
            && self.attachment == other.attachment
    }
}

impl Eq for Entry {}

/// Notes values a meta-stream entry's payload is allowed to be tagged with.
const META_STREAM_NOTES: &[&str] = &["KPX_CUSTOM_ICONS_4", "KPX_GROUP_TREE_STATE"];

/// Six fields that together mark an entry as a meta-stream: an internal
/// sidecar (for instance a custom icon set) smuggled through the entry table
/// rather than a real login the user created. All six must hold for an entry
/// to be treated as a meta-stream, never a best-effort subset.
pub fn is_meta_stream(entry: &Entry) -> bool {
    const META_STREAM_TITLE: &str = "Meta-Info";
    const META_STREAM_USERNAME: &str = "SYSTEM";
    const META_STREAM_URL: &str = "$";

    entry.attachment.as_ref().is_some_and(|a| !a.data.is_empty())
        && META_STREAM_NOTES.contains(&entry.notes.as_str())
        && entry.title == META_STREAM_TITLE
        && entry.username == META_STREAM_USERNAME
        && entry.url == META_STREAM_URL
        && entry.icon_id == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::never_expires;

    fn sample() -> Entry {
        Entry {
            uuid: Uuid::new_v4(),
            group_id: 1,
            icon_id: 0,
            title: "My Bank".to_owned(),
            url: "https://bank.example".to_owned(),
            username: "alice".to_owned(),
            password: secret_string("hunter2"),
            notes: String::new(),
            created: never_expires(),
            last_modified: never_expires(),
            last_accessed: never_expires(),
            expires: never_expires(),
            attachment: None,
        }
    }

    #[test]
    fn ordinary_entry_is_not_a_meta_stream() {
        assert!(!is_meta_stream(&sample()));
    }

    #[test]
    fn all_six_fields_must_match() {
        let mut entry = sample();
        entry.title = "Meta-Info".to_owned();
        entry.username = "SYSTEM".to_owned();
        entry.url = "$".to_owned();
        entry.icon_id = 0;
        entry.notes = "KPX_CUSTOM_ICONS_4".to_owned();
        entry.attachment = Some(Attachment { name: "icons".to_owned(), data: vec![1, 2, 3] });
        assert!(is_meta_stream(&entry));

        let mut no_attachment = entry.clone();
        no_attachment.attachment = None;
        assert!(!is_meta_stream(&no_attachment));

        let mut empty_attachment = entry.clone();
        empty_attachment.attachment = Some(Attachment { name: "icons".to_owned(), data: Vec::new() });
        assert!(!is_meta_stream(&empty_attachment));

        let mut wrong_notes = entry.clone();
        wrong_notes.notes = "not a reserved tag".to_owned();
        assert!(!is_meta_stream(&wrong_notes));

        let mut wrong_icon = entry;
        wrong_icon.icon_id = 1;
        assert!(!is_meta_stream(&wrong_icon));
    }
}
