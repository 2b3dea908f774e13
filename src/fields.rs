//! The `(field_id: u16, length: u32, data)` TLV codec shared by group and
//! entry records, terminated by `field_id = 0xFFFF, length = 0`.

use chrono::NaiveDateTime;

use crate::bytes::{ByteReader, ByteWriter};
use crate::entry::{Attachment, Entry};
use crate::error::FieldError;
use crate::group::Group;

const FIELD_END: u16 = 0xFFFF;

// --- Group field ids ---
const G_COMMENT: u16 = 0x0000;
const G_ID: u16 = 0x0001;
const G_NAME: u16 = 0x0002;
const G_CREATED: u16 = 0x0003;
const G_LAST_MODIFIED: u16 = 0x0004;
const G_LAST_ACCESSED: u16 = 0x0005;
const G_EXPIRES: u16 = 0x0006;
const G_ICON: u16 = 0x0007;
const G_LEVEL: u16 = 0x0008;
const G_FLAGS: u16 = 0x0009;

// --- Entry field ids ---
const E_UUID: u16 = 0x0001;
const E_GROUP_ID: u16 = 0x0002;
const E_ICON: u16 = 0x0003;
const E_TITLE: u16 = 0x0004;
const E_URL: u16 = 0x0005;
const E_USERNAME: u16 = 0x0006;
const E_PASSWORD: u16 = 0x0007;
const E_NOTES: u16 = 0x0008;
const E_CREATED: u16 = 0x0009;
const E_LAST_MODIFIED: u16 = 0x000A;
const E_LAST_ACCESSED: u16 = 0x000B;
const E_EXPIRES: u16 = 0x000C;
const E_BINARY_DESC: u16 = 0x000D;
const E_BINARY_DATA: u16 = 0x000E;

fn read_tlv_header(r: &mut ByteReader<'_>) -> Result<(u16, u32), FieldError> {
    let field_id = r.read_u16()?;
    let length = r.read_u32()?;
    Ok((field_id, length))
}

fn require_length(field_name: &'static str, actual: u32, expected: u32) -> Result<(), FieldError> {
    if actual != expected {
        Err(FieldError::BadLength { field_name, actual, expected })
    } else {
        Ok(())
    }
}

/// A group plus the depth level it was serialized at, needed by the tree assembler.
#[derive(Debug, PartialEq)]
pub(crate) struct ParsedGroup {
    pub(crate) group: Group,
    pub(crate) level: u16,
}

/// Parse one group record, consuming bytes up to and including its 0xFFFF terminator.
pub(crate) fn parse_group(r: &mut ByteReader<'_>) -> Result<ParsedGroup, FieldError> {
    let mut id: Option<i32> = None;
    let mut name = String::new();
    let mut created: Option<NaiveDateTime> = None;
    let mut last_modified: Option<NaiveDateTime> = None;
    let mut last_accessed: Option<NaiveDateTime> = None;
    let mut expires: Option<NaiveDateTime> = None;
    let mut icon_id: u32 = 0;
    let mut level: Option<u16> = None;
    let mut flags: u32 = 0;

    loop {
        let (field_id, length) = read_tlv_header(r)?;
        match field_id {
            G_COMMENT => {
                r.read_blob(length as usize)?;
            }
            G_ID => {
                require_length("group id", length, 4)?;
                id = Some(r.read_i32()?);
            }
            G_NAME => {
                name = r.read_cstring(length as usize, "group name")?;
            }
            G_CREATED => {
                require_length("group created", length, 5)?;
                created = Some(r.read_timestamp("group created")?);
            }
            G_LAST_MODIFIED => {
                require_length("group last modified", length, 5)?;
                last_modified = Some(r.read_timestamp("group last modified")?);
            }
            G_LAST_ACCESSED => {
                require_length("group last accessed", length, 5)?;
                last_accessed = Some(r.read_timestamp("group last accessed")?);
            }
            G_EXPIRES => {
                require_length("group expires", length, 5)?;
                expires = Some(r.read_timestamp("group expires")?);
            }
            G_ICON => {
                require_length("group icon", length, 4)?;
                icon_id = r.read_u32()?;
            }
            G_LEVEL => {
                require_length("group level", length, 2)?;
                level = Some(r.read_u16()?);
            }
            G_FLAGS => {
                require_length("group flags", length, 4)?;
                flags = r.read_u32()?;
            }
            FIELD_END => {
                require_length("group terminator", length, 0)?;
                break;
            }
            _ => {
                // unknown field id: skip forward-compatibly
                r.read_blob(length as usize)?;
            }
        }
    }

    let id = id.ok_or(FieldError::MissingField { field_name: "group id" })?;
    let level = level.ok_or(FieldError::MissingField { field_name: "group level" })?;

    Ok(ParsedGroup {
        group: Group {
            id,
            name,
            icon_id,
            created: created.unwrap_or_default(),
            last_modified: last_modified.unwrap_or_default(),
            last_accessed: last_accessed.unwrap_or_default(),
            expires: expires.unwrap_or_else(crate::bytes::never_expires),
            usage_count: 0,
            flags,
        },
        level,
    })
}

/// Serialize one group record, including its 0xFFFF terminator.
pub(crate) fn write_group(w: &mut ByteWriter, group: &Group, level: u16) {
    write_u32_field(w, G_ID, group.id as u32);
    write_string_field(w, G_NAME, &group.name);
    write_timestamp_field(w, G_CREATED, &group.created);
    write_timestamp_field(w, G_LAST_MODIFIED, &group.last_modified);
    write_timestamp_field(w, G_LAST_ACCESSED, &group.last_accessed);
    write_timestamp_field(w, G_EXPIRES, &group.expires);
    write_u32_field(w, G_ICON, group.icon_id);
    write_u16_field(w, G_LEVEL, level);
    write_u32_field(w, G_FLAGS, group.flags);
    write_terminator(w);
}

/// Parse one entry record, consuming bytes up to and including its 0xFFFF terminator.
pub(crate) fn parse_entry(r: &mut ByteReader<'_>) -> Result<Entry, FieldError> {
    let mut uuid: Option<uuid::Uuid> = None;
    let mut group_id: Option<u32> = None;
    let mut icon_id: u32 = 0;
    let mut title = String::new();
    let mut url = String::new();
    let mut username = String::new();
    let mut password = String::new();
    let mut notes = String::new();
    let mut created: Option<NaiveDateTime> = None;
    let mut last_modified: Option<NaiveDateTime> = None;
    let mut last_accessed: Option<NaiveDateTime> = None;
    let mut expires: Option<NaiveDateTime> = None;
    let mut binary_desc = String::new();
    let mut binary_data: Vec<u8> = Vec::new();

    loop {
        let (field_id, length) = read_tlv_header(r)?;
        match field_id {
            E_UUID => {
                require_length("entry uuid", length, 16)?;
                let raw = r.read_blob(16)?;
                #[allow(clippy::unwrap_used)]
                let bytes: [u8; 16] = raw.try_into().unwrap();
                uuid = Some(uuid::Uuid::from_bytes(bytes));
            }
            E_GROUP_ID => {
                require_length("entry group id", length, 4)?;
                group_id = Some(r.read_u32()?);
            }
            E_ICON => {
                require_length("entry icon", length, 4)?;
                icon_id = r.read_u32()?;
            }
            E_TITLE => title = r.read_cstring(length as usize, "entry title")?,
            E_URL => url = r.read_cstring(length as usize, "entry url")?,
            E_USERNAME => username = r.read_cstring(length as usize, "entry username")?,
            E_PASSWORD => password = r.read_cstring(length as usize, "entry password")?,
            E_NOTES => notes = r.read_cstring(length as usize, "entry notes")?,
            E_CREATED => {
                require_length("entry created", length, 5)?;
                created = Some(r.read_timestamp("entry created")?);
            }
            E_LAST_MODIFIED => {
                require_length("entry last modified", length, 5)?;
                last_modified = Some(r.read_timestamp("entry last modified")?);
            }
            E_LAST_ACCESSED => {
                require_length("entry last accessed", length, 5)?;
                last_accessed = Some(r.read_timestamp("entry last accessed")?);
            }
            E_EXPIRES => {
                require_length("entry expires", length, 5)?;
                expires = Some(r.read_timestamp("entry expires")?);
            }
            E_BINARY_DESC => binary_desc = r.read_cstring(length as usize, "entry binary description")?,
            E_BINARY_DATA => binary_data = r.read_blob(length as usize)?.to_vec(),
            FIELD_END => {
                require_length("entry terminator", length, 0)?;
                break;
            }
            _ => {
                r.read_blob(length as usize)?;
            }
        }
    }

    let uuid = uuid.ok_or(FieldError::MissingField { field_name: "entry uuid" })?;
    let group_id = group_id.ok_or(FieldError::MissingField { field_name: "entry group id" })?;

    let attachment = if !binary_data.is_empty() || !binary_desc.is_empty() {
        Some(Attachment { name: binary_desc, data: binary_data })
    } else {
        None
    };

    Ok(Entry {
        uuid,
        group_id,
        icon_id,
        title,
        url,
        username,
        password: crate::entry::secret_string(password),
        notes,
        created: created.unwrap_or_default(),
        last_modified: last_modified.unwrap_or_default(),
        last_accessed: last_accessed.unwrap_or_default(),
        expires: expires.unwrap_or_else(crate::bytes::never_expires),
        attachment,
    })
}

/// Serialize one entry record, including its 0xFFFF terminator.
pub(crate) fn write_entry(w: &mut ByteWriter, entry: &Entry) {
    write_blob_field(w, E_UUID, entry.uuid.as_bytes());
    write_u32_field(w, E_GROUP_ID, entry.group_id);
    write_u32_field(w, E_ICON, entry.icon_id);
    write_string_field(w, E_TITLE, &entry.title);
    write_string_field(w, E_URL, &entry.url);
    write_string_field(w, E_USERNAME, &entry.username);
    use secrecy::ExposeSecret;
    write_string_field(w, E_PASSWORD, entry.password.expose_secret());
    write_string_field(w, E_NOTES, &entry.notes);
    write_timestamp_field(w, E_CREATED, &entry.created);
    write_timestamp_field(w, E_LAST_MODIFIED, &entry.last_modified);
    write_timestamp_field(w, E_LAST_ACCESSED, &entry.last_accessed);
    write_timestamp_field(w, E_EXPIRES, &entry.expires);
    if let Some(attachment) = &entry.attachment {
        write_string_field(w, E_BINARY_DESC, &attachment.name);
        write_blob_field(w, E_BINARY_DATA, &attachment.data);
    }
    write_terminator(w);
}

fn write_u16_field(w: &mut ByteWriter, id: u16, value: u16) {
    w.write_u16(id);
    w.write_u32(2);
    w.write_u16(value);
}

fn write_u32_field(w: &mut ByteWriter, id: u16, value: u32) {
    w.write_u16(id);
    w.write_u32(4);
    w.write_u32(value);
}

fn write_blob_field(w: &mut ByteWriter, id: u16, data: &[u8]) {
    w.write_u16(id);
    w.write_u32(data.len() as u32);
    w.write_blob(data);
}

fn write_string_field(w: &mut ByteWriter, id: u16, s: &str) {
    w.write_u16(id);
    w.write_u32(s.len() as u32 + 1);
    w.write_cstring(s);
}

fn write_timestamp_field(w: &mut ByteWriter, id: u16, ts: &NaiveDateTime) {
    w.write_u16(id);
    w.write_u32(5);
    w.write_timestamp(ts);
}

fn write_terminator(w: &mut ByteWriter) {
    w.write_u16(FIELD_END);
    w.write_u32(0);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bytes::never_expires;

    fn sample_group() -> Group {
        Group {
            id: 7,
            name: "General".to_owned(),
            icon_id: 1,
            created: never_expires(),
            last_modified: never_expires(),
            last_accessed: never_expires(),
            expires: never_expires(),
            usage_count: 0,
            flags: 0,
        }
    }

    #[test]
    fn group_round_trips() {
        let group = sample_group();
        let mut w = ByteWriter::new();
        write_group(&mut w, &group, 3);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        let parsed = parse_group(&mut r).unwrap();
        assert_eq!(parsed.level, 3);
        assert_eq!(parsed.group, group);
    }

    #[test]
    fn group_missing_id_is_an_error() {
        let mut w = ByteWriter::new();
        write_string_field(&mut w, G_NAME, "Orphan");
        write_u16_field(&mut w, G_LEVEL, 0);
        write_terminator(&mut w);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            parse_group(&mut r),
            Err(FieldError::MissingField { field_name: "group id" })
        );
    }

    #[test]
    fn group_skips_unknown_fields() {
        let mut w = ByteWriter::new();
        write_u32_field(&mut w, G_ID, 1);
        write_string_field(&mut w, G_NAME, "WithUnknown");
        write_u16_field(&mut w, G_LEVEL, 0);
        write_blob_field(&mut w, 0x1234, b"future extension data");
        write_terminator(&mut w);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        let parsed = parse_group(&mut r).unwrap();
        assert_eq!(parsed.group.name, "WithUnknown");
    }

    #[test]
    fn entry_round_trips_with_attachment() {
        let entry = Entry {
            uuid: uuid::Uuid::new_v4(),
            group_id: 7,
            icon_id: 0,
            title: "Sample".to_owned(),
            url: "https://example.com".to_owned(),
            username: "alice".to_owned(),
            password: crate::entry::secret_string("pa$$word"),
            notes: "some notes".to_owned(),
            created: never_expires(),
            last_modified: never_expires(),
            last_accessed: never_expires(),
            expires: never_expires(),
            attachment: Some(Attachment { name: "file.txt".to_owned(), data: vec![1, 2, 3] }),
        };

        let mut w = ByteWriter::new();
        write_entry(&mut w, &entry);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        let parsed = parse_entry(&mut r).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn entry_missing_uuid_is_an_error() {
        let mut w = ByteWriter::new();
        write_u32_field(&mut w, E_GROUP_ID, 1);
        write_terminator(&mut w);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            parse_entry(&mut r),
            Err(FieldError::MissingField { field_name: "entry uuid" })
        );
    }

    #[test]
    fn duplicate_fields_last_writer_wins() {
        let mut w = ByteWriter::new();
        write_u32_field(&mut w, G_ID, 1);
        write_string_field(&mut w, G_NAME, "first");
        write_string_field(&mut w, G_NAME, "second");
        write_u16_field(&mut w, G_LEVEL, 0);
        write_terminator(&mut w);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        let parsed = parse_group(&mut r).unwrap();
        assert_eq!(parsed.group.name, "second");
    }
}
