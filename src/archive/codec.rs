//! Srx byte stream format.
//!
//! Everything is a length prefixed blob (`<decimal length>:<bytes>`), so
//! readers can skip whatever they don't understand. Numbers are decimal text.

use {
    super::{Archive, value},
    crate::{
        data_type::{BaseKind, DataType},
        io::{Reader, write_blob, write_bool_blob, write_nested_blob, write_num_blob},
        object::{Member, Object},
        result::{ArchiveResult, DecodeError},
        uid::{Uid, UidChain},
    },
};

/// Leading bytes of every archive
pub const MAGIC: &[u8] = b"Srx1v";
/// Bumped when the format gains optional trailing fields
pub const FORMAT_MINOR_VERSION: u32 = 1;

impl Archive {
    pub(crate) fn encode(&mut self) {
        let now = chrono::Utc::now().timestamp();
        self.time_modified = now;
        if self.time_created == 0 {
            self.time_created = now;
        }
        let mut out = MAGIC.to_vec();
        write_nested_blob(&mut out, |out| {
            write_num_blob(out, FORMAT_MINOR_VERSION);
            write_uid(out, self.root);
            write_nested_blob(out, |out| {
                for obj in self.objects.values() {
                    write_object(out, obj);
                }
            });
            write_blob(out, self.name.as_bytes());
            write_blob(out, self.comment.as_bytes());
            write_num_blob(out, self.time_created);
            write_num_blob(out, self.time_modified);
        });
        tracing::debug!(
            objects = self.objects.len(),
            bytes = out.len(),
            "Encoded archive"
        );
        self.raw_data = out;
        self.is_modified = false;
    }

    /// Replaces the content of this archive with the decoded `data`.
    ///
    /// On error the archive is left empty.
    pub fn decode(&mut self, data: &[u8]) -> ArchiveResult {
        self.clear();
        self.name.clear();
        self.comment.clear();
        if let Err(e) = self.decode_inner(data) {
            self.clear();
            return Err(e.into());
        }
        self.raw_data = data.to_vec();
        tracing::debug!(
            objects = self.objects.len(),
            root = %self.root,
            "Decoded archive"
        );
        Ok(())
    }
    fn decode_inner(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        let body = data.strip_prefix(MAGIC).ok_or(DecodeError::MissingMagic)?;
        let mut root_blob = Reader::new(body).blob()?;
        if !root_blob.has_remaining() {
            return Err(DecodeError::NoRootObject);
        }
        let minor: u32 = root_blob.num_blob()?;
        if minor > FORMAT_MINOR_VERSION {
            tracing::debug!("Archive format minor version {minor} is newer than ours");
        }
        self.root = read_uid(&mut root_blob)?;
        if !self.root.is_valid() {
            return Err(DecodeError::NoRootObject);
        }
        let mut objects = root_blob.blob()?;
        while objects.has_remaining() {
            let obj = read_object(&mut objects)?;
            if obj.is_valid() && obj.uid(0).is_valid() {
                self.objects.insert(obj.uid(0), obj);
            }
        }
        if !self.objects.contains_key(&self.root) {
            return Err(DecodeError::MissingRootObject);
        }
        self.name = root_blob.opt_string_blob()?;
        self.comment = root_blob.opt_string_blob()?;
        self.time_created = root_blob.opt_num_blob()?;
        self.time_modified = root_blob.opt_num_blob()?;
        Ok(())
    }
}

fn write_uid(out: &mut Vec<u8>, uid: Uid) {
    write_nested_blob(out, |out| {
        write_num_blob(out, uid.id);
        write_num_blob(out, uid.size);
    });
}

fn write_data_type(out: &mut Vec<u8>, dt: &DataType) {
    write_nested_blob(out, |out| {
        write_blob(out, dt.base_type_name().as_bytes());
        write_blob(out, dt.custom_type_name(false).as_bytes());
        write_num_blob(out, dt.size());
        write_bool_blob(out, dt.is_pointer());
        write_blob(out, dt.custom_type_name2(false).as_bytes());
    });
}

fn write_object(out: &mut Vec<u8>, obj: &Object) {
    write_nested_blob(out, |out| {
        write_data_type(out, &obj.data_type);
        write_num_blob(out, obj.version);
        write_num_blob(out, obj.min_version);
        write_nested_blob(out, |out| {
            for uid in &obj.uid_chain {
                write_uid(out, *uid);
            }
        });
        write_nested_blob(out, |out| {
            for member in &obj.members {
                write_nested_blob(out, |out| {
                    write_uid(out, member.uid);
                    write_num_blob(out, member.offset);
                    write_blob(out, member.name.as_bytes());
                    write_data_type(out, &member.data_type);
                });
            }
        });
        let text = if obj.data_type.is_pointer() {
            Vec::new()
        } else {
            value::payload_to_text(&obj.data_type, &obj.data)
        };
        write_blob(out, &text);
    });
}

fn read_uid(rd: &mut Reader) -> Result<Uid, DecodeError> {
    let mut blob = rd.blob()?;
    Ok(Uid {
        id: blob.num_blob()?,
        size: blob.num_blob()?,
    })
}

fn read_data_type(rd: &mut Reader) -> Result<DataType, DecodeError> {
    let mut blob = rd.blob()?;
    let base_name = blob.string_blob()?;
    let custom_type_name = blob.string_blob()?;
    let size = blob.num_blob()?;
    let is_pointer = blob.bool_blob()?;
    let custom_type_name2 = blob.opt_string_blob()?;
    Ok(DataType::from_parts(
        BaseKind::from_name(&base_name),
        size,
        is_pointer,
        custom_type_name,
        custom_type_name2,
    ))
}

fn read_uid_chain(rd: &mut Reader) -> Result<UidChain, DecodeError> {
    let mut blob = rd.blob()?;
    let mut chain = UidChain::new();
    while blob.has_remaining() {
        chain
            .try_push(read_uid(&mut blob)?)
            .map_err(|_| DecodeError::UidChainTooLong)?;
    }
    Ok(chain)
}

fn read_member(rd: &mut Reader) -> Result<Member, DecodeError> {
    let mut blob = rd.blob()?;
    let uid = read_uid(&mut blob)?;
    let offset = blob.num_blob()?;
    let name = blob.string_blob()?;
    let data_type = read_data_type(&mut blob)?;
    Ok(Member::new(name, uid, offset, data_type))
}

fn read_object(rd: &mut Reader) -> Result<Object, DecodeError> {
    let mut blob = rd.blob()?;
    let data_type = read_data_type(&mut blob)?;
    let version = blob.num_blob()?;
    let min_version = blob.num_blob()?;
    let uid_chain = read_uid_chain(&mut blob)?;
    let mut members_blob = blob.opt_blob()?;
    let mut members = Vec::new();
    while members_blob.has_remaining() {
        let member = read_member(&mut members_blob)?;
        if member.is_valid() {
            members.push(member);
        }
    }
    let text = blob.opt_blob()?.data;
    let data = value::text_to_payload(&data_type, text)?;
    Ok(Object {
        uid_chain,
        data_type,
        version,
        min_version,
        data,
        members,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{result::ArchiveError, uid::plain_chain},
        proptest::prelude::*,
    };

    fn small_archive() -> Archive {
        let root = Uid { id: 0x1000, size: 8 };
        let field = Uid { id: 0x1004, size: 4 };
        let int = DataType::primitive(BaseKind::Int32, 4);
        let class = DataType::new(BaseKind::Class, 8, "Small", "");
        let mut parent = Object::new(plain_chain(root), class);
        parent.version = 3;
        parent.min_version = 2;
        parent.members.push(Member::new("b", field, 4, int.clone()));
        let mut child = Object::new(plain_chain(field), int);
        child.data = (-7i32).to_le_bytes().to_vec();
        let mut ar = Archive::new();
        ar.root = root;
        ar.objects.insert(root, parent);
        ar.objects.insert(field, child);
        ar.set_name("small");
        ar.set_comment("hand built");
        ar
    }

    #[test]
    fn decode_what_was_encoded() {
        let mut ar = small_archive();
        let raw = ar.raw_data().to_vec();
        assert!(raw.starts_with(MAGIC));
        assert!(!ar.is_modified());
        let decoded = Archive::from_raw_data(&raw).unwrap();
        assert_eq!(decoded.objects, ar.objects);
        assert_eq!(decoded.name(), "small");
        assert_eq!(decoded.comment(), "hand built");
        assert_eq!(decoded.root_object().unwrap().version(), 3);
        assert_eq!(decoded.time_stamp_created(), ar.time_stamp_created());
        assert!(decoded.time_stamp_created() > 0);
    }

    #[test]
    fn value_is_stored_as_text() {
        let mut ar = small_archive();
        let raw = ar.raw_data();
        assert!(raw.windows(4).any(|w| w == b"2:-7"));
    }

    #[test]
    fn structural_errors() {
        assert_eq!(
            Archive::from_raw_data(b"Srx2v5:hello").err(),
            Some(ArchiveError::Decode(DecodeError::MissingMagic))
        );
        assert_eq!(
            Archive::from_raw_data(b"Srx1v0:").err(),
            Some(ArchiveError::Decode(DecodeError::NoRootObject))
        );
        assert_eq!(
            Archive::from_raw_data(b"Srx1v").err(),
            Some(ArchiveError::Decode(DecodeError::MissingBlob))
        );
        // Root identity points at an object that isn't there
        assert_eq!(
            Archive::from_raw_data(b"Srx1v14:1:17:1:52:160:").err(),
            Some(ArchiveError::Decode(DecodeError::MissingRootObject))
        );
    }

    #[test]
    fn old_archives_without_trailing_fields() {
        let mut ar = small_archive();
        let raw = ar.raw_data().to_vec();
        // Cut name, comment and time stamps off the root blob
        let body = &raw[MAGIC.len()..];
        let mut rd = Reader::new(body);
        let mut root = rd.blob().unwrap();
        let mut head = Vec::new();
        write_num_blob(&mut head, root.num_blob::<u32>().unwrap());
        let uid_start = root.cur;
        read_uid(&mut root).unwrap();
        root.blob().unwrap();
        head.extend_from_slice(&root.data[uid_start..root.cur]);
        let mut truncated = MAGIC.to_vec();
        write_blob(&mut truncated, &head);
        let decoded = Archive::from_raw_data(&truncated).unwrap();
        assert_eq!(decoded.objects, ar.objects);
        assert_eq!(decoded.name(), "");
        assert_eq!(decoded.time_stamp_created(), 0);
    }

    #[test]
    fn objects_without_identity_are_dropped() {
        let mut ar = small_archive();
        let nameless = Uid { id: 0, size: 4 };
        let int = DataType::primitive(BaseKind::Int32, 4);
        ar.objects
            .insert(nameless, Object::new(plain_chain(nameless), int));
        let raw = ar.raw_data().to_vec();
        let decoded = Archive::from_raw_data(&raw).unwrap();
        assert!(decoded.objects.get(&nameless).is_none());
        assert_eq!(decoded.objects().count(), 2);
    }

    #[test]
    fn garbage_leaves_archive_empty() {
        let mut ar = small_archive();
        ar.raw_data();
        assert!(ar.decode(b"Srx1v9:nonsense").is_err());
        assert!(ar.root_object().is_none());
        assert_eq!(ar.objects().count(), 0);
    }

    proptest! {
        #[test]
        fn corrupted_streams_dont_panic(pos in 0usize..400, byte in any::<u8>()) {
            let mut ar = small_archive();
            let mut raw = ar.raw_data().to_vec();
            let pos = pos % raw.len();
            raw[pos] = byte;
            let _ = Archive::from_raw_data(&raw);
            raw.truncate(pos);
            let _ = Archive::from_raw_data(&raw);
        }
    }
}
