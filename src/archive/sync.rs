//! Reconciliation of a decoded archive with a fresh introspection of live objects

use {
    super::{Archive, Pass},
    crate::{
        archivable::Archivable,
        object::{Member, Object},
        result::{ArchiveResult, SchemaError},
        uid::Uid,
    },
    std::collections::{BTreeMap, HashMap, HashSet},
};

/// Source side of a deserialization, plus bookkeeping for its passes
pub(crate) struct Syncer {
    src: BTreeMap<Uid, Object>,
    src_root: Uid,
    /// Destination objects already reconciled
    visited: HashSet<Uid>,
    /// Destination containers waiting to be re-populated, with their source counterpart
    containers: HashMap<Uid, Uid>,
    /// Destination objects already written back (or being written back)
    restored: HashSet<Uid>,
}

impl Syncer {
    pub fn new(src: BTreeMap<Uid, Object>, src_root: Uid) -> Self {
        Self {
            src,
            src_root,
            visited: HashSet::new(),
            containers: HashMap::new(),
            restored: HashSet::new(),
        }
    }
    pub fn into_source(self) -> BTreeMap<Uid, Object> {
        self.src
    }
    /// Returns whether `uid` wasn't marked before
    pub fn mark_restored(&mut self, uid: Uid) -> bool {
        self.restored.insert(uid)
    }
    fn sync_object(
        &mut self,
        dst: &mut BTreeMap<Uid, Object>,
        dst_uid: Uid,
        src_uid: Uid,
    ) -> ArchiveResult {
        if self.visited.contains(&dst_uid) {
            return Ok(());
        }
        let (Some(dst_obj), Some(src_obj)) = (dst.get(&dst_uid), self.src.get(&src_uid)) else {
            return Ok(());
        };
        if !dst_obj.is_valid() || !src_obj.is_valid() {
            return Ok(());
        }
        if !dst_obj.is_version_compatible_to(src_obj) {
            return Err(SchemaError::VersionIncompatible {
                dst_version: dst_obj.version,
                dst_min_version: dst_obj.min_version,
                src_version: src_obj.version,
                src_min_version: src_obj.min_version,
            }
            .into());
        }
        if dst_obj.data_type != src_obj.data_type {
            return Err(SchemaError::TypeMismatch {
                dst: dst_obj.data_type.as_long_descr(),
                src: src_obj.data_type.as_long_descr(),
            }
            .into());
        }
        self.visited.insert(dst_uid);
        let dt = &dst_obj.data_type;
        if dt.is_pointer() {
            let (dst_pointee, src_pointee) = (dst_obj.uid(1), src_obj.uid(1));
            return self.sync_object(dst, dst_pointee, src_pointee);
        }
        if dt.is_array() || dt.is_set() || dt.is_map() {
            self.containers.insert(dst_uid, src_uid);
            return Ok(());
        }
        if dt.is_primitive() {
            let data = src_obj.data.clone();
            if let Some(obj) = dst.get_mut(&dst_uid) {
                obj.data = data;
            }
            return Ok(());
        }
        let mut pairs = Vec::with_capacity(src_obj.members.len());
        for src_member in &src_obj.members {
            let Some(dst_member) = dst_member_matching(dst_obj, src_obj, src_member) else {
                return Err(SchemaError::MissingMember {
                    name: src_member.name.clone(),
                }
                .into());
            };
            pairs.push((dst_member.uid, src_member.uid));
        }
        for (dst_uid, src_uid) in pairs {
            self.sync_object(dst, dst_uid, src_uid)?;
        }
        Ok(())
    }
    /// Container elements are matched by name only
    fn sync_elements(
        &mut self,
        dst: &mut BTreeMap<Uid, Object>,
        dst_uid: Uid,
        src_uid: Uid,
    ) -> ArchiveResult {
        let (Some(dst_obj), Some(src_obj)) = (dst.get(&dst_uid), self.src.get(&src_uid)) else {
            return Ok(());
        };
        let mut pairs = Vec::with_capacity(src_obj.members.len());
        for src_member in &src_obj.members {
            match dst_obj.member_named(&src_member.name) {
                Some(dst_member) => pairs.push((dst_member.uid, src_member.uid)),
                None => tracing::warn!(
                    "Element {} of {} has no counterpart, skipping",
                    src_member.name,
                    src_obj.data_type.as_long_descr()
                ),
            }
        }
        for (dst_uid, src_uid) in pairs {
            self.sync_object(dst, dst_uid, src_uid)?;
        }
        Ok(())
    }
}

/// Finds the destination member a source member's data should go to.
///
/// Tried in order: same name (which then must also have the same type), the
/// only member of that type, the member of that type at the same offset, the
/// member of that type at the same registration index.
fn dst_member_matching<'a>(
    dst_obj: &'a Object,
    src_obj: &Object,
    src_member: &Member,
) -> Option<&'a Member> {
    if let Some(member) = dst_obj.member_named(&src_member.name) {
        return (member.data_type == src_member.data_type).then_some(member);
    }
    let candidates = dst_obj.members_of_type(&src_member.data_type);
    match candidates.as_slice() {
        [] => return None,
        [only] => return Some(only),
        _ => {}
    }
    if let Some(member) = candidates.iter().find(|m| m.offset == src_member.offset) {
        return Some(member);
    }
    let index = src_obj.sequence_index_of(src_member)?;
    candidates
        .into_iter()
        .find(|m| dst_obj.sequence_index_of(m) == Some(index))
}

impl Archive {
    pub(crate) fn sync_root(&mut self) -> ArchiveResult {
        if !self.root_object().is_some_and(Object::is_valid) {
            return Err(SchemaError::NoDestinationRoot.into());
        }
        let Some(mut syncer) = self.syncer.take() else {
            return Ok(());
        };
        let src_root = syncer.src_root;
        let result = syncer.sync_object(&mut self.objects, self.root, src_root);
        tracing::debug!(
            visited = syncer.visited.len(),
            containers = syncer.containers.len(),
            "Synced {} onto {}",
            src_root,
            self.root
        );
        self.syncer = Some(syncer);
        result
    }
    /// Source counterpart of a destination container, if it still needs re-populating
    pub(crate) fn take_pending_container(&mut self, dst_uid: Uid) -> Option<Uid> {
        self.syncer.as_mut()?.containers.remove(&dst_uid)
    }
    /// Element names of a source container, in archived order
    pub(crate) fn source_member_names(&self, src_uid: Uid) -> Vec<String> {
        self.syncer
            .as_ref()
            .and_then(|s| s.src.get(&src_uid))
            .map(|obj| obj.members.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }
    /// Whether `uid` still needs writing back. Marks it as written back.
    pub(crate) fn mark_restored(&mut self, uid: Uid) -> bool {
        self.syncer.as_mut().is_none_or(|s| s.mark_restored(uid))
    }
    /// Drops everything known about the members of `uid`, before their memory goes away
    pub(crate) fn forget_members(&mut self, uid: Uid) {
        let members = match self.objects.get_mut(&uid) {
            Some(obj) => std::mem::take(&mut obj.members),
            None => return,
        };
        let mut seen = HashSet::new();
        for member in members {
            self.forget(member.uid, &mut seen);
        }
    }
    fn forget(&mut self, uid: Uid, seen: &mut HashSet<Uid>) {
        if !seen.insert(uid) {
            return;
        }
        if self
            .syncer
            .as_ref()
            .is_some_and(|s| s.restored.contains(&uid))
        {
            return;
        }
        let Some(obj) = self.objects.remove(&uid) else {
            return;
        };
        if let Some(syncer) = self.syncer.as_mut() {
            syncer.visited.remove(&uid);
            syncer.containers.remove(&uid);
        }
        for member in &obj.members {
            self.forget(member.uid, seen);
        }
        if obj.data_type.is_pointer() {
            self.forget(obj.uid(1), seen);
        }
    }
    /// Registers or restores container elements as heap members of `parent`
    pub(crate) fn walk_elements<'a, T: Archivable + 'a>(
        &mut self,
        parent: Uid,
        pass: Pass,
        elements: impl IntoIterator<Item = (String, &'a mut T)>,
    ) -> ArchiveResult {
        let prev = std::mem::replace(&mut self.pass, pass);
        self.push_parent(parent);
        let result = elements
            .into_iter()
            .try_for_each(|(name, elem)| self.heap_member(&name, elem));
        self.pop_parent();
        self.pass = prev;
        result
    }
    /// Reconciles freshly registered container elements with their archived counterparts
    pub(crate) fn sync_elements(&mut self, dst_uid: Uid, src_uid: Uid) -> ArchiveResult {
        let Some(mut syncer) = self.syncer.take() else {
            return Ok(());
        };
        let result = syncer.sync_elements(&mut self.objects, dst_uid, src_uid);
        self.syncer = Some(syncer);
        result
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            data_type::{BaseKind, DataType},
            uid::plain_chain,
        },
    };

    fn uid(id: usize, size: usize) -> Uid {
        Uid { id, size }
    }

    fn class_with(members: &[(&str, Uid, isize, BaseKind)]) -> Object {
        let mut obj = Object::new(
            plain_chain(uid(0x100, 16)),
            DataType::new(BaseKind::Class, 16, "Foo", ""),
        );
        for &(name, uid, offset, kind) in members {
            let size = if kind == BaseKind::Int32 { 4 } else { 8 };
            obj.members
                .push(Member::new(name, uid, offset, DataType::primitive(kind, size)));
        }
        obj
    }

    #[test]
    fn match_by_name_requires_type() {
        let src = class_with(&[("a", uid(1, 4), 0, BaseKind::Int32)]);
        let dst = class_with(&[("a", uid(2, 8), 0, BaseKind::Real64)]);
        assert!(dst_member_matching(&dst, &src, &src.members[0]).is_none());
    }

    #[test]
    fn match_renamed_by_unique_type() {
        let src = class_with(&[
            ("gain", uid(1, 4), 0, BaseKind::Int32),
            ("pan", uid(2, 8), 8, BaseKind::Real64),
        ]);
        let dst = class_with(&[
            ("volume", uid(3, 4), 4, BaseKind::Int32),
            ("pan", uid(4, 8), 8, BaseKind::Real64),
        ]);
        let m = dst_member_matching(&dst, &src, &src.members[0]).unwrap();
        assert_eq!(m.name(), "volume");
    }

    #[test]
    fn match_by_offset_then_index() {
        let src = class_with(&[
            ("x", uid(1, 4), 0, BaseKind::Int32),
            ("y", uid(2, 4), 4, BaseKind::Int32),
        ]);
        let dst = class_with(&[
            ("b", uid(3, 4), 4, BaseKind::Int32),
            ("a", uid(4, 4), 0, BaseKind::Int32),
        ]);
        assert_eq!(
            dst_member_matching(&dst, &src, &src.members[0]).unwrap().name(),
            "a"
        );
        let moved = class_with(&[
            ("p", uid(3, 4), 16, BaseKind::Int32),
            ("q", uid(4, 4), 20, BaseKind::Int32),
        ]);
        assert_eq!(
            dst_member_matching(&moved, &src, &src.members[1]).unwrap().name(),
            "q"
        );
    }

    #[test]
    fn primitive_data_is_copied_once() {
        let int = DataType::primitive(BaseKind::Int32, 4);
        let mut src_obj = Object::new(plain_chain(uid(1, 4)), int.clone());
        src_obj.data = 5i32.to_le_bytes().to_vec();
        let mut dst = BTreeMap::new();
        dst.insert(uid(2, 4), Object::new(plain_chain(uid(2, 4)), int));
        let mut syncer = Syncer::new(BTreeMap::from([(uid(1, 4), src_obj)]), uid(1, 4));
        syncer.sync_object(&mut dst, uid(2, 4), uid(1, 4)).unwrap();
        assert_eq!(dst[&uid(2, 4)].raw_data(), 5i32.to_le_bytes());
        assert!(syncer.visited.contains(&uid(2, 4)));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut src = BTreeMap::new();
        src.insert(
            uid(1, 4),
            Object::new(plain_chain(uid(1, 4)), DataType::primitive(BaseKind::Int32, 4)),
        );
        let mut dst = BTreeMap::new();
        dst.insert(
            uid(2, 4),
            Object::new(plain_chain(uid(2, 4)), DataType::primitive(BaseKind::Real32, 4)),
        );
        let mut syncer = Syncer::new(src, uid(1, 4));
        let err = syncer.sync_object(&mut dst, uid(2, 4), uid(1, 4));
        assert!(matches!(
            err,
            Err(crate::result::ArchiveError::Schema(SchemaError::TypeMismatch { .. }))
        ));
    }
}
