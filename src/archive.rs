use {
    crate::{
        archivable::{Archivable, Leaf, Serializable},
        data_type::DataType,
        object::{Member, Object},
        result::{ArchiveResult, SchemaError, UsageError},
        uid::{Uid, UidChain},
    },
    chrono::{DateTime, FixedOffset, Local, TimeZone as _, Utc},
    std::collections::BTreeMap,
};

mod codec;
mod sync;
pub(crate) mod value;

pub use codec::{FORMAT_MINOR_VERSION, MAGIC};

pub(crate) use sync::Syncer;

/// Size of enum values on platforms this crate runs on
pub const NATIVE_ENUM_SIZE: usize = size_of::<u32>();

/// What an archive is currently busy with
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Operation {
    /// Idle
    #[default]
    None,
    /// Introspecting a live object graph
    Serialize,
    /// Applying archived data onto a live object graph
    Deserialize,
}

/// Which time zone to express archive time stamps in
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimeBase {
    /// The local time zone
    Local,
    /// Coordinated universal time
    Utc,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub(crate) enum Pass {
    /// Members are added to the archive
    #[default]
    Register,
    /// Archived values are written back into members
    Restore,
}

/// A serialized object graph.
///
/// Serializing a root object introspects it (and everything it refers to)
/// into a set of [`Object`]s keyed by [`Uid`], which is then encoded into a
/// self describing byte stream. Deserializing applies a decoded archive onto
/// a live object graph, tolerating renamed, reordered, added and removed
/// members.
#[derive(Default)]
pub struct Archive {
    pub(crate) objects: BTreeMap<Uid, Object>,
    pub(crate) root: Uid,
    name: String,
    comment: String,
    time_created: i64,
    time_modified: i64,
    is_modified: bool,
    raw_data: Vec<u8>,
    operation: Operation,
    pub(crate) pass: Pass,
    parents: Vec<Uid>,
    pub(crate) syncer: Option<Box<Syncer>>,
}

impl Archive {
    /// Creates an empty archive
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Decodes an archive from its encoded form
    pub fn from_raw_data(data: &[u8]) -> ArchiveResult<Self> {
        let mut ar = Self::new();
        ar.decode(data)?;
        Ok(ar)
    }
    /// Introspects `root` and everything reachable from it, then encodes the result.
    ///
    /// Name and comment of the archive are kept.
    pub fn serialize<T: Archivable>(&mut self, root: &mut T) -> ArchiveResult {
        self.objects.clear();
        self.operation = Operation::Serialize;
        let result = self.introspect_root(root);
        if result.is_ok() {
            self.encode();
        }
        self.operation = Operation::None;
        result
    }
    /// Applies the data of this archive onto `root`.
    ///
    /// A fresh introspection of `root` is reconciled against this archive's
    /// objects, then the reconciled values are written back. On error, `root`
    /// is left modified up to the point of failure.
    pub fn deserialize<T: Archivable>(&mut self, root: &mut T) -> ArchiveResult {
        if !self.root_object().is_some_and(Object::is_valid) {
            return Err(SchemaError::NoSourceRoot.into());
        }
        self.operation = Operation::Deserialize;
        let mut dst = Self {
            operation: Operation::Deserialize,
            ..Self::default()
        };
        let syncer = Syncer::new(std::mem::take(&mut self.objects), self.root);
        dst.syncer = Some(Box::new(syncer));
        let result = dst.apply_to(root);
        if let Some(syncer) = dst.syncer.take() {
            self.objects = syncer.into_source();
        }
        self.operation = Operation::None;
        result
    }
    fn apply_to<T: Archivable>(&mut self, root: &mut T) -> ArchiveResult {
        self.introspect_root(root)?;
        self.sync_root()?;
        self.pass = Pass::Restore;
        if let Some(syncer) = self.syncer.as_mut() {
            syncer.mark_restored(self.root);
        }
        let chain = root.uid_chain();
        let result = root.restore(self, &chain);
        self.pass = Pass::Register;
        result
    }
    fn introspect_root<T: Archivable>(&mut self, root: &mut T) -> ArchiveResult {
        let chain = root.uid_chain();
        self.root = chain[0];
        self.pass = Pass::Register;
        let mut obj = Object::new(chain, T::data_type());
        obj.data = root.capture();
        self.objects.insert(self.root, obj);
        root.register(self)?;
        tracing::debug!(
            objects = self.objects.len(),
            "Introspected {}",
            T::data_type().as_long_descr()
        );
        Ok(())
    }

    /// Registers `value` as member `name` of the aggregate currently being serialized.
    ///
    /// Call this from [`Serializable::serialize`] for every member that should
    /// be persisted. Registration order matters: it is the last resort for
    /// matching renamed members.
    pub fn member<T: Archivable>(&mut self, name: &str, value: &mut T) -> ArchiveResult {
        self.member_impl(name, value, None)
    }
    /// Like [`Self::member`], for values that don't live inside their parent's memory
    pub fn heap_member<T: Archivable>(&mut self, name: &str, value: &mut T) -> ArchiveResult {
        self.member_impl(name, value, Some(-1))
    }
    fn member_impl<T: Archivable>(
        &mut self,
        name: &str,
        value: &mut T,
        offset: Option<isize>,
    ) -> ArchiveResult {
        let chain = value.uid_chain();
        match self.pass {
            Pass::Register => {
                if self.add_member_ref(name, value, &chain, offset)? {
                    value.register(self)?;
                }
                Ok(())
            }
            Pass::Restore => value.restore(self, &chain),
        }
    }
    /// Member registration for values that can't be mutably borrowed (set elements)
    pub(crate) fn leaf_member<T: Archivable + Leaf>(
        &mut self,
        name: &str,
        value: &T,
    ) -> ArchiveResult {
        let chain = value.uid_chain();
        self.add_member_ref(name, value, &chain, Some(-1))?;
        Ok(())
    }
    /// Adds the member to the current parent, returns whether the child still needs registration
    fn add_member_ref<T: Archivable>(
        &mut self,
        name: &str,
        value: &T,
        chain: &UidChain,
        offset: Option<isize>,
    ) -> ArchiveResult<bool> {
        let Some(&parent) = self.parents.last() else {
            return Err(UsageError::NoParent(name.to_owned()).into());
        };
        let uid = chain[0];
        let data_type = T::data_type();
        let collides = uid == parent
            || self
                .objects
                .get(&uid)
                .is_some_and(|existing| existing.is_valid() && existing.data_type != data_type);
        if collides {
            return Err(UsageError::IdentityCollision(name.to_owned()).into());
        }
        #[expect(clippy::cast_possible_wrap)]
        let offset = offset.unwrap_or_else(|| (uid.id as isize).wrapping_sub(parent.id as isize));
        let member = Member::new(name, uid, offset, data_type.clone());
        let parent_obj = self
            .objects
            .get_mut(&parent)
            .ok_or(UsageError::NoSuchObject)?;
        parent_obj.remove_member(&member);
        parent_obj.members.push(member);
        let mut obj = Object::new(chain.clone(), data_type);
        obj.data = value.capture();
        let install = match self.objects.get(&uid) {
            None => true,
            Some(existing) => !existing.is_valid() && obj.is_valid(),
        };
        if install {
            self.objects.insert(uid, obj);
        }
        Ok(install)
    }
    /// Makes `uid` the parent of subsequently registered members
    pub(crate) fn push_parent(&mut self, uid: Uid) {
        self.parents.push(uid);
    }
    pub(crate) fn pop_parent(&mut self) {
        self.parents.pop();
    }
    /// Walks the members of an aggregate in the current pass.
    #[doc(hidden)]
    pub fn walk_aggregate<T: Serializable>(&mut self, obj: &mut T) -> ArchiveResult {
        self.push_parent(Uid::from_ref(&*obj));
        let result = obj.serialize(self);
        self.pop_parent();
        result
    }

    /// Sets the schema version of the archived counterpart of `obj`
    pub fn set_version<T: Archivable>(&mut self, obj: &T, version: u32) -> ArchiveResult {
        self.object_for(obj).version = version;
        self.is_modified = true;
        Ok(())
    }
    /// Sets the oldest version the archived counterpart of `obj` is compatible with
    pub fn set_min_version<T: Archivable>(&mut self, obj: &T, min_version: u32) -> ArchiveResult {
        self.object_for(obj).min_version = min_version;
        self.is_modified = true;
        Ok(())
    }
    fn object_for<T: Archivable>(&mut self, value: &T) -> &mut Object {
        let chain = value.uid_chain();
        let obj = self.objects.entry(chain[0]).or_default();
        if !obj.is_valid() {
            let mut fresh = Object::new(chain, T::data_type());
            fresh.data = value.capture();
            *obj = fresh;
        }
        obj
    }
    /// Sets the schema version of an already archived object
    pub fn set_object_version(&mut self, uid: Uid, version: u32) -> ArchiveResult {
        self.valid_object_mut(uid)?.version = version;
        self.is_modified = true;
        Ok(())
    }
    /// Sets the minimum compatible version of an already archived object
    pub fn set_object_min_version(&mut self, uid: Uid, min_version: u32) -> ArchiveResult {
        self.valid_object_mut(uid)?.min_version = min_version;
        self.is_modified = true;
        Ok(())
    }

    /// The encoded form of this archive, re-encoded first if anything changed
    pub fn raw_data(&mut self) -> &[u8] {
        if self.is_modified || self.raw_data.is_empty() {
            self.encode();
        }
        &self.raw_data
    }
    /// Encodes the archive again, even if nothing changed.
    ///
    /// This refreshes the modification time stamp.
    pub fn reencode(&mut self) -> &[u8] {
        self.encode();
        &self.raw_data
    }
    /// Forgets all objects and time stamps
    pub fn clear(&mut self) {
        self.objects.clear();
        self.operation = Operation::None;
        self.root = Uid::NONE;
        self.raw_data.clear();
        self.is_modified = false;
        self.time_created = 0;
        self.time_modified = 0;
    }
    /// The archive's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Sets the archive's name
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.is_modified = true;
        }
    }
    /// Free form comment stored with the archive
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }
    /// Sets the archive's comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        if self.comment != comment {
            self.comment = comment;
            self.is_modified = true;
        }
    }
    /// Seconds since the Unix epoch at which the archive was first encoded
    #[must_use]
    pub const fn time_stamp_created(&self) -> i64 {
        self.time_created
    }
    /// Seconds since the Unix epoch at which the archive was last encoded
    #[must_use]
    pub const fn time_stamp_modified(&self) -> i64 {
        self.time_modified
    }
    /// Creation time in the requested time zone
    #[must_use]
    pub fn date_time_created(&self, base: TimeBase) -> Option<DateTime<FixedOffset>> {
        date_time(self.time_created, base)
    }
    /// Modification time in the requested time zone
    #[must_use]
    pub fn date_time_modified(&self, base: TimeBase) -> Option<DateTime<FixedOffset>> {
        date_time(self.time_modified, base)
    }
    /// Whether anything changed since the archive was last encoded or decoded
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.is_modified
    }
    /// What the archive is currently busy with
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }
    /// Identity of the root object
    #[must_use]
    pub const fn root_uid(&self) -> Uid {
        self.root
    }
    /// The root object
    #[must_use]
    pub fn root_object(&self) -> Option<&Object> {
        self.objects.get(&self.root)
    }
    /// The object with identity `uid`
    #[must_use]
    pub fn object_by_uid(&self, uid: Uid) -> Option<&Object> {
        self.objects.get(&uid)
    }
    /// All objects, ordered by identity
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    /// Removes `member` from `parent`, so it is left untouched on deserialization
    pub fn remove_member(&mut self, parent: Uid, member: &Member) -> ArchiveResult {
        self.valid_object_mut(parent)?.remove_member(member);
        self.is_modified = true;
        Ok(())
    }
    /// Removes the object `uid` from the archive
    pub fn remove(&mut self, uid: Uid) {
        if !uid.is_valid() {
            return;
        }
        self.objects.remove(&uid);
        self.is_modified = true;
    }

    /// Primitive value as text. Booleans are `0` or `1`.
    pub fn value_as_string(&self, uid: Uid) -> ArchiveResult<String> {
        let obj = self.primitive_target(uid, |_| true, "primitive")?;
        Ok(crate::io::lossy_string(&value::payload_to_text(
            &obj.data_type,
            &obj.data,
        )))
    }
    /// Integer or enum value
    pub fn value_as_int(&self, uid: Uid) -> ArchiveResult<i64> {
        let obj = self.primitive_target(
            uid,
            |dt| dt.is_integer() || dt.is_enum(),
            "integer or enum",
        )?;
        #[expect(clippy::cast_possible_truncation)]
        let n = value::int_from_le(&obj.data, obj.data_type.is_signed()).unwrap_or(0) as i64;
        Ok(n)
    }
    /// Floating point value
    pub fn value_as_real(&self, uid: Uid) -> ArchiveResult<f64> {
        let obj = self.primitive_target(uid, DataType::is_real, "real")?;
        Ok(value::real_from_le(&obj.data).unwrap_or(0.0))
    }
    /// Boolean value
    pub fn value_as_bool(&self, uid: Uid) -> ArchiveResult<bool> {
        let obj = self.primitive_target(uid, DataType::is_bool, "bool")?;
        Ok(obj.data.first().is_some_and(|b| *b != 0))
    }

    /// Sets an integer value, truncated to the object's width
    pub fn set_int_value(&mut self, uid: Uid, value: i64) -> ArchiveResult {
        let obj = self.primitive_target_mut(uid, DataType::is_integer, "integer")?;
        obj.data = value::int_to_le(i128::from(value), obj.data_type.size());
        self.is_modified = true;
        Ok(())
    }
    /// Sets a floating point value
    pub fn set_real_value(&mut self, uid: Uid, value: f64) -> ArchiveResult {
        let obj = self.primitive_target_mut(uid, DataType::is_real, "real")?;
        obj.data = value::real_to_le(value, obj.data_type.size());
        self.is_modified = true;
        Ok(())
    }
    /// Sets a boolean value
    pub fn set_bool_value(&mut self, uid: Uid, value: bool) -> ArchiveResult {
        let obj = self.primitive_target_mut(uid, DataType::is_bool, "bool")?;
        obj.data = vec![u8::from(value)];
        self.is_modified = true;
        Ok(())
    }
    /// Sets a string value
    pub fn set_string_value(&mut self, uid: Uid, value: &str) -> ArchiveResult {
        let obj = self.primitive_target_mut(uid, DataType::is_string, "String")?;
        obj.data = value.as_bytes().to_vec();
        self.is_modified = true;
        Ok(())
    }
    /// Sets an enum value.
    ///
    /// A recorded enum width this platform can't represent is coerced to
    /// [`NATIVE_ENUM_SIZE`], which changes the object's data type.
    pub fn set_enum_value(&mut self, uid: Uid, value: u64) -> ArchiveResult {
        let obj = self.primitive_target_mut(uid, DataType::is_enum, "enum")?;
        let size = obj.data_type.size();
        if !matches!(size, 1 | 2 | 4 | 8) {
            tracing::warn!(
                "Enum {} has unsupported width {size}, coercing to {NATIVE_ENUM_SIZE}",
                obj.data_type.as_long_descr()
            );
            obj.data_type.set_size(NATIVE_ENUM_SIZE);
        }
        obj.data = value::int_to_le(i128::from(value), obj.data_type.size());
        self.is_modified = true;
        Ok(())
    }
    /// Parses `value` according to the object's data type and sets it
    pub fn set_auto_value(&mut self, uid: Uid, value: &str) -> ArchiveResult {
        let data_type = self.primitive_target(uid, |_| true, "primitive")?.data_type.clone();
        let unparsable = || UsageError::UnparsableValue(value.to_owned());
        let text = value.trim();
        if data_type.is_integer() {
            let n = if data_type.is_signed() {
                text.parse::<i64>().map_err(|_| unparsable())?
            } else {
                #[expect(clippy::cast_possible_wrap)]
                let n = text.parse::<u64>().map_err(|_| unparsable())? as i64;
                n
            };
            self.set_int_value(uid, n)
        } else if data_type.is_real() {
            self.set_real_value(uid, text.parse().map_err(|_| unparsable())?)
        } else if data_type.is_bool() {
            self.set_bool_value(uid, value::parse_bool_text(value))
        } else if data_type.is_string() {
            self.set_string_value(uid, value)
        } else if data_type.is_enum() {
            self.set_enum_value(uid, text.parse().map_err(|_| unparsable())?)
        } else {
            Err(UsageError::WrongCategory {
                expected: "primitive",
                actual: data_type.as_long_descr(),
            }
            .into())
        }
    }

    fn valid_object_mut(&mut self, uid: Uid) -> ArchiveResult<&mut Object> {
        match self.objects.get_mut(&uid) {
            Some(obj) if obj.is_valid() => Ok(obj),
            Some(_) => Err(UsageError::InvalidObject.into()),
            None => Err(UsageError::NoSuchObject.into()),
        }
    }
    /// Identity of the object holding the value of `uid` (the pointee for pointers)
    fn primitive_target_uid(
        &self,
        uid: Uid,
        accepts: impl Fn(&DataType) -> bool,
        expected: &'static str,
    ) -> ArchiveResult<Uid> {
        let obj = match self.objects.get(&uid) {
            Some(obj) if obj.is_valid() => obj,
            Some(_) => return Err(UsageError::InvalidObject.into()),
            None => return Err(UsageError::NoSuchObject.into()),
        };
        if obj.data_type.is_class() {
            return Err(UsageError::NotPrimitive.into());
        }
        if !obj.data_type.is_primitive() || !accepts(&obj.data_type) {
            return Err(UsageError::WrongCategory {
                expected,
                actual: obj.data_type.as_long_descr(),
            }
            .into());
        }
        if obj.data_type.is_pointer() {
            let pointee = obj.uid(1);
            if !self.objects.get(&pointee).is_some_and(Object::is_valid) {
                return Err(UsageError::NoSuchObject.into());
            }
            Ok(pointee)
        } else {
            Ok(uid)
        }
    }
    fn primitive_target(
        &self,
        uid: Uid,
        accepts: impl Fn(&DataType) -> bool,
        expected: &'static str,
    ) -> ArchiveResult<&Object> {
        let target = self.primitive_target_uid(uid, accepts, expected)?;
        self.objects
            .get(&target)
            .ok_or_else(|| UsageError::NoSuchObject.into())
    }
    fn primitive_target_mut(
        &mut self,
        uid: Uid,
        accepts: impl Fn(&DataType) -> bool,
        expected: &'static str,
    ) -> ArchiveResult<&mut Object> {
        let target = self.primitive_target_uid(uid, accepts, expected)?;
        self.objects
            .get_mut(&target)
            .ok_or_else(|| UsageError::NoSuchObject.into())
    }
}

fn date_time(secs: i64, base: TimeBase) -> Option<DateTime<FixedOffset>> {
    let utc = Utc.timestamp_opt(secs, 0).single()?;
    Some(match base {
        TimeBase::Utc => utc.fixed_offset(),
        TimeBase::Local => utc.with_timezone(&Local).fixed_offset(),
    })
}
