//! How values take part in serialization

use {
    crate::{
        archive::{Archive, Pass},
        data_type::{BaseKind, DataType},
        io::lossy_string,
        object::Object,
        result::{ArchiveResult, UsageError},
        uid::{Uid, UidChain, plain_chain, pointer_chain},
    },
    std::{
        cell::RefCell,
        collections::{BTreeMap, BTreeSet},
        fmt::Display,
        rc::Rc,
        str::FromStr,
    },
};

/// A user defined aggregate that lists its persistent members.
///
/// ```
/// use gigsrx::{Archive, ArchiveResult, Serializable, impl_archivable};
///
/// #[derive(Default)]
/// struct Settings {
///     gain: i32,
///     name: String,
/// }
///
/// impl Serializable for Settings {
///     fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
///         ar.member("gain", &mut self.gain)?;
///         ar.member("name", &mut self.name)
///     }
/// }
///
/// impl_archivable!(Settings);
/// ```
pub trait Serializable {
    /// Registers (or restores, the archive knows which) every persistent member
    fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult;
}

/// A value that can be a member of a serialized object graph
pub trait Archivable: Sized {
    /// Data type of all values of this type
    fn data_type() -> DataType;
    /// Identity of this value during the current pass
    fn uid_chain(&self) -> UidChain;
    /// Native payload of primitive values
    fn capture(&self) -> Vec<u8> {
        Vec::new()
    }
    /// Registers everything this value refers to
    fn register(&mut self, _ar: &mut Archive) -> ArchiveResult {
        Ok(())
    }
    /// Takes over the reconciled archive data for the object `chain` identifies
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult;
}

/// Values that are restored by replacing them as a whole, which makes them usable as set elements
pub trait Leaf: Archivable {}

fn payload<'a>(ar: &'a Archive, chain: &UidChain) -> Option<&'a [u8]> {
    ar.object_by_uid(chain[0]).map(Object::raw_data)
}

macro_rules! impl_primitive {
    ($($ty:ty => $kind:ident),+ $(,)?) => {$(
        impl Archivable for $ty {
            fn data_type() -> DataType {
                DataType::primitive(BaseKind::$kind, size_of::<Self>())
            }
            fn uid_chain(&self) -> UidChain {
                plain_chain(Uid::from_ref(self))
            }
            fn capture(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
            fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
                if let Some(bytes) = payload(ar, chain).and_then(|d| d.try_into().ok()) {
                    *self = Self::from_le_bytes(bytes);
                }
                Ok(())
            }
        }
        impl Leaf for $ty {}
    )+};
}

impl_primitive! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Real32,
    f64 => Real64,
}

impl Archivable for bool {
    fn data_type() -> DataType {
        DataType::primitive(BaseKind::Bool, size_of::<Self>())
    }
    fn uid_chain(&self) -> UidChain {
        plain_chain(Uid::from_ref(self))
    }
    fn capture(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
        if let Some(&b) = payload(ar, chain).and_then(<[u8]>::first) {
            *self = b != 0;
        }
        Ok(())
    }
}
impl Leaf for bool {}

impl Archivable for String {
    fn data_type() -> DataType {
        DataType::primitive(BaseKind::String, size_of::<Self>())
    }
    fn uid_chain(&self) -> UidChain {
        plain_chain(Uid::from_ref(self))
    }
    fn capture(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
        if let Some(data) = payload(ar, chain).filter(|d| *d != self.as_bytes()) {
            *self = lossy_string(data);
        }
        Ok(())
    }
}
impl Leaf for String {}

fn indexed<T>(items: &mut [T]) -> impl Iterator<Item = (String, &mut T)> {
    items
        .iter_mut()
        .enumerate()
        .map(|(i, item)| (format!("[{i}]"), item))
}

fn keyed<K: Display, V>(map: &mut BTreeMap<K, V>) -> impl Iterator<Item = (String, &mut V)> {
    map.iter_mut().map(|(k, v)| (format!("[{k}]"), v))
}

fn parse_key<K: FromStr>(name: &str) -> Option<K> {
    name.strip_prefix('[')?.strip_suffix(']')?.parse().ok()
}

/// Restores an array whose element count may differ from the archived one
impl<T: Archivable + Default> Archivable for Vec<T> {
    fn data_type() -> DataType {
        DataType::new(
            BaseKind::Array,
            size_of::<Self>(),
            T::data_type().element_name(),
            "",
        )
    }
    fn uid_chain(&self) -> UidChain {
        plain_chain(Uid::from_ref(self))
    }
    fn register(&mut self, ar: &mut Archive) -> ArchiveResult {
        let uid = Uid::from_ref(&*self);
        ar.walk_elements(uid, Pass::Register, indexed(self))
    }
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
        let uid = chain[0];
        if let Some(src) = ar.take_pending_container(uid) {
            ar.forget_members(uid);
            let len = ar.source_member_names(src).len();
            self.clear();
            self.resize_with(len, T::default);
            ar.walk_elements(uid, Pass::Register, indexed(self))?;
            ar.sync_elements(uid, src)?;
        }
        ar.walk_elements(uid, Pass::Restore, indexed(self))
    }
}

impl<T: Leaf + Default + Ord> Archivable for BTreeSet<T> {
    fn data_type() -> DataType {
        DataType::new(
            BaseKind::Set,
            size_of::<Self>(),
            T::data_type().element_name(),
            "",
        )
    }
    fn uid_chain(&self) -> UidChain {
        plain_chain(Uid::from_ref(self))
    }
    fn register(&mut self, ar: &mut Archive) -> ArchiveResult {
        ar.push_parent(Uid::from_ref(&*self));
        let result = self
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| ar.leaf_member(&format!("[{i}]"), item));
        ar.pop_parent();
        result
    }
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
        let uid = chain[0];
        let Some(src) = ar.take_pending_container(uid) else {
            return Ok(());
        };
        ar.forget_members(uid);
        let len = ar.source_member_names(src).len();
        let mut items: Vec<T> = std::iter::repeat_with(T::default).take(len).collect();
        ar.walk_elements(uid, Pass::Register, indexed(&mut items))?;
        ar.sync_elements(uid, src)?;
        ar.walk_elements(uid, Pass::Restore, indexed(&mut items))?;
        ar.forget_members(uid);
        *self = items.into_iter().collect();
        Ok(())
    }
}

/// Keys are persisted as element names, so they need a text form that reads back
impl<K, V> Archivable for BTreeMap<K, V>
where
    K: Leaf + Display + FromStr + Ord,
    V: Archivable + Default,
{
    fn data_type() -> DataType {
        DataType::new(
            BaseKind::Map,
            size_of::<Self>(),
            K::data_type().element_name(),
            V::data_type().element_name(),
        )
    }
    fn uid_chain(&self) -> UidChain {
        plain_chain(Uid::from_ref(self))
    }
    fn register(&mut self, ar: &mut Archive) -> ArchiveResult {
        let uid = Uid::from_ref(&*self);
        ar.walk_elements(uid, Pass::Register, keyed(self))
    }
    fn restore(&mut self, ar: &mut Archive, chain: &UidChain) -> ArchiveResult {
        let uid = chain[0];
        if let Some(src) = ar.take_pending_container(uid) {
            ar.forget_members(uid);
            self.clear();
            for name in ar.source_member_names(src) {
                match parse_key(&name) {
                    Some(key) => {
                        self.insert(key, V::default());
                    }
                    None => tracing::warn!("Map key {name} can't be parsed, dropping it"),
                }
            }
            ar.walk_elements(uid, Pass::Register, keyed(self))?;
            ar.sync_elements(uid, src)?;
        }
        ar.walk_elements(uid, Pass::Restore, keyed(self))
    }
}

fn pointee_uid<T>(cell: &RefCell<T>) -> Uid {
    Uid {
        id: cell.as_ptr().addr(),
        size: size_of::<T>(),
    }
}

fn register_pointee<T: Archivable>(ar: &mut Archive, cell: &RefCell<T>) -> ArchiveResult {
    let uid = pointee_uid(cell);
    if !uid.is_valid() || ar.object_by_uid(uid).is_some_and(Object::is_valid) {
        return Ok(());
    }
    let mut inner = cell.try_borrow_mut().map_err(|_| UsageError::BorrowConflict)?;
    let mut obj = Object::new(inner.uid_chain(), T::data_type());
    obj.data = inner.capture();
    ar.objects.insert(uid, obj);
    inner.register(ar)
}

fn restore_pointee<T: Archivable>(ar: &mut Archive, cell: &RefCell<T>) -> ArchiveResult {
    let uid = pointee_uid(cell);
    if !uid.is_valid() || !ar.mark_restored(uid) {
        return Ok(());
    }
    let mut inner = cell.try_borrow_mut().map_err(|_| UsageError::BorrowConflict)?;
    let chain = inner.uid_chain();
    inner.restore(ar, &chain)
}

/// Shared, possibly cyclic, references
impl<T: Archivable> Archivable for Rc<RefCell<T>> {
    fn data_type() -> DataType {
        T::data_type().into_pointer()
    }
    fn uid_chain(&self) -> UidChain {
        pointer_chain(Uid::from_ref(self), pointee_uid(self))
    }
    fn register(&mut self, ar: &mut Archive) -> ArchiveResult {
        register_pointee(ar, self)
    }
    fn restore(&mut self, ar: &mut Archive, _chain: &UidChain) -> ArchiveResult {
        restore_pointee(ar, self)
    }
}

/// A null pointer stays null on deserialization
impl<T: Archivable> Archivable for Option<Rc<RefCell<T>>> {
    fn data_type() -> DataType {
        T::data_type().into_pointer()
    }
    fn uid_chain(&self) -> UidChain {
        let pointee = self.as_deref().map_or(Uid::NONE, pointee_uid);
        pointer_chain(Uid::from_ref(self), pointee)
    }
    fn register(&mut self, ar: &mut Archive) -> ArchiveResult {
        match self {
            Some(rc) => register_pointee(ar, rc),
            None => Ok(()),
        }
    }
    fn restore(&mut self, ar: &mut Archive, _chain: &UidChain) -> ArchiveResult {
        match self {
            Some(rc) => restore_pointee(ar, rc),
            None => Ok(()),
        }
    }
}

/// Implements [`Archivable`] for types implementing [`Serializable`]
///
/// [`Serializable`]: crate::Serializable
#[macro_export]
macro_rules! impl_archivable {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Archivable for $ty {
            fn data_type() -> $crate::DataType {
                $crate::DataType::class::<Self>()
            }
            fn uid_chain(&self) -> $crate::UidChain {
                $crate::uid::plain_chain($crate::Uid::from_ref(self))
            }
            fn register(&mut self, ar: &mut $crate::Archive) -> $crate::ArchiveResult {
                ar.walk_aggregate(self)
            }
            fn restore(
                &mut self,
                ar: &mut $crate::Archive,
                _chain: &$crate::UidChain,
            ) -> $crate::ArchiveResult {
                ar.walk_aggregate(self)
            }
        }
    )+};
}

/// Implements [`Archivable`] for a fieldless enum, persisted as its discriminant.
///
/// Archived discriminants that match no variant leave the value unchanged.
///
/// ```
/// use gigsrx::impl_archivable_enum;
///
/// #[derive(Default)]
/// enum LoopType {
///     #[default]
///     Normal,
///     Bidirectional,
///     Backward,
/// }
///
/// impl_archivable_enum!(LoopType: u32 { Normal, Bidirectional, Backward });
/// ```
#[macro_export]
macro_rules! impl_archivable_enum {
    ($ty:ty : $repr:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Archivable for $ty {
            fn data_type() -> $crate::DataType {
                $crate::DataType::enumeration::<Self, $repr>()
            }
            fn uid_chain(&self) -> $crate::UidChain {
                $crate::uid::plain_chain($crate::Uid::from_ref(self))
            }
            fn capture(&self) -> ::std::vec::Vec<u8> {
                let n: $repr = match self {
                    $(Self::$variant => Self::$variant as $repr,)+
                };
                n.to_le_bytes().to_vec()
            }
            fn restore(
                &mut self,
                ar: &mut $crate::Archive,
                chain: &$crate::UidChain,
            ) -> $crate::ArchiveResult {
                let bytes = ar
                    .object_by_uid(chain[0])
                    .and_then(|obj| obj.raw_data().try_into().ok());
                if let Some(bytes) = bytes {
                    let n = <$repr>::from_le_bytes(bytes);
                    $(
                        if n == Self::$variant as $repr {
                            *self = Self::$variant;
                        }
                    )+
                }
                Ok(())
            }
        }
        impl $crate::archivable::Leaf for $ty {}
    };
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            archive::TimeBase,
            result::{ArchiveError, SchemaError},
        },
    };

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        #[default]
        Off,
        Slow,
        Fast,
    }
    crate::impl_archivable_enum!(Mode: u8 { Off, Slow, Fast });

    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        level: f32,
        active: bool,
    }

    impl Serializable for Inner {
        fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
            ar.member("level", &mut self.level)?;
            ar.member("active", &mut self.active)
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Patch {
        id: u16,
        gain: i64,
        ratio: f64,
        name: String,
        mode: Mode,
        inner: Inner,
        steps: Vec<i32>,
        tags: BTreeSet<String>,
        params: BTreeMap<String, f32>,
        layers: Vec<Inner>,
    }

    impl Serializable for Patch {
        fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
            ar.member("id", &mut self.id)?;
            ar.member("gain", &mut self.gain)?;
            ar.member("ratio", &mut self.ratio)?;
            ar.member("name", &mut self.name)?;
            ar.member("mode", &mut self.mode)?;
            ar.member("inner", &mut self.inner)?;
            ar.member("steps", &mut self.steps)?;
            ar.member("tags", &mut self.tags)?;
            ar.member("params", &mut self.params)?;
            ar.member("layers", &mut self.layers)
        }
    }

    crate::impl_archivable!(Inner, Patch);

    fn sample_patch() -> Patch {
        Patch {
            id: 7,
            gain: -1_000_000_000_000,
            ratio: 0.1,
            name: "Grand Piano".into(),
            mode: Mode::Slow,
            inner: Inner {
                level: 0.25,
                active: true,
            },
            steps: vec![3, 1, 4, 1, 5],
            tags: ["soft", "warm"].into_iter().map(String::from).collect(),
            params: [("attack".to_owned(), 0.5), ("release".to_owned(), 1.5)].into(),
            layers: vec![
                Inner {
                    level: 1.0,
                    active: false,
                },
                Inner {
                    level: -2.0,
                    active: true,
                },
            ],
        }
    }

    fn encode<T: Archivable>(value: &mut T) -> Vec<u8> {
        let mut ar = Archive::new();
        ar.serialize(value).unwrap();
        ar.raw_data().to_vec()
    }

    fn decode_into<T: Archivable>(raw: &[u8], value: &mut T) -> ArchiveResult {
        Archive::from_raw_data(raw)?.deserialize(value)
    }

    fn member_uid(ar: &Archive, name: &str) -> Uid {
        ar.root_object().unwrap().member_named(name).unwrap().uid()
    }

    #[test]
    fn whole_graph_survives() {
        let mut src = sample_patch();
        let raw = encode(&mut src);
        let mut dst = Patch::default();
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn containers_take_archived_length() {
        let mut src = sample_patch();
        let raw = encode(&mut src);
        let mut dst = Patch {
            steps: vec![9; 12],
            params: [("gone".to_owned(), 3.0)].into(),
            layers: Vec::new(),
            ..Patch::default()
        };
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst.steps, src.steps);
        assert_eq!(dst.params, src.params);
        assert_eq!(dst.layers, src.layers);
    }

    #[test]
    fn nested_containers() {
        #[derive(Default)]
        struct Grid {
            width: u16,
            rows: Vec<Vec<u8>>,
        }
        impl Serializable for Grid {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("width", &mut self.width)?;
                ar.member("rows", &mut self.rows)
            }
        }
        crate::impl_archivable!(Grid);
        let mut src = Grid {
            width: 2,
            rows: vec![vec![1, 2], vec![], vec![3]],
        };
        let raw = encode(&mut src);
        let mut dst = Grid {
            width: 0,
            rows: vec![vec![7; 4]],
        };
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst.width, 2);
        assert_eq!(dst.rows, src.rows);
    }

    mod v1 {
        use super::*;

        #[derive(Default)]
        pub struct Settings {
            pub gain: i32,
            pub label: String,
        }
        impl Serializable for Settings {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("gain", &mut self.gain)?;
                ar.member("label", &mut self.label)
            }
        }
        crate::impl_archivable!(Settings);
    }

    mod v2 {
        use super::*;

        #[derive(Default)]
        pub struct Settings {
            pub label: String,
            pub volume: i32,
            pub muted: bool,
        }
        impl Serializable for Settings {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("label", &mut self.label)?;
                ar.member("volume", &mut self.volume)?;
                ar.member("muted", &mut self.muted)
            }
        }
        crate::impl_archivable!(Settings);
    }

    #[test]
    fn renamed_and_added_members() {
        let mut old = v1::Settings {
            gain: 42,
            label: "lead".into(),
        };
        let raw = encode(&mut old);
        let mut new = v2::Settings {
            muted: true,
            ..Default::default()
        };
        decode_into(&raw, &mut new).unwrap();
        assert_eq!(new.volume, 42);
        assert_eq!(new.label, "lead");
        assert!(new.muted);
    }

    #[test]
    fn removed_member_is_reported() {
        let mut new = v2::Settings {
            muted: true,
            ..Default::default()
        };
        let raw = encode(&mut new);
        let mut old = v1::Settings::default();
        let err = decode_into(&raw, &mut old).unwrap_err();
        assert_eq!(
            err,
            ArchiveError::Schema(SchemaError::MissingMember {
                name: "muted".into()
            })
        );
    }

    #[derive(Default)]
    struct Versioned {
        x: i32,
        version: u32,
        min_version: u32,
    }

    impl Serializable for Versioned {
        fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
            ar.set_version(&*self, self.version)?;
            ar.set_min_version(&*self, self.min_version)?;
            ar.member("x", &mut self.x)
        }
    }
    crate::impl_archivable!(Versioned);

    #[test]
    fn version_gate() {
        let mut old = Versioned {
            x: 5,
            version: 1,
            min_version: 0,
        };
        let raw = encode(&mut old);
        let mut new = Versioned {
            version: 6,
            min_version: 3,
            ..Default::default()
        };
        assert!(matches!(
            decode_into(&raw, &mut new),
            Err(ArchiveError::Schema(SchemaError::VersionIncompatible {
                dst_version: 6,
                dst_min_version: 3,
                src_version: 1,
                src_min_version: 0,
            }))
        ));
        old.version = 4;
        let raw = encode(&mut old);
        decode_into(&raw, &mut new).unwrap();
        assert_eq!(new.x, 5);
    }

    #[derive(Default)]
    struct Node {
        value: i32,
        next: Option<Rc<RefCell<Node>>>,
    }

    impl Serializable for Node {
        fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
            ar.member("value", &mut self.value)?;
            ar.member("next", &mut self.next)
        }
    }
    crate::impl_archivable!(Node);

    fn ring(a: i32, b: i32) -> Rc<RefCell<Node>> {
        let first = Rc::new(RefCell::new(Node {
            value: a,
            next: None,
        }));
        let second = Rc::new(RefCell::new(Node {
            value: b,
            next: Some(Rc::clone(&first)),
        }));
        first.borrow_mut().next = Some(second);
        first
    }

    fn unlink(ring: &Rc<RefCell<Node>>) {
        ring.borrow_mut().next = None;
    }

    #[test]
    fn cycles_terminate() {
        let mut src = ring(1, 2);
        let mut ar = Archive::new();
        ar.serialize(&mut src).unwrap();
        // Root slot, two nodes, and two members per node
        assert_eq!(ar.objects().count(), 7);
        let raw = ar.raw_data().to_vec();
        let mut decoded = Archive::from_raw_data(&raw).unwrap();
        let mut dst = ring(0, 0);
        for _ in 0..2 {
            decoded.deserialize(&mut dst).unwrap();
        }
        assert_eq!(decoded.objects().count(), 7);
        assert_eq!(dst.borrow().value, 1);
        let second = dst.borrow().next.clone().unwrap();
        assert_eq!(second.borrow().value, 2);
        assert!(Rc::ptr_eq(second.borrow().next.as_ref().unwrap(), &dst));
        unlink(&src);
        unlink(&dst);
    }

    #[test]
    fn null_pointer_stays_null() {
        let mut src = ring(3, 4);
        let raw = encode(&mut src);
        let mut dst = Rc::new(RefCell::new(Node::default()));
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst.borrow().value, 3);
        assert!(dst.borrow().next.is_none());
        unlink(&src);
    }

    #[test]
    fn edit_values_in_archive() {
        let mut src = sample_patch();
        let mut ar = Archive::new();
        ar.serialize(&mut src).unwrap();
        assert!(!ar.is_modified());
        let gain = member_uid(&ar, "gain");
        assert_eq!(ar.value_as_int(gain).unwrap(), src.gain);
        ar.set_int_value(gain, -5).unwrap();
        assert!(ar.is_modified());
        let name = member_uid(&ar, "name");
        ar.set_auto_value(name, "Upright").unwrap();
        assert_eq!(ar.value_as_string(name).unwrap(), "Upright");
        let ratio = member_uid(&ar, "ratio");
        ar.set_auto_value(ratio, "2.5").unwrap();
        assert!((ar.value_as_real(ratio).unwrap() - 2.5).abs() < f64::EPSILON);
        let mode = member_uid(&ar, "mode");
        ar.set_enum_value(mode, 2).unwrap();
        assert_eq!(ar.value_as_int(mode).unwrap(), 2);
        let id = member_uid(&ar, "id");
        assert!(matches!(
            ar.set_auto_value(id, "many"),
            Err(ArchiveError::Usage(UsageError::UnparsableValue(_)))
        ));
        assert!(matches!(
            ar.set_real_value(id, 1.0),
            Err(ArchiveError::Usage(UsageError::WrongCategory { .. }))
        ));
        let inner = member_uid(&ar, "inner");
        assert_eq!(
            ar.value_as_bool(inner),
            Err(ArchiveError::Usage(UsageError::NotPrimitive))
        );
        assert_eq!(
            ar.value_as_int(Uid { id: 1, size: 1 }),
            Err(ArchiveError::Usage(UsageError::NoSuchObject))
        );

        let raw = ar.raw_data().to_vec();
        assert!(!ar.is_modified());
        let mut dst = Patch::default();
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst.gain, -5);
        assert_eq!(dst.name, "Upright");
        assert!((dst.ratio - 2.5).abs() < f64::EPSILON);
        assert_eq!(dst.mode, Mode::Fast);
    }

    #[test]
    fn removed_member_is_left_alone() {
        let mut src = sample_patch();
        let mut ar = Archive::new();
        ar.serialize(&mut src).unwrap();
        let root = ar.root_uid();
        let gain = ar.root_object().unwrap().member_named("gain").unwrap().clone();
        ar.remove_member(root, &gain).unwrap();
        ar.remove(gain.uid());
        let raw = ar.raw_data().to_vec();
        let mut dst = Patch {
            gain: 77,
            ..Patch::default()
        };
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(dst.gain, 77);
        assert_eq!(dst.name, src.name);
    }

    #[test]
    fn structural_mismatches() {
        let mut empty = Archive::new();
        assert_eq!(
            empty.deserialize(&mut Patch::default()),
            Err(ArchiveError::Schema(SchemaError::NoSourceRoot))
        );
        let raw = encode(&mut Inner::default());
        assert!(matches!(
            decode_into(&raw, &mut Patch::default()),
            Err(ArchiveError::Schema(SchemaError::TypeMismatch { .. }))
        ));
        let mut lone = Patch::default();
        let mut ar = Archive::new();
        assert_eq!(
            ar.member("orphan", &mut lone.id),
            Err(ArchiveError::Usage(UsageError::NoParent("orphan".into())))
        );
    }

    #[test]
    fn single_field_sharing_parent_identity() {
        #[derive(Default)]
        struct Gain {
            db: f64,
        }
        impl Serializable for Gain {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("db", &mut self.db)
            }
        }
        #[derive(Default)]
        struct Keys {
            notes: Vec<u8>,
        }
        impl Serializable for Keys {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("notes", &mut self.notes)
            }
        }
        crate::impl_archivable!(Gain, Keys);
        assert_eq!(
            Archive::new().serialize(&mut Gain { db: -6.5 }),
            Err(ArchiveError::Usage(UsageError::IdentityCollision("db".into())))
        );
        assert_eq!(
            Archive::new().serialize(&mut Keys {
                notes: vec![60, 64, 67]
            }),
            Err(ArchiveError::Usage(UsageError::IdentityCollision("notes".into())))
        );
        let raw = encode(&mut sample_patch());
        let mut ar = Archive::from_raw_data(&raw).unwrap();
        assert!(matches!(
            ar.deserialize(&mut Gain::default()),
            Err(ArchiveError::Usage(UsageError::IdentityCollision(_)))
        ));
    }

    #[test]
    fn shared_primitive_values() {
        #[derive(Default)]
        struct Meter {
            level: Rc<RefCell<i32>>,
            id: u32,
        }
        impl Serializable for Meter {
            fn serialize(&mut self, ar: &mut Archive) -> ArchiveResult {
                ar.member("level", &mut self.level)?;
                ar.member("id", &mut self.id)
            }
        }
        crate::impl_archivable!(Meter);
        let mut src = Meter {
            level: Rc::new(RefCell::new(-9)),
            id: 3,
        };
        let mut ar = Archive::new();
        ar.serialize(&mut src).unwrap();
        let slot = member_uid(&ar, "level");
        assert_eq!(ar.value_as_int(slot), Ok(-9));
        ar.set_int_value(slot, 41).unwrap();
        let raw = ar.raw_data().to_vec();
        let mut dst = Meter::default();
        decode_into(&raw, &mut dst).unwrap();
        assert_eq!(*dst.level.borrow(), 41);
        assert_eq!(dst.id, 3);
        assert_eq!(*src.level.borrow(), -9);
    }

    #[test]
    fn archive_metadata() {
        let mut ar = Archive::new();
        ar.set_name("bank");
        ar.set_comment("factory presets");
        ar.serialize(&mut sample_patch()).unwrap();
        let raw = ar.raw_data().to_vec();
        let decoded = Archive::from_raw_data(&raw).unwrap();
        assert_eq!(decoded.name(), "bank");
        assert_eq!(decoded.comment(), "factory presets");
        let created = decoded.date_time_created(TimeBase::Utc).unwrap();
        assert_eq!(created.timestamp(), ar.time_stamp_created());
        assert!(decoded.date_time_modified(TimeBase::Local).is_some());
        ar.clear();
        assert!(ar.root_object().is_none());
        assert_eq!(ar.name(), "bank");
    }
}
