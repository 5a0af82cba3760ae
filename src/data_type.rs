use std::{cmp::Ordering, fmt};

/// The fundamental category of a serialized value
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BaseKind {
    /// Signed 8 bit integer
    Int8,
    /// Unsigned 8 bit integer
    Uint8,
    /// Signed 16 bit integer
    Int16,
    /// Unsigned 16 bit integer
    Uint16,
    /// Signed 32 bit integer
    Int32,
    /// Unsigned 32 bit integer
    Uint32,
    /// Signed 64 bit integer
    Int64,
    /// Unsigned 64 bit integer
    Uint64,
    /// Boolean
    Bool,
    /// 32 bit floating point
    Real32,
    /// 64 bit floating point
    Real64,
    /// Text
    String,
    /// Ordered sequence of elements
    Array,
    /// Sorted collection of unique elements
    Set,
    /// Sorted key to value mapping
    Map,
    /// Fieldless enumeration stored as an integer
    Enum,
    /// Union
    Union,
    /// User defined aggregate
    Class,
}

impl BaseKind {
    /// The stable name used in the encoded stream
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Bool => "bool",
            Self::Real32 => "real32",
            Self::Real64 => "real64",
            Self::String => "String",
            Self::Array => "Array",
            Self::Set => "Set",
            Self::Map => "Map",
            Self::Enum => "enum",
            Self::Union => "union",
            Self::Class => "class",
        }
    }
    /// Inverse of [`Self::name`]
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int8" => Self::Int8,
            "uint8" => Self::Uint8,
            "int16" => Self::Int16,
            "uint16" => Self::Uint16,
            "int32" => Self::Int32,
            "uint32" => Self::Uint32,
            "int64" => Self::Int64,
            "uint64" => Self::Uint64,
            "bool" => Self::Bool,
            "real32" => Self::Real32,
            "real64" => Self::Real64,
            "String" => Self::String,
            "Array" => Self::Array,
            "Set" => Self::Set,
            "Map" => Self::Map,
            "enum" => Self::Enum,
            "union" => Self::Union,
            "class" => Self::Class,
            _ => return None,
        })
    }
}

/// Describes the data type of one serialized value.
///
/// For pointers this describes the pointee, with [`Self::is_pointer`] set.
#[derive(Clone, Debug, Default)]
pub struct DataType {
    base: Option<BaseKind>,
    is_pointer: bool,
    size: usize,
    custom_type_name: String,
    custom_type_name2: String,
}

impl DataType {
    /// Creates a data type from its parts
    #[must_use]
    pub fn new(
        base: BaseKind,
        size: usize,
        custom_type_name: impl Into<String>,
        custom_type_name2: impl Into<String>,
    ) -> Self {
        Self {
            base: Some(base),
            is_pointer: false,
            size,
            custom_type_name: custom_type_name.into(),
            custom_type_name2: custom_type_name2.into(),
        }
    }
    /// Data type of a primitive value of the given kind and size
    #[must_use]
    pub fn primitive(base: BaseKind, size: usize) -> Self {
        Self::new(base, size, "", "")
    }
    /// Data type of a user defined aggregate `T`.
    ///
    /// Types are identified by their name without module path, so moving a
    /// type to another module keeps its archives readable.
    #[must_use]
    pub fn class<T>() -> Self {
        Self::new(
            BaseKind::Class,
            size_of::<T>(),
            demangle_name(std::any::type_name::<T>()),
            "",
        )
    }
    /// Data type of a fieldless enum `T`, stored as its discriminant type `R`
    #[must_use]
    pub fn enumeration<T, R>() -> Self {
        Self::new(
            BaseKind::Enum,
            size_of::<R>(),
            demangle_name(std::any::type_name::<T>()),
            "",
        )
    }
    /// The same data type, but describing a pointer to it
    #[must_use]
    pub fn into_pointer(mut self) -> Self {
        self.is_pointer = true;
        self
    }
    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }
    pub(crate) fn from_parts(
        base: Option<BaseKind>,
        size: usize,
        is_pointer: bool,
        custom_type_name: String,
        custom_type_name2: String,
    ) -> Self {
        Self {
            base,
            is_pointer,
            size,
            custom_type_name,
            custom_type_name2,
        }
    }

    /// The base kind, if this data type is known at all
    #[must_use]
    pub const fn base(&self) -> Option<BaseKind> {
        self.base
    }
    /// Native size in bytes (of the pointee for pointers)
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
    /// Only valid data types have a size
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.size != 0
    }
    /// Whether this is a first degree pointer
    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        self.is_pointer
    }
    const fn is(&self, kind: BaseKind) -> bool {
        matches!(self.base, Some(b) if b as u8 == kind as u8)
    }
    /// User defined aggregate
    #[must_use]
    pub const fn is_class(&self) -> bool {
        self.is(BaseKind::Class)
    }
    /// Anything that is not an aggregate or a container, including strings
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        !self.is_class() && !self.is_array() && !self.is_set() && !self.is_map()
    }
    /// Text
    #[must_use]
    pub const fn is_string(&self) -> bool {
        self.is(BaseKind::String)
    }
    /// Any signed or unsigned integer kind
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self.base,
            Some(
                BaseKind::Int8
                    | BaseKind::Uint8
                    | BaseKind::Int16
                    | BaseKind::Uint16
                    | BaseKind::Int32
                    | BaseKind::Uint32
                    | BaseKind::Int64
                    | BaseKind::Uint64
            )
        )
    }
    /// Floating point
    #[must_use]
    pub const fn is_real(&self) -> bool {
        self.is(BaseKind::Real32) || self.is(BaseKind::Real64)
    }
    /// Boolean
    #[must_use]
    pub const fn is_bool(&self) -> bool {
        self.is(BaseKind::Bool)
    }
    /// Enumeration
    #[must_use]
    pub const fn is_enum(&self) -> bool {
        self.is(BaseKind::Enum)
    }
    /// Ordered sequence
    #[must_use]
    pub const fn is_array(&self) -> bool {
        self.is(BaseKind::Array)
    }
    /// Set
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.is(BaseKind::Set)
    }
    /// Map
    #[must_use]
    pub const fn is_map(&self) -> bool {
        self.is(BaseKind::Map)
    }
    /// Signed integers and all floating point kinds
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(
            self.base,
            Some(
                BaseKind::Int8
                    | BaseKind::Int16
                    | BaseKind::Int32
                    | BaseKind::Int64
                    | BaseKind::Real32
                    | BaseKind::Real64
            )
        )
    }
    /// Stable base type name, suitable for comparison and persistence
    #[must_use]
    pub fn base_type_name(&self) -> &str {
        self.base.map_or("", BaseKind::name)
    }
    /// Element or class type name.
    ///
    /// With `demangle` set, module paths are stripped for display.
    #[must_use]
    pub fn custom_type_name(&self, demangle: bool) -> String {
        if demangle {
            demangle_name(&self.custom_type_name)
        } else {
            self.custom_type_name.clone()
        }
    }
    /// Value type name of maps
    #[must_use]
    pub fn custom_type_name2(&self, demangle: bool) -> String {
        if demangle {
            demangle_name(&self.custom_type_name2)
        } else {
            self.custom_type_name2.clone()
        }
    }
    /// The name containers use to refer to this data type as their element type
    pub(crate) fn element_name(&self) -> String {
        self.long_descr_inner(false)
    }
    /// Human readable description, not meant to be stable across versions
    #[must_use]
    pub fn as_long_descr(&self) -> String {
        self.long_descr_inner(true)
    }
    fn long_descr_inner(&self, demangle: bool) -> String {
        let mut s = self.base_type_name().to_owned();
        let name1 = self.custom_type_name(demangle);
        let name2 = self.custom_type_name2(demangle);
        if self.is_array() || self.is_set() {
            s = format!("{s}<{name1}>");
        } else if self.is_map() {
            s = format!("{s}<{name1},{name2}>");
        } else if !name1.is_empty() {
            s = format!("{s} {name1}");
        }
        if self.is_pointer {
            s.push_str(" pointer");
        }
        s
    }
    /// Arbitrary, but deterministic total order.
    ///
    /// Unlike `==`, this also orders classes of different sizes.
    #[must_use]
    pub fn placement_cmp(&self, other: &Self) -> Ordering {
        self.base_type_name()
            .cmp(other.base_type_name())
            .then_with(|| self.custom_type_name.cmp(&other.custom_type_name))
            .then_with(|| self.custom_type_name2.cmp(&other.custom_type_name2))
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.is_pointer.cmp(&other.is_pointer))
    }
}

/// Classes may grow between versions, so their size doesn't take part in equality
impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
            && self.custom_type_name == other.custom_type_name
            && self.custom_type_name2 == other.custom_type_name2
            && (self.size == other.size || (self.is_class() && other.is_class()))
            && self.is_pointer == other.is_pointer
    }
}

impl Eq for DataType {}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_long_descr())
    }
}

/// Strips module paths from a (possibly generic) Rust type name
fn demangle_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut segment_start = 0;
    for (i, c) in raw.char_indices() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            continue;
        }
        out.push_str(last_path_segment(&raw[segment_start..i]));
        out.push(c);
        segment_start = i + c.len_utf8();
    }
    out.push_str(last_path_segment(&raw[segment_start..]));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
