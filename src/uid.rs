use {arrayvec::ArrayVec, std::fmt};

/// Identity of one serialized value within one serialization pass.
///
/// The address alone is not enough: an aggregate and its first field share
/// the same address, but not the same size.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uid {
    /// Opaque address token. Only meaningful within the pass that produced it.
    pub id: usize,
    /// Native size of the value in bytes
    pub size: usize,
}

impl Uid {
    /// The invalid identity
    pub const NONE: Self = Self { id: 0, size: 0 };

    /// Identity of the value `value` refers to
    #[must_use]
    pub fn from_ref<T: ?Sized>(value: &T) -> Self {
        Self {
            id: std::ptr::from_ref(value).addr(),
            size: size_of_val(value),
        }
    }
    /// Whether this identity refers to anything at all
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.id != 0 && self.size != 0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({:#x}, {})", self.id, self.size)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{}", self.id, self.size)
    }
}

/// One identity for plain values, two (pointer slot, then pointee) for pointers
pub type UidChain = ArrayVec<Uid, 2>;

/// Identity chain of a plain (non-pointer) value
#[must_use]
pub fn plain_chain(uid: Uid) -> UidChain {
    let mut chain = UidChain::new();
    chain.push(uid);
    chain
}

/// Identity chain of a first degree pointer
#[must_use]
pub fn pointer_chain(slot: Uid, pointee: Uid) -> UidChain {
    UidChain::from([slot, pointee])
}

#[test]
fn test_first_field_is_distinct() {
    #[repr(C)]
    struct Pair {
        a: u32,
        b: u32,
    }
    let pair = Pair { a: 1, b: 2 };
    let outer = Uid::from_ref(&pair);
    let first = Uid::from_ref(&pair.a);
    assert_eq!(outer.id, first.id);
    assert_ne!(outer, first);
    assert_ne!(Uid::from_ref(&pair.b), first);
    assert!(outer.is_valid());
    assert!(!Uid::NONE.is_valid());
}
