use crate::{
    data_type::DataType,
    uid::{Uid, UidChain},
};

/// Named reference from an aggregate (or container) to one of its values
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Member {
    pub(crate) uid: Uid,
    pub(crate) offset: isize,
    pub(crate) name: String,
    pub(crate) data_type: DataType,
}

impl Member {
    /// Creates a member reference. `offset` is `-1` for heap allocated members.
    #[must_use]
    pub fn new(name: impl Into<String>, uid: Uid, offset: isize, data_type: DataType) -> Self {
        Self {
            uid,
            offset,
            name: name.into(),
            data_type,
        }
    }
    /// Identity of the referenced object (head of its identity chain)
    #[must_use]
    pub const fn uid(&self) -> Uid {
        self.uid
    }
    /// Byte offset within the parent, `-1` if the member lives on the heap
    #[must_use]
    pub const fn offset(&self) -> isize {
        self.offset
    }
    /// The member's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The member's data type
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }
    /// Needs an identity, a name and a data type
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.uid.is_valid() && !self.name.is_empty() && self.data_type.is_valid()
    }
}

/// Everything an archive knows about one serialized value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Object {
    pub(crate) uid_chain: UidChain,
    pub(crate) data_type: DataType,
    pub(crate) version: u32,
    pub(crate) min_version: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) members: Vec<Member>,
}

impl Object {
    /// Creates an object without members, version or payload
    #[must_use]
    pub fn new(uid_chain: UidChain, data_type: DataType) -> Self {
        Self {
            uid_chain,
            data_type,
            ..Self::default()
        }
    }
    /// Needs a valid data type and at least one identity
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.data_type.is_valid() && !self.uid_chain.is_empty()
    }
    /// Identity at `index` of the chain, or [`Uid::NONE`]
    #[must_use]
    pub fn uid(&self, index: usize) -> Uid {
        self.uid_chain.get(index).copied().unwrap_or(Uid::NONE)
    }
    /// The full identity chain
    #[must_use]
    pub fn uid_chain(&self) -> &[Uid] {
        &self.uid_chain
    }
    /// The object's data type
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }
    /// Raw native payload of primitive values (little endian, UTF-8 for strings)
    #[must_use]
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
    /// Schema version of the object's data structure
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }
    /// Oldest version this object can be restored from or to
    #[must_use]
    pub const fn min_version(&self) -> u32 {
        self.min_version
    }
    /// Members in registration order
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }
    /// First member called `name`
    #[must_use]
    pub fn member_named(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
    /// Member referring to `uid`
    #[must_use]
    pub fn member_by_uid(&self, uid: Uid) -> Option<&Member> {
        self.members.iter().find(|m| m.uid == uid)
    }
    /// All members of data type `data_type`
    #[must_use]
    pub fn members_of_type(&self, data_type: &DataType) -> Vec<&Member> {
        self.members
            .iter()
            .filter(|m| m.data_type == *data_type)
            .collect()
    }
    /// Registration index of `member` among all members
    #[must_use]
    pub fn sequence_index_of(&self, member: &Member) -> Option<usize> {
        self.members.iter().position(|m| m.uid == member.uid)
    }
    /// Whether data of `other` can be applied to this object or the other way around
    #[must_use]
    pub const fn is_version_compatible_to(&self, other: &Self) -> bool {
        if self.version == other.version {
            true
        } else if self.version > other.version {
            self.min_version <= other.version
        } else {
            other.min_version <= self.version
        }
    }
    pub(crate) fn remove_member(&mut self, member: &Member) {
        self.members.retain(|m| m.uid != member.uid);
    }
}
