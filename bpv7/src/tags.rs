/*!
In-process annotations on bundles and blocks.

Tags record facts learned while handling a bundle, for example whether a
block's CRC matched, or which node a bundle arrived from.  They are never
serialized, and a bundle decoded afresh starts with none.
*/
use hashbrown::HashMap;

/// Set to `TagValue::Bool` once a CRC has been checked
pub const CRC_CHECK: &str = "crc_check";
/// The node a bundle was received from, if known
pub const PREVIOUS_NODE: &str = "previous_node";

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagValue {
    Bool(bool),
    Uint(u64),
    Text(Box<str>),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tags(HashMap<Box<str>, TagValue>);

impl Tags {
    /// Sets `key` if it has no value yet, returning `false` if it already had one
    pub fn set(&mut self, key: &str, value: TagValue) -> bool {
        if self.0.contains_key(key) {
            return false;
        }
        self.0.insert(key.into(), value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Some(false)` if a CRC was checked and did not match
    pub fn crc_valid(&self) -> Option<bool> {
        match self.get(CRC_CHECK) {
            Some(TagValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v))
    }
}
