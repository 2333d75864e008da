//! Token dictionaries for compact entry encoding.
//!
//! Object class sets and attribute descriptions repeat across nearly every
//! stored entry, so the V2 encoding can replace them with small integer
//! tokens. The dictionary is shared by every encoder and decoder of a
//! backend and must outlive the entries written with it.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

#[derive(Debug)]
struct TokenTable<K> {
    tokens: HashMap<K, u32>,
    values: Vec<K>,
}

impl<K> Default for TokenTable<K> {
    fn default() -> Self {
        Self {
            tokens: HashMap::new(),
            values: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> TokenTable<K> {
    fn token(lock: &RwLock<Self>, key: &K) -> u32 {
        if let Some(token) = lock.read().tokens.get(key) {
            return *token;
        }
        let mut table = lock.write();
        // Another writer may have assigned it between the two locks
        if let Some(token) = table.tokens.get(key) {
            return *token;
        }
        let token = table.values.len() as u32;
        table.values.push(key.clone());
        table.tokens.insert(key.clone(), token);
        token
    }

    fn value(lock: &RwLock<Self>, token: u32) -> Option<K> {
        lock.read().values.get(token as usize).cloned()
    }
}

/// An attribute name as written plus its option set.
pub type AttributeDescriptionKey = (String, BTreeSet<String>);

/// Thread-safe token dictionaries for object class sets and attribute
/// descriptions.
#[derive(Debug, Default)]
pub struct CompressedSchema {
    object_class_sets: RwLock<TokenTable<Vec<String>>>,
    attribute_descriptions: RwLock<TokenTable<AttributeDescriptionKey>>,
}

impl CompressedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token for an ordered list of object class names, assigning a new
    /// one on first use.
    pub fn encode_object_classes(&self, names: &[String]) -> u32 {
        TokenTable::token(&self.object_class_sets, &names.to_vec())
    }

    pub fn decode_object_classes(&self, token: u32) -> Option<Vec<String>> {
        TokenTable::value(&self.object_class_sets, token)
    }

    pub fn encode_attribute_description(&self, name: &str, options: &BTreeSet<String>) -> u32 {
        TokenTable::token(
            &self.attribute_descriptions,
            &(name.to_string(), options.clone()),
        )
    }

    pub fn decode_attribute_description(&self, token: u32) -> Option<AttributeDescriptionKey> {
        TokenTable::value(&self.attribute_descriptions, token)
    }

    pub fn object_class_set_count(&self) -> usize {
        self.object_class_sets.read().values.len()
    }

    pub fn attribute_description_count(&self) -> usize {
        self.attribute_descriptions.read().values.len()
    }
}
