use serde::{Deserialize, Serialize};

use crate::ids::{Entity, Id};

pub const VERSION_FIELD: &str = "_version";

/// Monotonic per-document revision. Zero means "never saved".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
pub struct Version(u64);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(bound = "T: Entity")]
pub struct DocMeta<T> {
    #[serde(rename = "_id")]
    pub id: Id<T>,
    #[serde(rename = "_version", default)]
    pub version: Version,
}

pub trait HasMeta: Entity + Sized {
    fn meta(&self) -> &DocMeta<Self>;
    fn meta_mut(&mut self) -> &mut DocMeta<Self>;
}

impl<T> Default for DocMeta<T> {
    fn default() -> Self {
        let id = Default::default();
        let version = Default::default();
        DocMeta { id, version }
    }
}

impl<T> DocMeta<T> {
    pub fn new_with_id(id: Id<T>) -> Self {
        DocMeta {
            id,
            ..Default::default()
        }
    }
}

impl Version {
    pub fn is_new(&self) -> bool {
        self.0 == 0
    }

    pub fn next(&self) -> Version {
        Version(self.0 + 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
    struct Canary;
    impl Entity for Canary {
        const PREFIX: &'static str = "canary";
    }

    #[test]
    fn meta_serializes_with_underscored_fields() {
        let meta = DocMeta::<Canary>::new_with_id(Id::hashed("meta"));
        let json = serde_json::to_value(&meta).expect("to_value");

        assert_eq!(json["_id"], serde_json::json!(meta.id.to_string()));
        assert_eq!(json["_version"], serde_json::json!(0));
    }

    #[test]
    fn missing_version_reads_as_new() {
        let id = Id::<Canary>::hashed("meta");
        let json = serde_json::json!({ "_id": id.to_string() });
        let meta: DocMeta<Canary> = serde_json::from_value(json).expect("from_value");

        assert_eq!(meta.id, id);
        assert!(meta.version.is_new());
        assert!(!meta.version.next().is_new());
    }
}
