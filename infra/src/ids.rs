use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{self, AtomicU64};
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE64URL_NOPAD;
use err_derive::Error;
use hex_slice::AsHex;
use rand::distributions::{Distribution, Standard};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const ID_LEN: usize = 16;

pub struct Id<T> {
    val: [u8; ID_LEN],
    phantom: PhantomData<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error(display = "Invalid prefix")]
    InvalidPrefix,
    #[error(display = "Unparseable Id")]
    Unparseable,
}

pub trait Entity {
    const PREFIX: &'static str;
}

/// Hands out identifiers whose leading eight bytes are a strictly increasing
/// timestamp, so that byte order (and hence store iteration order) follows
/// creation order.
#[derive(Debug, Default)]
pub struct IdGen {
    last: AtomicU64,
}

const DIVIDER: &str = "-";

impl<T> Id<T> {
    pub fn hashed<H: Hash + ?Sized>(entity: &H) -> Self {
        let mut val = [0u8; ID_LEN];
        for (i, chunk) in val.chunks_mut(8).enumerate() {
            let mut h = siphasher::sip::SipHasher24::new_with_keys(0, i as u64);
            entity.hash(&mut h);
            chunk.copy_from_slice(&h.finish().to_be_bytes());
        }
        Id {
            val,
            phantom: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.val
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdParseError> {
        if bytes.len() != ID_LEN {
            return Err(IdParseError::Unparseable);
        }
        let mut id = Id::default();
        id.val.copy_from_slice(bytes);
        Ok(id)
    }

    /// Re-labels the id for another entity kind.
    pub fn cast<U>(self) -> Id<U> {
        Id {
            val: self.val,
            phantom: PhantomData,
        }
    }
}

impl IdGen {
    pub fn new() -> Self {
        IdGen::default()
    }

    pub fn generate<T>(&self) -> Id<T> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut prev = self.last.load(atomic::Ordering::SeqCst);
        let stamp = loop {
            let next = now.max(prev + 1);
            match self.last.compare_exchange(
                prev,
                next,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };

        let mut val = [0u8; ID_LEN];
        val[..8].copy_from_slice(&stamp.to_be_bytes());
        val[8..].copy_from_slice(&rand::random::<u64>().to_be_bytes());
        Id {
            val,
            phantom: PhantomData,
        }
    }
}

impl<T> Distribution<Id<T>> for Standard {
    fn sample<R: ?Sized + rand::Rng>(&self, rng: &mut R) -> Id<T> {
        let val = rng.gen();
        Id {
            val,
            phantom: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}{}{}",
            T::PREFIX,
            DIVIDER,
            BASE64URL_NOPAD.encode(&self.val)
        )
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Id")
            .field("val", &format_args!("{:x}", self.val.as_hex()))
            .finish()
    }
}

impl<T: Entity> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        if T::PREFIX.len() > src.len() || !src.is_char_boundary(T::PREFIX.len()) {
            return Err(IdParseError::InvalidPrefix);
        };
        let (start, remainder) = src.split_at(T::PREFIX.len());
        if start != T::PREFIX {
            return Err(IdParseError::InvalidPrefix);
        }
        if !remainder.starts_with(DIVIDER) {
            return Err(IdParseError::Unparseable);
        }
        let b64 = &remainder[DIVIDER.len()..];

        let bytes = BASE64URL_NOPAD
            .decode(b64.as_bytes())
            .map_err(|_| IdParseError::Unparseable)?;
        Id::from_bytes(&bytes)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        let val = Default::default();
        let phantom = PhantomData;
        Id { val, phantom }
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.val.hash(state)
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.val.cmp(&other.val)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T: Entity> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: Entity> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdStrVisitor<T>(PhantomData<T>);
        impl<'vi, T: Entity> de::Visitor<'vi> for IdStrVisitor<T> {
            type Value = Id<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an Id string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Id<T>, E> {
                value.parse::<Id<T>>().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdStrVisitor(PhantomData))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;

    #[derive(Debug)]
    struct Canary;

    impl Entity for Canary {
        const PREFIX: &'static str = "canary";
    }

    #[test]
    fn round_trips_via_to_from_str() {
        let id = Id::<Canary>::hashed(&"Hi!");
        let s = id.to_string();
        println!("String: {}", s);
        let id2 = s.parse::<Id<Canary>>().expect("parse id");
        assert_eq!(id, id2);
    }

    #[test]
    fn serializes_to_string_like() {
        let id = Id::<Canary>::hashed(&"Hi!");

        let json = serde_json::to_string(&id).expect("serde_json::to_string");
        let s: String = serde_json::from_str(&json).expect("serde_json::from_str");
        assert_eq!(id.to_string(), s);
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(Id::<Canary>::hashed("list"), Id::<Canary>::hashed("list"));
        assert_ne!(Id::<Canary>::hashed("list"), Id::<Canary>::hashed("other"));
    }

    #[test]
    fn should_allow_random_generation() {
        let mut rng = rand::thread_rng();

        let id = rng.gen::<Id<Canary>>();
        let id2 = rng.gen::<Id<Canary>>();

        assert_ne!(id, id2);
    }

    #[test]
    fn generated_ids_follow_creation_order() {
        let idgen = IdGen::new();
        let ids = (0..64).map(|_| idgen.generate()).collect::<Vec<Id<Canary>>>();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        sorted.dedup();
        assert_eq!(ids.len(), sorted.len());
    }

    #[test]
    fn to_string_should_be_prefixed_with_type_name() {
        let id = rand::random::<Id<Canary>>();

        let s = id.to_string();

        assert!(
            s.starts_with("canary-"),
            "string: {:?} starts with {:?}",
            s,
            "canary-"
        )
    }

    #[test]
    fn should_verify_has_correct_entity_prefix() {
        let s = "wrongy-yxdgMe3dIHOX4NvCH90t4w";

        let result = s.parse::<Id<Canary>>();

        assert_eq!(result, Err(IdParseError::InvalidPrefix));
    }

    #[test]
    fn should_yield_useful_error_when_just_prefix() {
        let s = "canary";
        let result = s.parse::<Id<Canary>>();

        assert_eq!(result, Err(IdParseError::Unparseable));
    }

    #[test]
    fn should_yield_useful_error_when_wrong_divider() {
        let s = "canary#yxdgMe3dIHOX4NvCH90t4w";
        let result = s.parse::<Id<Canary>>();

        assert_eq!(result, Err(IdParseError::Unparseable));
    }

    #[test]
    fn should_reject_truncated_payload() {
        let s = "canary-yxdgMe3d";
        let result = s.parse::<Id<Canary>>();

        assert_eq!(result, Err(IdParseError::Unparseable));
    }
}
