use std::marker::PhantomData;

use anyhow::{Context, Result};
use err_derive::Error;
use fallible_iterator::FallibleIterator;
use log::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;

use crate::documents::{HasMeta, Version, VERSION_FIELD};
use crate::ids::{Entity, Id};

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "stale version")]
pub struct ConcurrencyError;

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "store schema {} is newer than supported {}", found, supported)]
pub struct SchemaError {
    pub found: u32,
    pub supported: u32,
}

pub type TxResult<T> = Result<T, ConflictableTransactionError<anyhow::Error>>;

const SCHEMA_KEY: &[u8] = b"__schema_version";
const SCHEMA_VERSION: u32 = 1;

pub trait Storage {
    fn setup(&self) -> Result<()>;
    fn load<D: DeserializeOwned + Entity>(&self, id: &Id<D>) -> Result<Option<D>>;
    fn save<D: Serialize + HasMeta>(&self, document: &mut D) -> Result<()>;
    fn delete<D: Entity>(&self, id: &Id<D>) -> Result<bool>;
    fn load_all<D: DeserializeOwned + Entity>(&self) -> Result<Vec<D>>;
}

/// A handle onto the document database; one sled tree per entity kind,
/// keyed by raw id bytes, holding JSON bodies.
#[derive(Debug, Clone)]
pub struct Documents {
    db: sled::Db,
}

#[derive(Debug, Clone)]
pub struct DocumentConnectionManager {
    db: sled::Db,
}

/// A typed view of one tree inside a running transaction.
pub struct DocTree<'a, D> {
    tree: &'a TransactionalTree,
    phantom: PhantomData<D>,
}

#[derive(Deserialize)]
struct Stamp {
    #[serde(rename = "_version", default)]
    version: Version,
}

pub fn abort<E: Into<anyhow::Error>>(err: E) -> ConflictableTransactionError<anyhow::Error> {
    ConflictableTransactionError::Abort(err.into())
}

fn unwrap_tx<R>(res: Result<R, TransactionError<anyhow::Error>>) -> Result<R> {
    res.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => anyhow::Error::from(e),
    })
}

impl Documents {
    pub fn wrap(db: sled::Db) -> Self {
        Documents { db }
    }

    fn tree<D: Entity>(&self) -> Result<sled::Tree> {
        self.db
            .open_tree(D::PREFIX)
            .with_context(|| format!("open tree {}", D::PREFIX))
    }

    /// Streams every document of one kind in key order.
    pub fn scan<D: DeserializeOwned + Entity>(
        &self,
    ) -> Result<impl FallibleIterator<Item = D, Error = anyhow::Error>> {
        let tree = self.tree::<D>()?;
        let it = tree.iter().values().map(|res| -> Result<D> {
            let bytes = res?;
            let doc = serde_json::from_slice(&bytes)
                .with_context(|| format!("decode {} document", D::PREFIX))?;
            Ok(doc)
        });
        Ok(fallible_iterator::convert(it))
    }

    pub fn transaction<A, R, F>(&self, f: F) -> Result<R>
    where
        A: Entity,
        F: Fn(&DocTree<A>) -> TxResult<R>,
    {
        let a = self.tree::<A>()?;
        unwrap_tx(a.transaction(|ta| f(&DocTree::wrap(ta))))
    }

    /// Runs `f` atomically against two collections.
    pub fn transaction2<A, B, R, F>(&self, f: F) -> Result<R>
    where
        A: Entity,
        B: Entity,
        F: Fn(&DocTree<A>, &DocTree<B>) -> TxResult<R>,
    {
        let a = self.tree::<A>()?;
        let b = self.tree::<B>()?;
        unwrap_tx((&a, &b).transaction(|(ta, tb)| f(&DocTree::wrap(ta), &DocTree::wrap(tb))))
    }

    /// Drops every document of one kind and stores `documents` verbatim,
    /// versions included, in a single batch.
    pub fn replace_all<D: Serialize + HasMeta>(&self, documents: &[D]) -> Result<usize> {
        let tree = self.tree::<D>()?;
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for key in tree.iter().keys() {
            batch.remove(key?);
            removed += 1;
        }
        for doc in documents {
            let body = serde_json::to_vec(doc)
                .with_context(|| format!("encode {} document", D::PREFIX))?;
            batch.insert(doc.meta().id.as_bytes(), body);
        }
        tree.apply_batch(batch)
            .with_context(|| format!("replace {} documents", D::PREFIX))?;
        debug!(
            "Replaced {} {} documents with {}",
            removed,
            D::PREFIX,
            documents.len()
        );
        Ok(documents.len())
    }

    pub fn flush(&self) -> Result<()> {
        let nbytes = self.db.flush().context("flush store")?;
        trace!("Flushed {} bytes", nbytes);
        Ok(())
    }
}

impl Storage for Documents {
    fn setup(&self) -> Result<()> {
        let found = match self.db.get(SCHEMA_KEY)? {
            Some(bytes) => serde_json::from_slice::<u32>(&bytes).context("decode schema version")?,
            None => 0,
        };
        if found > SCHEMA_VERSION {
            return Err(SchemaError {
                found,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        if found < SCHEMA_VERSION {
            info!("Upgrading store schema {} -> {}", found, SCHEMA_VERSION);
            self.db
                .insert(SCHEMA_KEY, serde_json::to_vec(&SCHEMA_VERSION)?)?;
        }
        Ok(())
    }

    fn load<D: DeserializeOwned + Entity>(&self, id: &Id<D>) -> Result<Option<D>> {
        match self.tree::<D>()?.get(id.as_bytes())? {
            Some(bytes) => {
                let doc = serde_json::from_slice(&bytes)
                    .with_context(|| format!("decode {} document", D::PREFIX))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn save<D: Serialize + HasMeta>(&self, document: &mut D) -> Result<()> {
        let version = {
            let doc = &*document;
            self.transaction::<D, _, _>(|t| t.save(doc))?
        };
        document.meta_mut().version = version;
        Ok(())
    }

    fn delete<D: Entity>(&self, id: &Id<D>) -> Result<bool> {
        let prev = self.tree::<D>()?.remove(id.as_bytes())?;
        Ok(prev.is_some())
    }

    fn load_all<D: DeserializeOwned + Entity>(&self) -> Result<Vec<D>> {
        self.scan::<D>()?.collect()
    }
}

impl<'a, D> DocTree<'a, D> {
    fn wrap(tree: &'a TransactionalTree) -> Self {
        DocTree {
            tree,
            phantom: PhantomData,
        }
    }
}

impl<'a, D: Entity> DocTree<'a, D> {
    pub fn load(&self, id: &Id<D>) -> TxResult<Option<D>>
    where
        D: DeserializeOwned,
    {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(abort)?)),
            None => Ok(None),
        }
    }

    /// Writes `document` if its version matches the stored one and returns
    /// the version it was stored under.
    pub fn save(&self, document: &D) -> TxResult<Version>
    where
        D: Serialize + HasMeta,
    {
        let meta = document.meta();
        let stored = match self.tree.get(meta.id.as_bytes())? {
            Some(bytes) => Some(
                serde_json::from_slice::<Stamp>(&bytes)
                    .map_err(abort)?
                    .version,
            ),
            None => None,
        };
        let fresh = match stored {
            None => meta.version.is_new(),
            Some(v) => v == meta.version,
        };
        if !fresh {
            warn!(
                "Stale write to {}: have {:?}, stored {:?}",
                meta.id, meta.version, stored
            );
            return Err(abort(ConcurrencyError));
        }

        let version = meta.version.next();
        let mut json = serde_json::to_value(document).map_err(abort)?;
        if let Some(obj) = json.as_object_mut() {
            obj.insert(
                VERSION_FIELD.to_string(),
                serde_json::to_value(version).map_err(abort)?,
            );
        }
        let body = serde_json::to_vec(&json).map_err(abort)?;
        self.tree.insert(meta.id.as_bytes(), body)?;
        trace!("Saved {} at {:?}", meta.id, version);
        Ok(version)
    }

    pub fn delete(&self, id: &Id<D>) -> TxResult<bool> {
        Ok(self.tree.remove(id.as_bytes())?.is_some())
    }
}

impl DocumentConnectionManager {
    pub fn new(db: sled::Db) -> Self {
        DocumentConnectionManager { db }
    }
}

impl r2d2::ManageConnection for DocumentConnectionManager {
    type Connection = Documents;
    type Error = sled::Error;

    fn connect(&self) -> Result<Documents, sled::Error> {
        Ok(Documents::wrap(self.db.clone()))
    }

    fn is_valid(&self, conn: &mut Documents) -> Result<(), sled::Error> {
        conn.db.size_on_disk().map(|_| ())
    }

    fn has_broken(&self, _: &mut Documents) -> bool {
        false
    }
}
