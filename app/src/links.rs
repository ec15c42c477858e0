//! Diff-and-replace of the child rows a product or menu owns.

use std::collections::HashMap;

use anyhow::Result;

use infra::documents::HasMeta;
use infra::ids::Id;

use crate::errors::NotFound;

/// A submitted child row: either an edit of an existing row or a new one.
pub(crate) trait Submitted<L> {
    fn id(&self) -> Option<Id<L>>;
    fn apply(self, link: &mut L);
}

#[derive(Debug)]
pub(crate) struct Plan<L> {
    /// In submission order.
    pub(crate) upserts: Vec<L>,
    pub(crate) removed: Vec<Id<L>>,
}

/// Rows absent from `rows` are removed; every submitted row is upserted.
/// A row naming an id that is not among `existing` is rejected.
pub(crate) fn plan<L, R, F>(existing: Vec<L>, rows: Vec<R>, mut fresh: F) -> Result<Plan<L>>
where
    L: HasMeta,
    R: Submitted<L>,
    F: FnMut() -> L,
{
    let ids = existing.iter().map(|l| l.meta().id).collect::<Vec<_>>();
    let mut existing = existing
        .into_iter()
        .map(|l| (l.meta().id, l))
        .collect::<HashMap<_, _>>();

    let mut upserts = Vec::with_capacity(rows.len());
    for row in rows {
        let mut link = match row.id() {
            Some(id) => existing.remove(&id).ok_or_else(|| NotFound::of(&id))?,
            None => fresh(),
        };
        row.apply(&mut link);
        upserts.push(link);
    }

    let removed = ids
        .into_iter()
        .filter(|id| existing.contains_key(id))
        .collect();

    Ok(Plan { upserts, removed })
}
