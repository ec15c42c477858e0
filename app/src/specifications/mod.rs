use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::*;
use r2d2::Pool;

use infra::persistence::{DocumentConnectionManager, Documents, Storage};

use crate::errors::NotFound;
use crate::services::{Commandable, Queryable, Request};

mod models;

pub use self::models::{
    defaults, NewSpecification, SpecId, SpecKind, Specification, SpecificationList, NAME_SPEC,
};

/// The ordered registry of nutrition columns.
#[derive(Debug, Clone)]
pub struct Specifications {
    db: Pool<DocumentConnectionManager>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSpecifications;

#[derive(Debug, Clone, PartialEq)]
pub struct AddSpecification(pub NewSpecification);

#[derive(Debug, Clone, PartialEq)]
pub struct SaveSpecification(pub Specification);

impl Specifications {
    pub fn new(db: Pool<DocumentConnectionManager>) -> Self {
        Specifications { db }
    }

    pub fn setup(&self) -> Result<()> {
        let list = load_or_seed(&*self.db.get()?)?;
        debug!("Registry holds {} specifications", list.specifications.len());
        Ok(())
    }
}

/// Current registry in display order, seeding the defaults into an empty
/// store first.
pub(crate) fn current(docs: &Documents) -> Result<Vec<Specification>> {
    let list = load_or_seed(docs)?;
    Ok(models::sorted(&list.specifications))
}

/// Current registry in display order without writing anything; an empty
/// store reads as the defaults.
pub(crate) fn peek(docs: &Documents) -> Result<Vec<Specification>> {
    let list = docs
        .load::<SpecificationList>(&SpecificationList::id())
        .context("load specifications")?;
    match list {
        Some(list) if !list.specifications.is_empty() => Ok(models::sorted(&list.specifications)),
        _ => Ok(defaults()),
    }
}

fn load_or_seed(docs: &Documents) -> Result<SpecificationList> {
    let id = SpecificationList::id();
    match docs
        .load::<SpecificationList>(&id)
        .context("load specifications")?
    {
        Some(list) if !list.specifications.is_empty() => Ok(list),
        existing => {
            let mut list = existing.unwrap_or_else(|| SpecificationList::new(id));
            list.specifications = defaults();
            info!(
                "Seeding {} default specifications",
                list.specifications.len()
            );
            docs.save(&mut list).context("seed specifications")?;
            Ok(list)
        }
    }
}

fn unique_id(list: &SpecificationList, mut millis: i64) -> SpecId {
    loop {
        let id = SpecId::new(format!("spec_{}", millis));
        if !list.contains(&id) {
            return id;
        }
        millis += 1;
    }
}

impl Request for ListSpecifications {
    type Resp = Vec<Specification>;
}

impl Request for AddSpecification {
    type Resp = Specification;
}

impl Request for SaveSpecification {
    type Resp = ();
}

impl Queryable<ListSpecifications> for Specifications {
    fn query(&self, _: ListSpecifications) -> Result<Vec<Specification>> {
        current(&*self.db.get()?)
    }
}

impl Commandable<AddSpecification> for Specifications {
    fn execute(&self, req: AddSpecification) -> Result<Specification> {
        let AddSpecification(new) = req;
        if new.label.trim().is_empty() {
            bail!("Specification label must not be empty");
        }

        let docs = self.db.get()?;
        let mut list = load_or_seed(&*docs)?;
        let spec = Specification {
            id: unique_id(&list, Utc::now().timestamp_millis()),
            label: new.label,
            kind: new.kind,
            unit: new.unit,
            order: Some(list.specifications.len() as u32),
        };
        list.specifications.push(spec.clone());
        docs.save(&mut list).context("save specifications")?;
        info!("Added specification {} ({})", spec.id, spec.label);

        Ok(spec)
    }
}

impl Commandable<SaveSpecification> for Specifications {
    fn execute(&self, req: SaveSpecification) -> Result<()> {
        let SaveSpecification(spec) = req;
        let docs = self.db.get()?;
        let mut list = load_or_seed(&*docs)?;
        let slot = list
            .specifications
            .iter_mut()
            .find(|s| s.id == spec.id)
            .ok_or_else(|| NotFound {
                kind: "specification",
                id: spec.id.to_string(),
            })?;
        let order = spec.order.or(slot.order);
        *slot = Specification { order, ..spec };
        docs.save(&mut list).context("save specifications")?;
        Ok(())
    }
}
