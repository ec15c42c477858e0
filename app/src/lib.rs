use std::sync::Arc;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;

use infra::ids::IdGen;
use infra::persistence::{DocumentConnectionManager, Storage};

pub mod config;
pub mod errors;
pub mod ingredients;
mod links;
pub mod menus;
pub mod nutrition;
pub mod products;
pub mod services;
pub mod specifications;
pub mod transfer;

#[cfg(test)]
mod test;

/// Entry point onto one food database; hands out the per-collection
/// services, all sharing the same pool and id generator.
#[derive(Debug, Clone)]
pub struct FoodManager {
    db: Pool<DocumentConnectionManager>,
    idgen: Arc<IdGen>,
}

impl FoodManager {
    pub fn new(config: &config::Config) -> Result<Self> {
        let db = config.db.build()?;
        Ok(Self::with_pool(db))
    }

    pub fn with_pool(db: Pool<DocumentConnectionManager>) -> Self {
        let idgen = Arc::new(IdGen::new());
        FoodManager { db, idgen }
    }

    pub fn setup(&self) -> Result<()> {
        debug!("Init schema");
        self.db.get()?.setup().context("Setup persistence")?;
        self.specifications().setup()?;
        Ok(())
    }

    pub fn specifications(&self) -> specifications::Specifications {
        specifications::Specifications::new(self.db.clone())
    }

    pub fn ingredients(&self) -> ingredients::Ingredients {
        ingredients::Ingredients::new(self.db.clone(), self.idgen.clone())
    }

    pub fn products(&self) -> products::Products {
        products::Products::new(self.db.clone(), self.idgen.clone())
    }

    pub fn menus(&self) -> menus::Menus {
        menus::Menus::new(self.db.clone(), self.idgen.clone())
    }

    pub fn transfer(&self) -> transfer::Transfer {
        transfer::Transfer::new(self.db.clone())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.get()?.flush()
    }
}
