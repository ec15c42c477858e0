use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fallible_iterator::FallibleIterator;
use log::*;
use r2d2::Pool;

use infra::documents::HasMeta;
use infra::ids::{Id, IdGen};
use infra::persistence::{DocumentConnectionManager, Documents, Storage};

use crate::errors::{DuplicateName, NotFound};
use crate::links;
use crate::nutrition::{Consolidated, ItemBreakdown, MenuSummary, Snapshot};
use crate::products::Product;
use crate::services::{Commandable, Queryable, Request};

mod models;

pub use self::models::{ItemForm, Menu, MenuDetails, MenuForm, MenuItem};

#[derive(Debug, Clone)]
pub struct Menus {
    db: Pool<DocumentConnectionManager>,
    idgen: Arc<IdGen>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMenus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMenu(pub Id<Menu>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItems(pub Id<Menu>);

/// Saves a menu together with its full item list. Rows without a product
/// are dropped; items missing from `items` are removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveMenu {
    pub menu: MenuForm,
    pub items: Vec<ItemForm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMenu(pub Id<Menu>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummariseMenu(pub Id<Menu>);

/// The individual view: one breakdown per menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuBreakdown(pub Id<Menu>);

/// The consolidated view: one row per distinct ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidateMenu(pub Id<Menu>);

impl Menus {
    pub fn new(db: Pool<DocumentConnectionManager>, idgen: Arc<IdGen>) -> Self {
        Menus { db, idgen }
    }

    fn with_snapshot<R, F>(&self, id: Id<Menu>, f: F) -> Result<Option<R>>
    where
        F: FnOnce(&Snapshot, &Menu, &[MenuItem]) -> R,
    {
        let docs = self.db.get()?;
        let menu = match docs.load::<Menu>(&id).context("load menu")? {
            Some(menu) => menu,
            None => return Ok(None),
        };
        let items = items_of(&docs, id)?;
        let snapshot = Snapshot::load(&docs)?;
        Ok(Some(f(&snapshot, &menu, &items)))
    }
}

pub(crate) fn items_of(docs: &Documents, menu_id: Id<Menu>) -> Result<Vec<MenuItem>> {
    docs.scan::<MenuItem>()?
        .filter(|i| Ok(i.menu_id == menu_id))
        .collect()
}

impl Request for ListMenus {
    type Resp = Vec<Menu>;
}

impl Request for LoadMenu {
    type Resp = Option<MenuDetails>;
}

impl Request for MenuItems {
    type Resp = Vec<MenuItem>;
}

impl Request for SaveMenu {
    type Resp = MenuDetails;
}

impl Request for DeleteMenu {
    type Resp = bool;
}

impl Request for SummariseMenu {
    type Resp = Option<MenuSummary>;
}

impl Request for MenuBreakdown {
    type Resp = Option<Vec<ItemBreakdown>>;
}

impl Request for ConsolidateMenu {
    type Resp = Option<Consolidated>;
}

impl Queryable<ListMenus> for Menus {
    fn query(&self, _: ListMenus) -> Result<Vec<Menu>> {
        self.db.get()?.load_all().context("load menus")
    }
}

impl Queryable<LoadMenu> for Menus {
    fn query(&self, req: LoadMenu) -> Result<Option<MenuDetails>> {
        let LoadMenu(id) = req;
        let docs = self.db.get()?;
        let menu = match docs.load::<Menu>(&id).context("load menu")? {
            Some(menu) => menu,
            None => return Ok(None),
        };
        let items = items_of(&docs, id)?;
        Ok(Some(MenuDetails { menu, items }))
    }
}

impl Queryable<MenuItems> for Menus {
    fn query(&self, req: MenuItems) -> Result<Vec<MenuItem>> {
        let MenuItems(id) = req;
        items_of(&*self.db.get()?, id)
    }
}

impl Queryable<SummariseMenu> for Menus {
    fn query(&self, req: SummariseMenu) -> Result<Option<MenuSummary>> {
        let SummariseMenu(id) = req;
        self.with_snapshot(id, |snapshot, menu, items| {
            snapshot.catalogue().menu_summary(menu, items)
        })
    }
}

impl Queryable<MenuBreakdown> for Menus {
    fn query(&self, req: MenuBreakdown) -> Result<Option<Vec<ItemBreakdown>>> {
        let MenuBreakdown(id) = req;
        self.with_snapshot(id, |snapshot, _, items| snapshot.catalogue().breakdown(items))
    }
}

impl Queryable<ConsolidateMenu> for Menus {
    fn query(&self, req: ConsolidateMenu) -> Result<Option<Consolidated>> {
        let ConsolidateMenu(id) = req;
        self.with_snapshot(id, |snapshot, _, items| {
            snapshot.catalogue().consolidated(items)
        })
    }
}

impl Commandable<SaveMenu> for Menus {
    fn execute(&self, req: SaveMenu) -> Result<MenuDetails> {
        let SaveMenu { menu: form, items } = req;
        let name = form.name.trim();
        if name.is_empty() {
            bail!("Menu name must not be empty");
        }
        let count = form.count.max(1);
        let rows = items
            .into_iter()
            .filter(|row| row.product_id.is_some())
            .collect::<Vec<_>>();

        let docs = self.db.get()?;
        let all = docs.load_all::<Menu>().context("load menus")?;
        if all
            .iter()
            .any(|m| Some(m.id()) != form.id && m.name.trim().eq_ignore_ascii_case(name))
        {
            return Err(DuplicateName::of::<Menu>(name).into());
        }

        let mut menu = match form.id {
            Some(id) => all
                .into_iter()
                .find(|m| m.id() == id)
                .ok_or_else(|| NotFound::of(&id))?,
            None => Menu::new(self.idgen.generate(), name, count),
        };
        menu.name = name.to_string();
        menu.count = count;

        for product_id in rows.iter().filter_map(|row| row.product_id) {
            if docs
                .load::<Product>(&product_id)
                .context("load product")?
                .is_none()
            {
                return Err(NotFound::of(&product_id).into());
            }
        }

        let menu_id = menu.id();
        let existing = items_of(&docs, menu_id)?;
        let links::Plan {
            mut upserts,
            removed,
        } = links::plan(existing, rows, || {
            MenuItem::new(self.idgen.generate(), menu_id, Id::default(), 1)
        })?;

        let (version, versions) =
            docs.transaction2::<Menu, MenuItem, _, _>(|menus, tree| {
                let version = menus.save(&menu)?;
                let mut versions = Vec::with_capacity(upserts.len());
                for item in upserts.iter() {
                    versions.push(tree.save(item)?);
                }
                for id in removed.iter() {
                    tree.delete(id)?;
                }
                Ok((version, versions))
            })?;
        menu.meta_mut().version = version;
        for (item, version) in upserts.iter_mut().zip(versions) {
            item.meta_mut().version = version;
        }
        info!(
            "Saved menu {} ({}) x{} with {} items, removed {}",
            menu.id(),
            menu.name,
            menu.count,
            upserts.len(),
            removed.len()
        );

        Ok(MenuDetails {
            menu,
            items: upserts,
        })
    }
}

impl Commandable<DeleteMenu> for Menus {
    fn execute(&self, req: DeleteMenu) -> Result<bool> {
        let DeleteMenu(id) = req;
        let docs = self.db.get()?;
        let items = items_of(&docs, id)?;
        let existed = docs.transaction2::<Menu, MenuItem, _, _>(|menus, tree| {
            let existed = menus.delete(&id)?;
            for item in items.iter() {
                tree.delete(&item.id())?;
            }
            Ok(existed)
        })?;
        info!(
            "Deleted menu {} (existed: {}) and {} items",
            id,
            existed,
            items.len()
        );
        Ok(existed)
    }
}
