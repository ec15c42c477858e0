use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fallible_iterator::FallibleIterator;
use log::*;
use r2d2::Pool;

use infra::documents::HasMeta;
use infra::ids::{Id, IdGen};
use infra::persistence::{DocumentConnectionManager, Documents, Storage};

use crate::errors::{check_quantity, DuplicateName, NotFound};
use crate::ingredients::Ingredient;
use crate::links;
use crate::nutrition::{ProductTotals, Snapshot};
use crate::services::{Commandable, Queryable, Request};

mod models;

pub use self::models::{LinkForm, Product, ProductDetails, ProductForm, ProductIngredient};

#[derive(Debug, Clone)]
pub struct Products {
    db: Pool<DocumentConnectionManager>,
    idgen: Arc<IdGen>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListProducts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProduct(pub Id<Product>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductLinks(pub Id<Product>);

/// Saves a product together with its full ingredient list. Links missing
/// from `ingredients` are removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveProduct {
    pub product: ProductForm,
    pub ingredients: Vec<LinkForm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteProduct(pub Id<Product>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductNutrition(pub Id<Product>);

/// Every product alongside its totals, in listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductTable;

impl Products {
    pub fn new(db: Pool<DocumentConnectionManager>, idgen: Arc<IdGen>) -> Self {
        Products { db, idgen }
    }
}

pub(crate) fn links_of(docs: &Documents, product_id: Id<Product>) -> Result<Vec<ProductIngredient>> {
    docs.scan::<ProductIngredient>()?
        .filter(|l| Ok(l.product_id == product_id))
        .collect()
}

impl Request for ListProducts {
    type Resp = Vec<Product>;
}

impl Request for LoadProduct {
    type Resp = Option<ProductDetails>;
}

impl Request for ProductLinks {
    type Resp = Vec<ProductIngredient>;
}

impl Request for SaveProduct {
    type Resp = ProductDetails;
}

impl Request for DeleteProduct {
    type Resp = bool;
}

impl Request for ProductNutrition {
    type Resp = Option<ProductTotals>;
}

impl Request for ProductTable {
    type Resp = Vec<(Product, ProductTotals)>;
}

impl Queryable<ListProducts> for Products {
    fn query(&self, _: ListProducts) -> Result<Vec<Product>> {
        self.db.get()?.load_all().context("load products")
    }
}

impl Queryable<LoadProduct> for Products {
    fn query(&self, req: LoadProduct) -> Result<Option<ProductDetails>> {
        let LoadProduct(id) = req;
        let docs = self.db.get()?;
        let product = match docs.load::<Product>(&id).context("load product")? {
            Some(product) => product,
            None => return Ok(None),
        };
        let ingredients = links_of(&docs, id)?;
        Ok(Some(ProductDetails {
            product,
            ingredients,
        }))
    }
}

impl Queryable<ProductLinks> for Products {
    fn query(&self, req: ProductLinks) -> Result<Vec<ProductIngredient>> {
        let ProductLinks(id) = req;
        links_of(&*self.db.get()?, id)
    }
}

impl Queryable<ProductNutrition> for Products {
    fn query(&self, req: ProductNutrition) -> Result<Option<ProductTotals>> {
        let ProductNutrition(id) = req;
        let snapshot = Snapshot::load(&*self.db.get()?)?;
        Ok(snapshot.catalogue().product_totals(&id))
    }
}

impl Queryable<ProductTable> for Products {
    fn query(&self, _: ProductTable) -> Result<Vec<(Product, ProductTotals)>> {
        let snapshot = Snapshot::load(&*self.db.get()?)?;
        let catalogue = snapshot.catalogue();
        let table = snapshot
            .products
            .iter()
            .filter_map(|p| catalogue.product_totals(&p.id()).map(|t| (p.clone(), t)))
            .collect();
        Ok(table)
    }
}

impl Commandable<SaveProduct> for Products {
    fn execute(&self, req: SaveProduct) -> Result<ProductDetails> {
        let SaveProduct {
            product: form,
            ingredients: rows,
        } = req;
        let name = form.name.trim();
        if name.is_empty() {
            bail!("Product name must not be empty");
        }
        check_quantity("cooked weight", form.cooked_weight)?;
        for row in rows.iter() {
            check_quantity("ingredient quantity", row.quantity)?;
        }

        let docs = self.db.get()?;
        let all = docs.load_all::<Product>().context("load products")?;
        if all
            .iter()
            .any(|p| Some(p.id()) != form.id && p.name.trim().eq_ignore_ascii_case(name))
        {
            return Err(DuplicateName::of::<Product>(name).into());
        }

        let mut product = match form.id {
            Some(id) => all
                .into_iter()
                .find(|p| p.id() == id)
                .ok_or_else(|| NotFound::of(&id))?,
            None => Product::new(self.idgen.generate(), name, form.cooked_weight),
        };
        product.name = name.to_string();
        product.cooked_weight = form.cooked_weight;

        for row in rows.iter() {
            if docs
                .load::<Ingredient>(&row.ingredient_id)
                .context("load ingredient")?
                .is_none()
            {
                return Err(NotFound::of(&row.ingredient_id).into());
            }
        }

        let product_id = product.id();
        let existing = links_of(&docs, product_id)?;
        let links::Plan {
            mut upserts,
            removed,
        } = links::plan(existing, rows, || {
            ProductIngredient::new(self.idgen.generate(), product_id, Id::default(), 0.0)
        })?;

        let (version, versions) = docs.transaction2::<Product, ProductIngredient, _, _>(
            |products, links| {
                let version = products.save(&product)?;
                let mut versions = Vec::with_capacity(upserts.len());
                for link in upserts.iter() {
                    versions.push(links.save(link)?);
                }
                for id in removed.iter() {
                    links.delete(id)?;
                }
                Ok((version, versions))
            },
        )?;
        product.meta_mut().version = version;
        for (link, version) in upserts.iter_mut().zip(versions) {
            link.meta_mut().version = version;
        }
        info!(
            "Saved product {} ({}) with {} ingredients, removed {}",
            product.id(),
            product.name,
            upserts.len(),
            removed.len()
        );

        Ok(ProductDetails {
            product,
            ingredients: upserts,
        })
    }
}

impl Commandable<DeleteProduct> for Products {
    fn execute(&self, req: DeleteProduct) -> Result<bool> {
        let DeleteProduct(id) = req;
        let docs = self.db.get()?;
        let links = links_of(&docs, id)?;
        // Menu items that name this product stay; aggregation skips them.
        let existed = docs.transaction2::<Product, ProductIngredient, _, _>(|products, tree| {
            let existed = products.delete(&id)?;
            for link in links.iter() {
                tree.delete(&link.id())?;
            }
            Ok(existed)
        })?;
        info!(
            "Deleted product {} (existed: {}) and {} links",
            id,
            existed,
            links.len()
        );
        Ok(existed)
    }
}
