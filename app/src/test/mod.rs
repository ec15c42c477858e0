//! Guarded with `#[cfg(test)]` from `lib.rs`

use anyhow::Result;
use maplit::btreemap;

use crate::ingredients::{Ingredient, IngredientForm, ListIngredients, SaveIngredient};
use crate::menus::{ConsolidateMenu, ItemForm, ListMenus, MenuForm, MenuItem, SaveMenu, SummariseMenu};
use crate::products::{
    DeleteProduct, LinkForm, ListProducts, ProductForm, ProductIngredient, ProductLinks,
    SaveProduct,
};
use crate::services::{Commandable, Queryable};
use crate::specifications::{AddSpecification, ListSpecifications, NewSpecification, SpecId};
use crate::transfer::{ExportDatabase, ImportDatabase};
use crate::FoodManager;
use infra::persistence::Storage;


fn manager(name: &str) -> Result<FoodManager> {
    let fm = FoodManager::with_pool(junk_drawer::pool(name)?);
    fm.setup()?;
    Ok(fm)
}

fn ingredient(fm: &FoodManager, name: &str, calorie: f64, protein: f64) -> Result<Ingredient> {
    fm.ingredients().execute(SaveIngredient(
        IngredientForm::new(name)
            .with("calorie", calorie)
            .with("protein", protein),
    ))
}

#[test]
fn runtime_specification_flows_through_menu_views() -> Result<()> {
    let fm = manager("runtime_specification_flows_through_menu_views")?;
    let iron = fm
        .specifications()
        .execute(AddSpecification(NewSpecification::number("Iron")))?;

    let spinach = fm.ingredients().execute(SaveIngredient(
        IngredientForm::new("Spinach")
            .with("calorie", 23.0)
            .with(iron.id.as_str(), 2.7),
    ))?;
    let rice = ingredient(&fm, "Rice", 130.0, 2.0)?;

    let palak = fm.products().execute(SaveProduct {
        product: ProductForm::new("Palak rice", 400.0),
        ingredients: vec![
            LinkForm::new(spinach.id(), 100.0),
            LinkForm::new(rice.id(), 200.0),
        ],
    })?;
    let plain = fm.products().execute(SaveProduct {
        product: ProductForm::new("Plain rice", 250.0),
        ingredients: vec![LinkForm::new(rice.id(), 100.0)],
    })?;

    let menu = fm.menus().execute(SaveMenu {
        menu: MenuForm::new("Lunch", 2),
        items: vec![
            ItemForm::new(palak.product.id(), 1),
            ItemForm::new(plain.product.id(), 2),
        ],
    })?;

    let consolidated = fm
        .menus()
        .query(ConsolidateMenu(menu.menu.id()))?
        .expect("consolidated");
    let quantities = consolidated
        .rows
        .iter()
        .map(|r| (r.name.as_str(), r.quantity))
        .collect::<Vec<_>>();
    assert_eq!(quantities, vec![("Spinach", 100.0), ("Rice", 400.0)]);
    assert_eq!(consolidated.total.nutrients[&iron.id], 2.7);
    assert_eq!(consolidated.rows[1].nutrients[&iron.id], 0.0);

    let summary = fm
        .menus()
        .query(SummariseMenu(menu.menu.id()))?
        .expect("summary");
    assert_eq!(summary.cooked_weight, 900.0);
    assert_eq!(summary.per_set[&SpecId::new("calorie")], 23.0 + 520.0);
    assert_eq!(summary.nutrients[&SpecId::new("calorie")], 2.0 * (23.0 + 520.0));
    assert_eq!(summary.nutrients[&iron.id], 5.4);
    Ok(())
}

#[test]
fn deleting_a_product_cascades_and_drops_it_from_menus() -> Result<()> {
    let fm = manager("deleting_a_product_cascades")?;
    let rice = ingredient(&fm, "Rice", 130.0, 2.0)?;
    let dal = ingredient(&fm, "Dal", 350.0, 24.0)?;
    let khichdi = fm.products().execute(SaveProduct {
        product: ProductForm::new("Khichdi", 300.0),
        ingredients: vec![LinkForm::new(rice.id(), 50.0), LinkForm::new(dal.id(), 30.0)],
    })?;
    let menu = fm.menus().execute(SaveMenu {
        menu: MenuForm::new("Supper", 1),
        items: vec![ItemForm::new(khichdi.product.id(), 1)],
    })?;

    fm.products().execute(DeleteProduct(khichdi.product.id()))?;

    let docs = fm.db.get()?;
    let orphans = docs
        .load_all::<ProductIngredient>()?
        .into_iter()
        .filter(|l| l.product_id == khichdi.product.id())
        .count();
    assert_eq!(orphans, 0);
    assert!(fm
        .products()
        .query(ProductLinks(khichdi.product.id()))?
        .is_empty());

    let summary = fm
        .menus()
        .query(SummariseMenu(menu.menu.id()))?
        .expect("summary");
    assert_eq!(summary.cooked_weight, 0.0);
    assert!(summary.nutrients.values().all(|v| *v == 0.0));
    // The item row itself stays put.
    assert_eq!(docs.load_all::<MenuItem>()?.len(), 1);
    Ok(())
}

#[test]
fn deleting_an_ingredient_leaves_links_dangling() -> Result<()> {
    let fm = manager("deleting_an_ingredient_leaves_links")?;
    let rice = ingredient(&fm, "Rice", 130.0, 2.0)?;
    let dal = ingredient(&fm, "Dal", 350.0, 24.0)?;
    let khichdi = fm.products().execute(SaveProduct {
        product: ProductForm::new("Khichdi", 300.0),
        ingredients: vec![LinkForm::new(rice.id(), 50.0), LinkForm::new(dal.id(), 30.0)],
    })?;

    fm.ingredients()
        .execute(crate::ingredients::DeleteIngredient(dal.id()))?;

    assert_eq!(
        fm.products()
            .query(ProductLinks(khichdi.product.id()))?
            .len(),
        2
    );
    let totals = fm
        .products()
        .query(crate::products::ProductNutrition(khichdi.product.id()))?
        .expect("totals");
    assert_eq!(totals.nutrients[&SpecId::new("calorie")], 65.0);
    assert_eq!(totals.raw_weight, 80.0);
    Ok(())
}

#[test]
fn export_then_import_reproduces_every_collection() -> Result<()> {
    let source = manager("export_then_import_source")?;
    source
        .specifications()
        .execute(AddSpecification(NewSpecification::number("Iron")))?;
    let rice = ingredient(&source, "Rice", 130.0, 2.0)?;
    let bowl = source.products().execute(SaveProduct {
        product: ProductForm::new("Rice bowl", 250.0),
        ingredients: vec![LinkForm::new(rice.id(), 100.0)],
    })?;
    source.menus().execute(SaveMenu {
        menu: MenuForm::new("Lunch", 3),
        items: vec![ItemForm::new(bowl.product.id(), 2)],
    })?;

    let exported = source.transfer().query(ExportDatabase)?;

    let target = manager("export_then_import_target")?;
    ingredient(&target, "Leftover", 1.0, 1.0)?;
    let report = target
        .transfer()
        .execute(ImportDatabase(exported.to_string()))?;

    assert_eq!(
        report.imported,
        btreemap! {
            "specifications".to_string() => 9,
            "ingredients".to_string() => 1,
            "products".to_string() => 1,
            "productIngredients".to_string() => 1,
            "menus".to_string() => 1,
            "menuItems".to_string() => 1,
        }
    );
    assert_eq!(target.transfer().query(ExportDatabase)?, exported);
    assert_eq!(
        target.ingredients().query(ListIngredients)?,
        source.ingredients().query(ListIngredients)?
    );
    assert_eq!(
        target.products().query(ListProducts)?,
        source.products().query(ListProducts)?
    );
    assert_eq!(
        target.menus().query(ListMenus)?,
        source.menus().query(ListMenus)?
    );
    assert_eq!(
        target.specifications().query(ListSpecifications)?,
        source.specifications().query(ListSpecifications)?
    );
    Ok(())
}

#[test]
fn imported_documents_can_be_edited() -> Result<()> {
    let source = manager("imported_documents_can_be_edited_source")?;
    let rice = ingredient(&source, "Rice", 130.0, 2.0)?;
    let exported = source.transfer().query(ExportDatabase)?;

    let target = manager("imported_documents_can_be_edited_target")?;
    target
        .transfer()
        .execute(ImportDatabase(exported.to_string()))?;
    let edited = target.ingredients().execute(SaveIngredient(
        IngredientForm::editing(&rice).with("calorie", 129.0),
    ))?;

    assert_eq!(edited.value(&SpecId::new("calorie")), 129.0);
    Ok(())
}
