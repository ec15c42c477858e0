use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::*;
use r2d2::Pool;

use infra::ids::{Id, IdGen};
use infra::persistence::{DocumentConnectionManager, Storage};

use crate::errors::NotFound;
use crate::services::{Commandable, Queryable, Request};

mod models;

pub use self::models::{Ingredient, IngredientForm, SpecValue};

#[derive(Debug, Clone)]
pub struct Ingredients {
    db: Pool<DocumentConnectionManager>,
    idgen: Arc<IdGen>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListIngredients;

/// Case-insensitive substring match on the ingredient name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIngredients(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadIngredient(pub Id<Ingredient>);

#[derive(Debug, Clone, PartialEq)]
pub struct SaveIngredient(pub IngredientForm);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteIngredient(pub Id<Ingredient>);

impl Ingredients {
    pub fn new(db: Pool<DocumentConnectionManager>, idgen: Arc<IdGen>) -> Self {
        Ingredients { db, idgen }
    }
}

impl Request for ListIngredients {
    type Resp = Vec<Ingredient>;
}

impl Request for SearchIngredients {
    type Resp = Vec<Ingredient>;
}

impl Request for LoadIngredient {
    type Resp = Option<Ingredient>;
}

impl Request for SaveIngredient {
    type Resp = Ingredient;
}

impl Request for DeleteIngredient {
    type Resp = bool;
}

impl Queryable<ListIngredients> for Ingredients {
    fn query(&self, _: ListIngredients) -> Result<Vec<Ingredient>> {
        self.db.get()?.load_all().context("load ingredients")
    }
}

impl Queryable<SearchIngredients> for Ingredients {
    fn query(&self, req: SearchIngredients) -> Result<Vec<Ingredient>> {
        let SearchIngredients(term) = req;
        let mut all = self.query(ListIngredients)?;
        all.retain(|i| i.matches(&term));
        debug!("Search {:?} matched {} ingredients", term, all.len());
        Ok(all)
    }
}

impl Queryable<LoadIngredient> for Ingredients {
    fn query(&self, req: LoadIngredient) -> Result<Option<Ingredient>> {
        let LoadIngredient(id) = req;
        let res = self.db.get()?.load(&id)?;
        debug!("Load {} -> {:?}", id, res);
        Ok(res)
    }
}

impl Commandable<SaveIngredient> for Ingredients {
    fn execute(&self, req: SaveIngredient) -> Result<Ingredient> {
        let SaveIngredient(form) = req;
        if form.name.trim().is_empty() {
            bail!("Ingredient name must not be empty");
        }

        let docs = self.db.get()?;
        let mut ingredient = match form.id {
            Some(id) => docs
                .load::<Ingredient>(&id)
                .context("load ingredient")?
                .ok_or_else(|| NotFound::of(&id))?,
            None => Ingredient::new(self.idgen.generate(), &form.name),
        };
        ingredient.name = form.name;
        ingredient.nutrients = form.nutrients;
        docs.save(&mut ingredient).context("save ingredient")?;
        debug!("Saved {:?}", ingredient);

        Ok(ingredient)
    }
}

impl Commandable<DeleteIngredient> for Ingredients {
    fn execute(&self, req: DeleteIngredient) -> Result<bool> {
        let DeleteIngredient(id) = req;
        // Links that still point here are skipped during aggregation.
        let existed = self.db.get()?.delete(&id).context("delete ingredient")?;
        info!("Deleted ingredient {} (existed: {})", id, existed);
        Ok(existed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::junk_drawer;

    fn ingredients(name: &str) -> Result<Ingredients> {
        Ok(Ingredients::new(
            junk_drawer::pool(name)?,
            Arc::new(IdGen::new()),
        ))
    }

    #[test]
    fn save_then_update() -> Result<()> {
        let ingredients = ingredients("ingredients_save_then_update")?;

        let rice = ingredients.execute(SaveIngredient(
            IngredientForm::new("Rice").with("calorie", 130.0),
        ))?;
        let edited = ingredients.execute(SaveIngredient(
            IngredientForm::editing(&rice).with("calorie", 129.0),
        ))?;

        assert_eq!(edited.id(), rice.id());
        let loaded = ingredients
            .query(LoadIngredient(rice.id()))?
            .expect("stored");
        assert_eq!(loaded.value(&"calorie".into()), 129.0);
        assert_eq!(ingredients.query(ListIngredients)?.len(), 1);
        Ok(())
    }

    #[test]
    fn updating_missing_ingredient_is_not_found() -> Result<()> {
        let ingredients = ingredients("updating_missing_ingredient")?;
        let mut form = IngredientForm::new("Ghost");
        form.id = Some(rand::random());

        let err = ingredients
            .execute(SaveIngredient(form))
            .expect_err("missing");

        assert!(err.downcast_ref::<NotFound>().is_some(), "{:?}", err);
        Ok(())
    }

    #[test]
    fn search_filters_by_name() -> Result<()> {
        let ingredients = ingredients("search_filters_by_name")?;
        for name in &["Brown Rice", "Rice Flour", "Oats"] {
            ingredients.execute(SaveIngredient(IngredientForm::new(name)))?;
        }

        let found = ingredients.query(SearchIngredients("rice".to_string()))?;

        let names = found.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Brown Rice", "Rice Flour"]);
        Ok(())
    }

    #[test]
    fn delete_reports_whether_present() -> Result<()> {
        let ingredients = ingredients("delete_reports_whether_present")?;
        let oats = ingredients.execute(SaveIngredient(IngredientForm::new("Oats")))?;

        assert!(ingredients.execute(DeleteIngredient(oats.id()))?);
        assert!(!ingredients.execute(DeleteIngredient(oats.id()))?);
        assert_eq!(ingredients.query(LoadIngredient(oats.id()))?, None);
        Ok(())
    }
}
