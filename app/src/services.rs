//! Every service (`Specifications`, `Ingredients`, `Products`, `Menus`,
//! `Transfer`) takes plain request structs such as `ListIngredients` or
//! `SaveMenu`. Reads go through `Queryable`, writes through `Commandable`.

use anyhow::Result;

pub trait Request {
    type Resp;
}

pub trait Queryable<Req>
where
    Req: Request,
{
    fn query(&self, req: Req) -> Result<Req::Resp>;
}

pub trait Commandable<Req>
where
    Req: Request,
{
    fn execute(&self, req: Req) -> Result<Req::Resp>;
}
