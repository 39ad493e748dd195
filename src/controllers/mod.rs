//! Resource controllers: stateless, request-scoped operations over the
//! shared store. Generic CRUD comes from `store::Resource`; each module
//! here adds only the operations specific to its resource.

pub mod cards;
pub mod collections;
pub mod scores;
pub mod users;
