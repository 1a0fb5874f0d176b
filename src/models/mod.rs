//! Entity records exchanged between the service, store, and callers.

mod product;

pub use product::{NewProduct, Product};
