pub mod model;
pub mod repo;

#[cfg(test)]
pub mod memory;

pub use model::{NewUser, UniqueField, User};
pub use repo::{PgUserStore, StoreError, UserStore};
