mod entities;

pub use entities::{Entity, EntityRepository};
