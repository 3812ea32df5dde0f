mod types;
mod value;

pub use types::{AutoPrimaryKey, Entity, EntityOptions, Field, SqlType};
pub use value::Value;
