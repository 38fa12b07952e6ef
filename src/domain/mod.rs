pub mod entities;
pub mod normalize;
pub mod value_objects;
