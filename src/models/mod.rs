pub mod skill;

pub use skill::{AssociatedItem, SkillRecord};
