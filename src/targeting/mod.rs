//! Request targeting: single conditions and the rules built from them.
mod condition;
mod rules;

pub use condition::MalformedCondition;
