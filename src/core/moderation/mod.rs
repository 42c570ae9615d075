// Core moderation module - the decision engine and its stateful sub-protocols.

pub mod approval;
pub mod format;
pub mod gates;
pub mod moderation_models;
pub mod moderation_policy;
pub mod moderation_service;

pub use approval::*;
pub use gates::*;
pub use moderation_models::*;
pub use moderation_policy::*;
pub use moderation_service::*;
