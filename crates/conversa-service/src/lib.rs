//! Conversation Service (§4.7): the per-message pipeline that ties the
//! Session Store, Intent Router, Flow Engine, Persistence and Preference
//! Enricher together behind one entry point, `handle_inbound`. One shared
//! pipeline function drives every channel — normalizers only shape the
//! inbound message, adapters only format the outbound one.

pub mod error;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::ConversationService;
