//! Data model shared by every stage of a harvest
//!
//! Categories, classification verdicts, extracted entities and session status.

mod category;
mod classification;
mod entity;
mod session;

pub use category::{CategoryNode, CategoryType};
pub use classification::{ClassificationResult, ConfidenceSource};
pub use entity::{parse_price, EntityBatch, ExtractedEntity, CATEGORIES, PRODUCTS, SERVICES};
pub use session::{generate_session_id, SessionStatus};
