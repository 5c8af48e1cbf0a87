//! HTML helpers shared by discovery, classification and extraction

mod denoise;
mod hint;
mod links;

pub use denoise::{denoise, denoise_and_truncate, truncate_chars, visible_text_chars};
pub use hint::PageTypeHint;
pub use links::{absolutize, is_navigable, to_site_relative};
