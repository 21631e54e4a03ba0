//! History of crop analysis lookups ("popups").
//!
//! A bounded, most-recent-first list the user can reorder, prune and clear.
//! Independent of the geo cache: the same lookup may live in both, neither,
//! or one of them.

mod popup;
mod stack;
mod stats;

pub use popup::{NewPopup, PopupEntry};
pub use stack::{HistoryOptions, HistoryStack, MAX_POPUPS, POPUP_EXPIRY_DAYS, POPUP_STACK_KEY};
pub use stats::StackStats;
