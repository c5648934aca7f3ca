pub mod document;
pub mod models;
pub mod state_repository;
pub mod watchlist_repository;

pub use document::JsonDocument;
pub use models::{WatchAddress, WatchStateDocument, WatchlistDocument, normalize_address};
pub use state_repository::WatchStateRepository;
pub use watchlist_repository::WatchlistRepository;
