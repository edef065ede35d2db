pub mod group_ctx;
pub mod group_scraper;

pub use group_ctx::GroupCtx;
pub use group_scraper::GroupScraper;
