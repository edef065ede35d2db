pub mod account;
pub mod listing;
pub mod post;
pub mod report;

pub use account::{Credentials, GroupSyncStats, GroupTarget, SessionRecord, UserAccount};
pub use listing::{ExtractedListing, ListingFields};
pub use post::{RawPost, RenderedContent, RenderedItem};
pub use report::{
    CycleFailure, CycleReport, CycleTotals, FailureKind, GroupOutcome, PlatformReport,
    SessionOutcome, UserReport,
};
