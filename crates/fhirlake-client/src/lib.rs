pub mod auth;
pub mod error;
pub mod mirror;
pub mod paging;
pub mod retry;
pub mod source;

pub use auth::AuthHeader;
pub use error::{ClientError, Result};
pub use mirror::{MirrorClient, UploadOutcome};
pub use paging::{next_page_token, next_pages_param};
pub use retry::RetryPolicy;
pub use source::SourceClient;
