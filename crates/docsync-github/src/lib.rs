pub mod api;
pub mod checkout;
pub mod content;
pub mod raw;
pub mod release;
pub mod repo_fetcher;
pub mod snapshot;
pub mod tarball;
pub mod tree;

pub use api::GitHubApi;
pub use checkout::{Checkout, CheckoutRequest, GitSparseCheckout, TarballCheckout};
pub use raw::RawClient;
pub use release::ReleaseResolver;
pub use repo_fetcher::RepoFetcher;
pub use snapshot::{BaseCommit, GitDataClient, GitSnapshotPublisher, INLINE_LIMIT};
pub use tarball::{RepoFile, TarballClient};
