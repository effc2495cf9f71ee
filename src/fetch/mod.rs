pub mod detail;
pub mod graphql;
pub mod pacing;

pub use detail::DetailFetcher;
pub use graphql::GraphqlClient;
