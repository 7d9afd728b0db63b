mod centroids;
mod index;
mod recognize;
mod stats;

pub use centroids::*;
pub use index::*;
pub use recognize::*;
pub use stats::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
