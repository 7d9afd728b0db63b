pub mod cli;
pub mod config;
mod db;
pub mod embed;
pub mod encoder;
pub mod facedb;
pub mod persona;
pub mod preprocess;
pub mod utils;

pub use config::{Opts, StoreDir};
pub use db::{FaceRecord, TableSchema};
pub use embed::{Embedder, PoolingEmbedder};
pub use encoder::FaceEncoder;
pub use facedb::{Centroids, FaceDB, FaceDBBuilder, IndexReport, Neighbor, Recognition};
pub use persona::{LabeledImages, PersonaLoader};
pub use preprocess::Preprocessor;
