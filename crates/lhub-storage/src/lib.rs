//! Publication backends for finished sign assets.
//!
//! A [`Publisher`] uploads a local file and returns its canonical public
//! URL. Two backends are provided:
//! - [`CloudinaryPublisher`]: signed uploads to the Cloudinary upload API
//! - [`R2Publisher`]: `PutObject` to a Cloudflare R2 bucket with a public origin

pub mod cloudinary;
pub mod error;
pub mod publisher;
pub mod r2;

pub use cloudinary::{CloudinaryConfig, CloudinaryPublisher};
pub use error::{StorageError, StorageResult};
pub use publisher::{PublishOptions, Publisher, ResourceKind};
pub use r2::{R2Config, R2Publisher};
