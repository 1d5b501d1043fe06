//! Client for WebSocket text-to-image generation APIs.
//!
//! ```rust,ignore
//! use artify::{Config, GenerateImageParams, ImageGenerationService};
//!
//! let service = ImageGenerationService::from_config(&Config::from_env()).await?;
//! service.set_credential("my-api-key").await?;
//! let image = service
//!     .generate(&GenerateImageParams::new("a lighthouse at dawn").with_size("512x512"))
//!     .await?;
//! println!("{}", image.image_url);
//! service.disconnect().await;
//! ```

pub mod config;
pub mod error;
pub mod gallery;
pub mod logger;
pub mod models;
pub mod runware;
pub mod storage;

pub use config::{Config, CredentialBackend, CredentialConfig, RunwareConfig};
pub use error::{ArtifyError, Result};
pub use gallery::{Gallery, GalleryEntry};
pub use models::*;
pub use runware::{supported_models, ConnectionStatus, ImageGenerationService};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
