pub mod connection;
pub mod image_client;
pub mod pending;
pub mod protocol;

use crate::models::{ModelInfo, DEFAULT_MODEL};

pub use connection::ConnectionStatus;
pub use image_client::ImageGenerationService;

/// Models the demo UI offered, default first.
pub fn supported_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: DEFAULT_MODEL.to_string(),
            name: "FLUX.1 [schnell]".to_string(),
            provider: "Black Forest Labs".to_string(),
            default_steps: protocol::DEFAULT_STEPS,
            description: "Fast distilled text-to-image model, good at 4 steps".to_string(),
        },
        ModelInfo {
            id: "runware:101@1".to_string(),
            name: "FLUX.1 [dev]".to_string(),
            provider: "Black Forest Labs".to_string(),
            default_steps: 28,
            description: "Higher fidelity guidance-distilled model".to_string(),
        },
    ]
}
